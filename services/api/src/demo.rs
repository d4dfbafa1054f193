use crate::infra::{parse_date, parse_price, parse_window, MemoryBookingService, WindowSpec};
use booking_engine::booking::domain::{
    BookingRequest, PropertyId, PropertyListing, StayDates, UserId,
};
use booking_engine::booking::payment::{StubGateway, CHECKOUT_COMPLETED};
use booking_engine::booking::pricing::{self, PriceSource, Quote};
use booking_engine::booking::{
    BookingError, BookingService, BookingSettings, InMemoryCalendarStore,
    InMemoryPropertyCatalog, InMemoryReservationStore,
};
use booking_engine::error::AppError;
use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Args, Debug)]
pub(crate) struct QuoteArgs {
    /// Listing base price used when no window covers the stay
    #[arg(long, value_parser = parse_price)]
    pub(crate) base_price: Decimal,
    /// Check-in date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) check_in: NaiveDate,
    /// Check-out date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) check_out: NaiveDate,
    /// Availability window as start,end,price. Repeatable.
    #[arg(long = "window", value_parser = parse_window)]
    pub(crate) windows: Vec<WindowSpec>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Listing base price
    #[arg(long, default_value = "80.00", value_parser = parse_price)]
    pub(crate) base_price: Decimal,
    /// Check-in date (YYYY-MM-DD)
    #[arg(long, default_value = "2024-07-01", value_parser = parse_date)]
    pub(crate) check_in: NaiveDate,
    /// Check-out date (YYYY-MM-DD)
    #[arg(long, default_value = "2024-07-04", value_parser = parse_date)]
    pub(crate) check_out: NaiveDate,
}

pub(crate) fn run_quote(args: QuoteArgs) -> Result<(), AppError> {
    let quote = quote_stay(args)?;
    print_quote(&quote);
    Ok(())
}

fn quote_stay(args: QuoteArgs) -> Result<Quote, AppError> {
    let stay = StayDates::new(args.check_in, args.check_out)
        .ok_or_else(|| AppError::Usage("--check-out must be after --check-in".to_string()))?;
    let windows: Vec<_> = args
        .windows
        .into_iter()
        .enumerate()
        .map(|(index, spec)| spec.into_window(index))
        .collect();
    Ok(pricing::resolve(&windows, args.base_price, &stay).map_err(BookingError::from)?)
}

fn print_quote(quote: &Quote) {
    let source = match quote.source {
        PriceSource::AvailabilityWindow(id) => format!("availability window #{id}"),
        PriceSource::BasePrice => "listing base price".to_string(),
    };
    println!("Nightly price: {} ({source})", quote.price_per_night);
    println!("Nights: {}", quote.nights);
    println!("Subtotal: {}", quote.subtotal);
    println!("Service fee: {}", quote.service_fee);
    println!("Total: {}", quote.total_price);
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let host = UserId(Uuid::new_v4());
    let guest = UserId(Uuid::new_v4());
    let property = PropertyId(Uuid::new_v4());
    let listing = PropertyListing {
        id: property,
        owner: host,
        title: "Alfama Terrace".to_string(),
        city: "Lisbon".to_string(),
        price: args.base_price,
        currency: "EUR".to_string(),
    };
    let service: Arc<MemoryBookingService> = Arc::new(BookingService::new(
        Arc::new(InMemoryCalendarStore::default()),
        Arc::new(InMemoryReservationStore::default()),
        Arc::new(InMemoryPropertyCatalog::from_listings([listing.clone()])),
        Arc::new(StubGateway::new()),
        BookingSettings::default(),
    ));

    println!("=== Booking Engine Demo ===");
    println!(
        "Property: {} in {} at {} per night",
        listing.title, listing.city, listing.price
    );

    println!("\n-- Quote --");
    let quote = service.quote(&property, args.check_in, args.check_out)?;
    print_quote(&quote);

    println!("\n-- Guest requests {} to {} --", args.check_in, args.check_out);
    let requested = service
        .request_booking(
            &guest,
            BookingRequest {
                property_id: property,
                check_in: args.check_in,
                check_out: args.check_out,
                guests_count: 2,
                message: "Arriving on the evening flight".to_string(),
            },
        )
        .await?;
    let id = requested.reservation.id;
    println!(
        "Reservation {id} is {} with total {}",
        requested.status_display, requested.reservation.total_price
    );

    let rival = UserId(Uuid::new_v4());
    let overlap = service
        .request_booking(
            &rival,
            BookingRequest {
                property_id: property,
                check_in: args.check_in,
                check_out: args.check_out,
                guests_count: 1,
                message: String::new(),
            },
        )
        .await;
    match overlap {
        Err(BookingError::DateConflict) => println!("Overlapping request rejected: date conflict"),
        Err(other) => return Err(other.into()),
        Ok(view) => println!("Unexpected double booking {}", view.reservation.id),
    }

    println!("\n-- Host confirms --");
    let confirmed = service.confirm(&host, &id)?;
    println!("Reservation {id} is {}", confirmed.status_display);

    println!("\n-- Guest opens checkout --");
    let link = service
        .create_checkout(&guest, &id, Default::default())
        .await?;
    println!("Checkout session {} at {}", link.session_id, link.checkout_url);

    println!("\n-- Gateway reports payment (delivered twice) --");
    let event = json!({
        "id": "evt_demo",
        "type": CHECKOUT_COMPLETED,
        "data": {"object": {
            "id": link.session_id,
            "payment_intent": "pi_demo",
            "metadata": {"reservation_id": id.to_string()}
        }}
    })
    .to_string();
    for delivery in 1..=2 {
        let outcome = service.handle_payment_event(event.as_bytes(), None)?;
        println!("Delivery {delivery}: {}", outcome.label());
    }
    let paid = service.reservation(&guest, &id)?;
    println!(
        "Reservation {id} is {} (payment intent {})",
        paid.status_display,
        paid.reservation.payment_intent.as_deref().unwrap_or("-")
    );

    println!("\n-- Stay ends --");
    let completed = service.complete_finished_stays(args.check_out)?;
    println!("Completed {} reservation(s)", completed.len());
    let snapshot = service.calendar(&property, args.check_in)?;
    println!(
        "Calendar shows {} reserved range(s) from {}",
        snapshot.reserved_dates.len(),
        args.check_in
    );

    Ok(())
}
