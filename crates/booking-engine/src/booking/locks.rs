use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::domain::PropertyId;

/// Per-property mutual exclusion for the validate-then-insert booking sequence.
///
/// Waiting is bounded: a timed-out attempt is retried once, then reported as retryable.
pub struct PropertyLocks {
    locks: Mutex<HashMap<PropertyId, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

/// Held for the duration of a booking attempt; dropping it releases the property.
#[derive(Debug)]
pub struct PropertyGuard {
    property: PropertyId,
    _guard: OwnedMutexGuard<()>,
}

impl PropertyGuard {
    pub fn property(&self) -> PropertyId {
        self.property
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("property {property} is busy, retry the booking shortly")]
pub struct LockTimeout {
    pub property: PropertyId,
    pub waited: Duration,
}

impl PropertyLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Entries nobody holds or waits on are dropped, so the map tracks only busy properties.
    fn lock_for(&self, property: PropertyId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(property)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, property: PropertyId) -> Result<PropertyGuard, LockTimeout> {
        let lock = self.lock_for(property);

        for attempt in 1..=2u8 {
            match tokio::time::timeout(self.timeout, lock.clone().lock_owned()).await {
                Ok(guard) => {
                    debug!(%property, attempt, "property lock acquired");
                    return Ok(PropertyGuard {
                        property,
                        _guard: guard,
                    });
                }
                Err(_) => {
                    warn!(%property, attempt, timeout_ms = self.timeout.as_millis() as u64, "timed out waiting for property lock");
                }
            }
        }

        Err(LockTimeout {
            property,
            waited: self.timeout * 2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tracked(locks: &PropertyLocks) -> Vec<PropertyId> {
        locks
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    #[tokio::test]
    async fn released_properties_are_forgotten() {
        let locks = PropertyLocks::new(Duration::from_millis(20));
        let first = PropertyId(Uuid::from_u128(1));
        let second = PropertyId(Uuid::from_u128(2));
        let third = PropertyId(Uuid::from_u128(3));

        let held = locks.acquire(first).await.expect("first acquire");
        drop(locks.acquire(second).await.expect("second acquire"));
        let _third = locks.acquire(third).await.expect("third acquire");

        let mut busy = tracked(&locks);
        busy.sort_by_key(|property| property.0);
        assert_eq!(busy, vec![first, third]);

        drop(held);
        let _again = locks.acquire(first).await.expect("reacquire");
        let mut busy = tracked(&locks);
        busy.sort_by_key(|property| property.0);
        assert_eq!(busy, vec![first, third]);
    }

    #[tokio::test]
    async fn same_property_is_exclusive() {
        let locks = PropertyLocks::new(Duration::from_millis(20));
        let property = PropertyId(Uuid::from_u128(7));

        let held = locks.acquire(property).await.expect("first acquire");
        assert_eq!(held.property(), property);

        let err = locks.acquire(property).await.expect_err("second acquire times out");
        assert_eq!(err.property, property);
        assert_eq!(err.waited, Duration::from_millis(40));

        drop(held);
        locks.acquire(property).await.expect("released lock is reusable");
    }

    #[tokio::test]
    async fn different_properties_do_not_contend() {
        let locks = PropertyLocks::new(Duration::from_millis(20));
        let _first = locks
            .acquire(PropertyId(Uuid::from_u128(1)))
            .await
            .expect("first property");
        locks
            .acquire(PropertyId(Uuid::from_u128(2)))
            .await
            .expect("second property");
    }

    #[tokio::test]
    async fn waiter_proceeds_once_the_holder_releases() {
        let locks = Arc::new(PropertyLocks::new(Duration::from_millis(500)));
        let property = PropertyId(Uuid::from_u128(3));
        let held = locks.acquire(property).await.expect("holder");

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(property).await.map(|guard| guard.property()) })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(held);
        let acquired = waiter.await.expect("task joins").expect("waiter acquires");
        assert_eq!(acquired, property);
    }
}
