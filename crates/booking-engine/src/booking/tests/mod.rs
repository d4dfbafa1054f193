mod common;
mod payments;
