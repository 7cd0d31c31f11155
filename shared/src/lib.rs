//! Shared library for the car park Lambda functions.
//!
//! This crate provides configuration, persistence, messaging and the booking
//! engine used by the HTTP handlers and the scheduled reconciler.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod http;
pub mod models;
pub mod secrets;
pub mod sms;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{Booking, CarPark, CarParkSummary, Fullness, ParkingSpace};
pub use secrets::{DatabaseCredentials, SecretsCache};
pub use sms::{Notifier, SmsGateway, SnsSmsGateway};
pub use store::{ParkingStore, PgParkingStore};
