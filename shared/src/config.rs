//! Configuration management for Lambda functions.

use std::env;

use crate::{Error, Result};

/// Phone number used by the mobile app's test accounts.
pub const DEFAULT_SUPPRESSED_PHONE_NUMBER: &str = "+441234567890";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database host
    pub db_host: String,
    /// Database name
    pub db_name: String,
    /// ARN of the secret containing database credentials
    pub db_secret_arn: String,
    /// Sender number attached to outbound SMS
    pub sms_origination_number: Option<String>,
    /// Number that is never messaged (logged instead)
    pub suppressed_phone_number: Option<String>,
    /// Upper bound on concurrent work items per reconciliation pass
    pub reconcile_concurrency: usize,
    /// How long a reconciliation run may hold its lease
    pub reconcile_lease_seconds: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| Error::Config(format!("{} not set", key)))
        };

        let suppressed_phone_number = match lookup("SUPPRESSED_PHONE_NUMBER") {
            Some(number) if number.trim().is_empty() => None,
            Some(number) => Some(number),
            None => Some(DEFAULT_SUPPRESSED_PHONE_NUMBER.to_string()),
        };

        Ok(Self {
            db_host: required("DB_HOST")?,
            db_name: lookup("DB_NAME").unwrap_or_else(|| "carpark".to_string()),
            db_secret_arn: required("DB_SECRET_ARN")?,
            sms_origination_number: lookup("SMS_ORIGINATION_NUMBER").filter(|n| !n.is_empty()),
            suppressed_phone_number,
            reconcile_concurrency: parse_or(&lookup, "RECONCILE_CONCURRENCY", 8)?,
            reconcile_lease_seconds: parse_or(&lookup, "RECONCILE_LEASE_SECONDS", 300)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a number, got {:?}", key, raw))),
        None => Ok(default),
    }
}
