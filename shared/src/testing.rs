//! Test doubles and fixtures.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use crate::models::{Booking, CarPark, ParkingSpace};
use crate::sms::SmsGateway;
use crate::{Error, Result};

/// Gateway that records messages instead of sending them.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingGateway {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl SmsGateway for RecordingGateway {
    async fn send_text(&self, to: &str, body: &str) -> Result<String> {
        if self.fail {
            return Err(Error::Gateway("gateway unavailable".to_string()));
        }
        let mut sent = self.sent.lock().await;
        sent.push((to.to_string(), body.to_string()));
        Ok(format!("msg-{}", sent.len()))
    }
}

/// Fixed instant so tests do not depend on the wall clock.
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).unwrap_or_default()
}

pub fn minutes(n: i64) -> TimeDelta {
    TimeDelta::minutes(n)
}

pub fn car_park(id: &str, spaces_left: Option<i32>) -> CarPark {
    CarPark {
        id: id.to_string(),
        name: format!("{} car park", id),
        location: "Leeds".to_string(),
        spaces_left,
    }
}

pub fn space(id: &str, car_park: &str, booked_until: DateTime<Utc>, last_booker: &str) -> ParkingSpace {
    ParkingSpace {
        id: id.to_string(),
        carpark: car_park.to_string(),
        location: format!("Bay {}", id),
        booked_until,
        last_booker: last_booker.to_string(),
    }
}

pub fn booking(id: &str, car_park: &str, user: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Booking {
    Booking {
        id: id.to_string(),
        car_park: car_park.to_string(),
        user: user.to_string(),
        time_start: start,
        time_end: end,
        parking_space: None,
    }
}
