//! Booking creation.

use chrono::{DateTime, TimeDelta};
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use crate::models::{Booking, NewBooking};
use crate::store::ParkingStore;
use crate::{Error, Result};

/// Booking request as received in query parameters.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct BookingRequest {
    /// Start of the booking, epoch seconds
    #[serde(rename = "TimeStart")]
    #[validate(required(message = "TimeStart is required"))]
    pub time_start: Option<String>,
    /// Length of the booking in seconds
    #[serde(rename = "Duration")]
    #[validate(required(message = "Duration is required"))]
    pub duration: Option<String>,
    #[serde(rename = "CarPark")]
    #[validate(required(message = "CarPark is required"))]
    pub car_park: Option<String>,
    /// Phone number of the user
    #[serde(rename = "User")]
    #[validate(required(message = "User is required"))]
    pub user: Option<String>,
}

impl BookingRequest {
    /// Build a request from a parameter lookup such as a query string.
    pub fn from_params<'a, F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        Self {
            time_start: get("TimeStart").map(str::to_string),
            duration: get("Duration").map(str::to_string),
            car_park: get("CarPark").map(str::to_string),
            user: get("User").map(str::to_string),
        }
    }

    /// Validate the request and compute the booking window.
    pub fn into_new_booking(self) -> Result<NewBooking> {
        self.validate()?;

        let (Some(time_start), Some(duration), Some(car_park), Some(user)) =
            (self.time_start, self.duration, self.car_park, self.user)
        else {
            return Err(Error::Validation("missing booking field".to_string()));
        };

        let start_seconds = parse_seconds("TimeStart", &time_start)?;
        let duration_seconds = parse_seconds("Duration", &duration)?;
        if duration_seconds < 0 {
            return Err(Error::Validation("Duration must not be negative".to_string()));
        }

        let time_start = DateTime::from_timestamp(start_seconds, 0)
            .ok_or_else(|| Error::Validation("TimeStart is out of range".to_string()))?;
        let time_end = TimeDelta::try_seconds(duration_seconds)
            .and_then(|duration| time_start.checked_add_signed(duration))
            .ok_or_else(|| Error::Validation("Duration is out of range".to_string()))?;

        Ok(NewBooking {
            car_park,
            user,
            time_start,
            time_end,
        })
    }
}

fn parse_seconds(field: &str, raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Validation(format!("{} must be a whole number of seconds", field)))
}

/// Record a booking and take one space off the car park's counter.
///
/// The counter is advisory: it is not checked for going negative, and a
/// booking against an unknown car park is still recorded.
pub async fn create_booking(store: &dyn ParkingStore, booking: NewBooking) -> Result<Booking> {
    let stored = store.insert_booking(booking).await?;

    info!(
        booking_id = %stored.id,
        car_park_id = %stored.car_park,
        time_start = %stored.time_start,
        time_end = %stored.time_end,
        "Booking created"
    );

    match store.adjust_spaces_left(&stored.car_park, -1).await? {
        Some(spaces_left) => {
            info!(car_park_id = %stored.car_park, spaces_left, "Car park capacity decremented");
        }
        None => {
            warn!(car_park_id = %stored.car_park, "Booked car park does not exist; counter unchanged");
        }
    }

    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::car_park;
    use std::collections::HashMap;

    fn request(pairs: &[(&str, &str)]) -> BookingRequest {
        let params: HashMap<&str, &str> = pairs.iter().copied().collect();
        BookingRequest::from_params(|key| params.get(key).copied())
    }

    fn full_request() -> BookingRequest {
        request(&[
            ("TimeStart", "1767229200"),
            ("Duration", "3600"),
            ("CarPark", "north"),
            ("User", "+447700900123"),
        ])
    }

    #[test]
    fn test_time_end_is_start_plus_duration() {
        let booking = full_request().into_new_booking().unwrap();
        assert_eq!(booking.time_start.timestamp(), 1_767_229_200);
        assert_eq!(booking.time_end.timestamp(), 1_767_229_200 + 3600);
        assert_eq!(booking.car_park, "north");
        assert_eq!(booking.user, "+447700900123");
    }

    #[test]
    fn test_each_missing_field_is_rejected() {
        for missing in ["TimeStart", "Duration", "CarPark", "User"] {
            let pairs: Vec<(&str, &str)> = [
                ("TimeStart", "1767229200"),
                ("Duration", "3600"),
                ("CarPark", "north"),
                ("User", "+447700900123"),
            ]
            .into_iter()
            .filter(|(key, _)| *key != missing)
            .collect();

            let err = request(&pairs).into_new_booking().unwrap_err();
            assert!(
                matches!(&err, Error::Validation(msg) if msg.contains(missing)),
                "{} -> {:?}",
                missing,
                err
            );
        }
    }

    #[test]
    fn test_non_numeric_and_negative_values_rejected() {
        let mut bad_start = full_request();
        bad_start.time_start = Some("tomorrow".to_string());
        assert!(matches!(bad_start.into_new_booking(), Err(Error::Validation(_))));

        let mut negative = full_request();
        negative.duration = Some("-60".to_string());
        assert!(matches!(negative.into_new_booking(), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_decrements_from_default() {
        let store = MemoryStore::new();
        store.put_car_park(car_park("north", None)).await;

        let booking = full_request().into_new_booking().unwrap();
        let stored = create_booking(&store, booking.clone()).await.unwrap();

        assert_eq!(stored.time_end, booking.time_end);
        assert_eq!(store.bookings().await, vec![stored]);
        assert_eq!(store.car_park("north").await.unwrap().spaces_left, Some(9));
    }

    #[tokio::test]
    async fn test_create_decrements_existing_counter_by_one() {
        let store = MemoryStore::new();
        store.put_car_park(car_park("north", Some(0))).await;

        let booking = full_request().into_new_booking().unwrap();
        create_booking(&store, booking).await.unwrap();

        assert_eq!(store.car_park("north").await.unwrap().spaces_left, Some(-1));
    }

    #[tokio::test]
    async fn test_invalid_request_writes_nothing() {
        let store = MemoryStore::new();
        store.put_car_park(car_park("north", Some(4))).await;

        let result = request(&[("TimeStart", "1767229200"), ("CarPark", "north")]).into_new_booking();
        assert!(result.is_err());
        assert!(store.bookings().await.is_empty());
        assert_eq!(store.car_park("north").await.unwrap().spaces_left, Some(4));
    }

    #[tokio::test]
    async fn test_unknown_car_park_still_records_booking() {
        let store = MemoryStore::new();
        let booking = full_request().into_new_booking().unwrap();
        create_booking(&store, booking).await.unwrap();
        assert_eq!(store.bookings().await.len(), 1);
    }
}
