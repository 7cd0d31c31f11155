//! Shared data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capacity assumed for a car park whose counter was never written.
pub const DEFAULT_SPACES_LEFT: i32 = 10;

/// A site containing parking spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CarPark {
    pub id: String,
    pub name: String,
    pub location: String,
    /// Advisory remaining capacity; `None` until first booked or released.
    pub spaces_left: Option<i32>,
}

/// Entry in the car park listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarParkSummary {
    pub id: String,
    pub location: String,
    pub name: String,
}

impl From<CarPark> for CarParkSummary {
    fn from(car_park: CarPark) -> Self {
        Self {
            id: car_park.id,
            location: car_park.location,
            name: car_park.name,
        }
    }
}

/// A single allocatable space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ParkingSpace {
    pub id: String,
    pub carpark: String,
    pub location: String,
    pub booked_until: DateTime<Utc>,
    /// User the space is attributed to until released; empty once released.
    pub last_booker: String,
}

impl ParkingSpace {
    /// Free for the fullness check: the reservation does not extend past `now`.
    pub fn is_vacant_at(&self, now: DateTime<Utc>) -> bool {
        self.booked_until <= now
    }

    /// Reservation has lapsed and can be handed out again.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.booked_until < now
    }

    pub fn is_attributed(&self) -> bool {
        !self.last_booker.is_empty()
    }
}

/// A space the allocator just reserved, with the booker it replaced.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ClaimedSpace {
    #[sqlx(flatten)]
    pub space: ParkingSpace,
    /// Empty unless the lapsed reservation had not been released yet.
    pub previous_booker: String,
}

impl ClaimedSpace {
    /// The booker whose lapsed reservation was taken over without a release.
    pub fn displaced_booker(&self) -> Option<&str> {
        Some(self.previous_booker.as_str()).filter(|booker| !booker.is_empty())
    }
}

/// Space to be inserted by provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParkingSpace {
    pub id: String,
    pub carpark: String,
    pub location: String,
    pub booked_until: DateTime<Utc>,
}

/// A user's time-bounded intent to park.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct Booking {
    pub id: String,
    pub car_park: String,
    /// Phone number of the user; notifications are sent here.
    pub user: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub parking_space: Option<String>,
}

/// Booking accepted from a request, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub car_park: String,
    pub user: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
}

/// Result of the fullness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fullness {
    pub full: bool,
    pub spaces: u32,
}

impl Fullness {
    pub fn from_free_count(spaces: u32) -> Self {
        Self {
            full: spaces < 1,
            spaces,
        }
    }
}
