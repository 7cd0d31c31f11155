//! Parking store port.
//!
//! Every mutation that another invocation could race with is a single
//! conditional operation, so two overlapping Lambdas can never both claim
//! the same booking, space or release.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Booking, CarPark, ClaimedSpace, NewBooking, NewParkingSpace, ParkingSpace};
use crate::Result;

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[cfg(test)]
pub use memory::MemoryStore;
pub use postgres::PgParkingStore;

/// Persistence operations used by the booking engine.
#[async_trait]
pub trait ParkingStore: Send + Sync {
    /// All car parks, ordered by id.
    async fn list_car_parks(&self) -> Result<Vec<CarPark>>;

    /// Add `delta` to a car park's counter, treating an unset counter as
    /// `DEFAULT_SPACES_LEFT`. Returns the new value, or `None` if the car
    /// park does not exist.
    async fn adjust_spaces_left(&self, car_park_id: &str, delta: i32) -> Result<Option<i32>>;

    /// Every space belonging to a car park.
    async fn spaces_in_car_park(&self, car_park_id: &str) -> Result<Vec<ParkingSpace>>;

    /// Whether any booking references the given space.
    async fn space_has_booking(&self, space_id: &str) -> Result<bool>;

    /// Store a new booking under a fresh id.
    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking>;

    /// Put a previously claimed booking back, keeping its id.
    async fn restore_booking(&self, booking: &Booking) -> Result<()>;

    /// Bookings whose start time is at or before `now`, earliest first.
    async fn due_bookings(&self, now: DateTime<Utc>) -> Result<Vec<Booking>>;

    /// Delete a booking. Returns `false` if it was already gone, meaning
    /// another run claimed it.
    async fn delete_booking(&self, booking_id: &str) -> Result<bool>;

    /// Atomically pick the free space (`booked_until < now`) with the
    /// earliest `booked_until`, lowest id on ties, and reserve it for
    /// `user` until `booked_until`. The returned claim carries the booker
    /// the space was still attributed to, if any.
    async fn claim_free_space(
        &self,
        car_park_id: &str,
        user: &str,
        booked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedSpace>>;

    /// Spaces whose reservation ended before `now`.
    async fn expired_spaces(&self, now: DateTime<Utc>) -> Result<Vec<ParkingSpace>>;

    /// Clear `last_booker` if it still equals `expected_booker` and the
    /// reservation is still expired. Returns whether this call did it.
    async fn release_space(
        &self,
        space_id: &str,
        expected_booker: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete every space and insert `spaces`. Returns (deleted, inserted).
    async fn replace_all_spaces(&self, spaces: Vec<NewParkingSpace>) -> Result<(u64, u64)>;

    /// Take the named lease if it is free or expired.
    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Give the lease back if `holder` still owns it.
    async fn release_lease(&self, name: &str, holder: &str) -> Result<()>;
}
