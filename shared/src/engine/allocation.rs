//! Binding a due booking to a concrete space.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::models::ParkingSpace;
use crate::store::ParkingStore;
use crate::Result;

/// Outcome of an allocation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    Assigned {
        space: ParkingSpace,
        reclaim: Reclaim,
    },
    NoSpaceAvailable,
}

/// What happened to a lapsed reservation the allocator took over before the
/// expired-space pass released it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reclaim {
    /// The space had already been released.
    NotNeeded,
    /// The displaced reservation was credited back to the car park.
    Credited { spaces_left: Option<i32> },
    /// The space is reserved but the counter step failed.
    Failed(String),
}

/// Reserve one free space in `car_park_id` for `user` until `booked_until`.
///
/// Free means the previous reservation ended before `now`. Among free
/// spaces the one freed earliest wins; equal times go to the lowest id.
/// A space still attributed to its previous booker counts as released here,
/// since overwriting `last_booker` hides it from the expired-space pass.
pub async fn allocate_space(
    store: &dyn ParkingStore,
    car_park_id: &str,
    user: &str,
    booked_until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Allocation> {
    let Some(claimed) = store
        .claim_free_space(car_park_id, user, booked_until, now)
        .await?
    else {
        return Ok(Allocation::NoSpaceAvailable);
    };

    info!(
        car_park_id,
        space_id = %claimed.space.id,
        location = %claimed.space.location,
        booked_until = %booked_until,
        "Allocated parking space"
    );

    // The space is already reserved; a failed counter step must not undo that.
    let reclaim = match claimed.displaced_booker() {
        None => Reclaim::NotNeeded,
        Some(previous) => match store.adjust_spaces_left(car_park_id, 1).await {
            Ok(spaces_left) => {
                info!(
                    car_park_id,
                    space_id = %claimed.space.id,
                    previous_booker = previous,
                    spaces_left,
                    "Credited unreleased reservation"
                );
                Reclaim::Credited { spaces_left }
            }
            Err(e) => {
                error!(
                    car_park_id,
                    space_id = %claimed.space.id,
                    error = %e,
                    "Failed to credit unreleased reservation"
                );
                Reclaim::Failed(e.to_string())
            }
        },
    };

    Ok(Allocation::Assigned {
        space: claimed.space,
        reclaim,
    })
}
