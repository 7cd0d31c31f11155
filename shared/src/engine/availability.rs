//! Car park fullness.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::Fullness;
use crate::store::ParkingStore;
use crate::Result;

/// Count the spaces in a car park that are free at `now`.
///
/// A space is free when its reservation does not extend past `now` and no
/// booking references it. A car park with no spaces at all is full.
pub async fn check_fullness(
    store: &dyn ParkingStore,
    car_park_id: &str,
    now: DateTime<Utc>,
) -> Result<Fullness> {
    let spaces = store.spaces_in_car_park(car_park_id).await?;

    let mut free = 0u32;
    for space in spaces.iter().filter(|space| space.is_vacant_at(now)) {
        if !store.space_has_booking(&space.id).await? {
            free += 1;
        }
    }

    debug!(car_park_id, total = spaces.len(), free, "Evaluated availability");

    Ok(Fullness::from_free_count(free))
}
