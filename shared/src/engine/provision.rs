//! Bulk (re)creation of parking spaces.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::models::NewParkingSpace;
use crate::store::ParkingStore;
use crate::Result;

pub const SPACES_PER_CAR_PARK: usize = 50;
pub const FLOOR_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub deleted: u64,
    pub created: u64,
}

/// Label for the `index`-th space of a car park.
pub fn floor_label(index: usize) -> String {
    format!("Floor {}", index % FLOOR_COUNT)
}

/// Delete every parking space and create a fresh, unreserved set for each
/// car park.
pub async fn provision_spaces(store: &dyn ParkingStore, now: DateTime<Utc>) -> Result<ProvisionReport> {
    let car_parks = store.list_car_parks().await?;

    let spaces: Vec<NewParkingSpace> = car_parks
        .iter()
        .flat_map(|car_park| {
            (0..SPACES_PER_CAR_PARK).map(move |index| NewParkingSpace {
                id: Uuid::new_v4().to_string(),
                carpark: car_park.id.clone(),
                location: floor_label(index),
                booked_until: now,
            })
        })
        .collect();

    let (deleted, created) = store.replace_all_spaces(spaces).await?;

    info!(
        car_parks = car_parks.len(),
        deleted,
        created,
        "Parking spaces provisioned"
    );

    Ok(ProvisionReport { deleted, created })
}
