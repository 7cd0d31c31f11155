//! In-process parking store.
//!
//! Test double for the PostgreSQL store. Each operation runs under one lock,
//! giving the same per-call atomicity as the conditional statements there.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    Booking, CarPark, ClaimedSpace, NewBooking, NewParkingSpace, ParkingSpace, DEFAULT_SPACES_LEFT,
};
use crate::store::ParkingStore;
use crate::Result;

#[derive(Default)]
struct State {
    car_parks: BTreeMap<String, CarPark>,
    spaces: BTreeMap<String, ParkingSpace>,
    bookings: BTreeMap<String, Booking>,
    leases: HashMap<String, (String, DateTime<Utc>)>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_car_park(&self, car_park: CarPark) {
        self.state
            .lock()
            .await
            .car_parks
            .insert(car_park.id.clone(), car_park);
    }

    pub async fn put_space(&self, space: ParkingSpace) {
        self.state.lock().await.spaces.insert(space.id.clone(), space);
    }

    pub async fn put_booking(&self, booking: Booking) {
        self.state
            .lock()
            .await
            .bookings
            .insert(booking.id.clone(), booking);
    }

    pub async fn car_park(&self, id: &str) -> Option<CarPark> {
        self.state.lock().await.car_parks.get(id).cloned()
    }

    pub async fn space(&self, id: &str) -> Option<ParkingSpace> {
        self.state.lock().await.spaces.get(id).cloned()
    }

    pub async fn spaces(&self) -> Vec<ParkingSpace> {
        self.state.lock().await.spaces.values().cloned().collect()
    }

    pub async fn bookings(&self) -> Vec<Booking> {
        self.state.lock().await.bookings.values().cloned().collect()
    }
}

#[async_trait]
impl ParkingStore for MemoryStore {
    async fn list_car_parks(&self) -> Result<Vec<CarPark>> {
        Ok(self.state.lock().await.car_parks.values().cloned().collect())
    }

    async fn adjust_spaces_left(&self, car_park_id: &str, delta: i32) -> Result<Option<i32>> {
        let mut state = self.state.lock().await;
        Ok(state.car_parks.get_mut(car_park_id).map(|car_park| {
            let updated = car_park.spaces_left.unwrap_or(DEFAULT_SPACES_LEFT) + delta;
            car_park.spaces_left = Some(updated);
            updated
        }))
    }

    async fn spaces_in_car_park(&self, car_park_id: &str) -> Result<Vec<ParkingSpace>> {
        let state = self.state.lock().await;
        Ok(state
            .spaces
            .values()
            .filter(|space| space.carpark == car_park_id)
            .cloned()
            .collect())
    }

    async fn space_has_booking(&self, space_id: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .values()
            .any(|booking| booking.parking_space.as_deref() == Some(space_id)))
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking> {
        let stored = Booking {
            id: Uuid::new_v4().to_string(),
            car_park: booking.car_park,
            user: booking.user,
            time_start: booking.time_start,
            time_end: booking.time_end,
            parking_space: None,
        };
        self.put_booking(stored.clone()).await;
        Ok(stored)
    }

    async fn restore_booking(&self, booking: &Booking) -> Result<()> {
        self.state
            .lock()
            .await
            .bookings
            .entry(booking.id.clone())
            .or_insert_with(|| booking.clone());
        Ok(())
    }

    async fn due_bookings(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut due: Vec<Booking> = state
            .bookings
            .values()
            .filter(|booking| booking.time_start <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.time_start.cmp(&b.time_start).then_with(|| a.id.cmp(&b.id)));
        Ok(due)
    }

    async fn delete_booking(&self, booking_id: &str) -> Result<bool> {
        Ok(self.state.lock().await.bookings.remove(booking_id).is_some())
    }

    async fn claim_free_space(
        &self,
        car_park_id: &str,
        user: &str,
        booked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedSpace>> {
        let mut state = self.state.lock().await;
        let chosen = state
            .spaces
            .values()
            .filter(|space| space.carpark == car_park_id && space.is_expired_at(now))
            .min_by(|a, b| {
                a.booked_until
                    .cmp(&b.booked_until)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|space| space.id.clone());

        Ok(chosen.and_then(|id| {
            state.spaces.get_mut(&id).map(|space| {
                let previous_booker = std::mem::replace(&mut space.last_booker, user.to_string());
                space.booked_until = booked_until;
                ClaimedSpace {
                    space: space.clone(),
                    previous_booker,
                }
            })
        }))
    }

    async fn expired_spaces(&self, now: DateTime<Utc>) -> Result<Vec<ParkingSpace>> {
        let state = self.state.lock().await;
        Ok(state
            .spaces
            .values()
            .filter(|space| space.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn release_space(
        &self,
        space_id: &str,
        expected_booker: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.spaces.get_mut(space_id) {
            Some(space)
                if space.is_attributed()
                    && space.last_booker == expected_booker
                    && space.is_expired_at(now) =>
            {
                space.last_booker.clear();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn replace_all_spaces(&self, spaces: Vec<NewParkingSpace>) -> Result<(u64, u64)> {
        let mut state = self.state.lock().await;
        let deleted = state.spaces.len() as u64;
        state.spaces.clear();
        for space in spaces {
            state.spaces.insert(
                space.id.clone(),
                ParkingSpace {
                    id: space.id,
                    carpark: space.carpark,
                    location: space.location,
                    booked_until: space.booked_until,
                    last_booker: String::new(),
                },
            );
        }
        let inserted = state.spaces.len() as u64;
        Ok((deleted, inserted))
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        if let Some((_, current_expiry)) = state.leases.get(name) {
            if *current_expiry > now {
                return Ok(false);
            }
        }
        state
            .leases
            .insert(name.to_string(), (holder.to_string(), expires_at));
        Ok(true)
    }

    async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.leases.get(name).is_some_and(|(owner, _)| owner == holder) {
            state.leases.remove(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn space(id: &str, booked_until: DateTime<Utc>) -> ParkingSpace {
        ParkingSpace {
            id: id.to_string(),
            carpark: "cp".to_string(),
            location: "Floor 1".to_string(),
            booked_until,
            last_booker: String::new(),
        }
    }

    #[tokio::test]
    async fn test_claim_prefers_earliest_freed_then_lowest_id() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.put_space(space("b", now - TimeDelta::hours(2))).await;
        store.put_space(space("a", now - TimeDelta::hours(1))).await;
        store.put_space(space("c", now - TimeDelta::hours(2))).await;

        let until = now + TimeDelta::hours(3);
        let first = store.claim_free_space("cp", "u1", until, now).await.unwrap().unwrap();
        let second = store.claim_free_space("cp", "u2", until, now).await.unwrap().unwrap();
        let third = store.claim_free_space("cp", "u3", until, now).await.unwrap().unwrap();

        assert_eq!(first.space.id, "b");
        assert_eq!(second.space.id, "c");
        assert_eq!(third.space.id, "a");
        assert!(store.claim_free_space("cp", "u4", until, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_reports_displaced_booker() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut lapsed = space("a", now - TimeDelta::minutes(1));
        lapsed.last_booker = "u0".to_string();
        store.put_space(lapsed).await;

        let claimed = store
            .claim_free_space("cp", "u1", now + TimeDelta::hours(1), now)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(claimed.previous_booker, "u0");
        assert_eq!(claimed.space.last_booker, "u1");
    }

    #[tokio::test]
    async fn test_lease_blocks_until_expiry() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let ttl = now + TimeDelta::minutes(5);

        assert!(store.try_acquire_lease("job", "one", ttl, now).await.unwrap());
        assert!(!store.try_acquire_lease("job", "two", ttl, now).await.unwrap());
        assert!(store
            .try_acquire_lease("job", "two", ttl + TimeDelta::minutes(5), ttl)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_release_lease_ignores_other_holder() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let ttl = now + TimeDelta::minutes(5);

        assert!(store.try_acquire_lease("job", "one", ttl, now).await.unwrap());
        store.release_lease("job", "two").await.unwrap();
        assert!(!store.try_acquire_lease("job", "two", ttl, now).await.unwrap());
        store.release_lease("job", "one").await.unwrap();
        assert!(store.try_acquire_lease("job", "two", ttl, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_adjust_missing_car_park_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.adjust_spaces_left("nowhere", -1).await.unwrap(), None);
    }
}
