//! PostgreSQL implementation of the parking store.
//!
//! Table layout lives in `shared/sql/schema.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    Booking, CarPark, ClaimedSpace, NewBooking, NewParkingSpace, ParkingSpace, DEFAULT_SPACES_LEFT,
};
use crate::store::ParkingStore;
use crate::Result;

const BOOKING_COLUMNS: &str =
    r#"id, car_park, user_id AS "user", time_start, time_end, parking_space"#;

pub struct PgParkingStore {
    pool: PgPool,
}

impl PgParkingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParkingStore for PgParkingStore {
    async fn list_car_parks(&self) -> Result<Vec<CarPark>> {
        let car_parks = sqlx::query_as::<_, CarPark>(
            "SELECT id, name, location, spaces_left FROM carparks ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(car_parks)
    }

    async fn adjust_spaces_left(&self, car_park_id: &str, delta: i32) -> Result<Option<i32>> {
        let spaces_left: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE carparks
            SET spaces_left = COALESCE(spaces_left, $3) + $2
            WHERE id = $1
            RETURNING spaces_left
            "#,
        )
        .bind(car_park_id)
        .bind(delta)
        .bind(DEFAULT_SPACES_LEFT)
        .fetch_optional(&self.pool)
        .await?;

        Ok(spaces_left)
    }

    async fn spaces_in_car_park(&self, car_park_id: &str) -> Result<Vec<ParkingSpace>> {
        let spaces = sqlx::query_as::<_, ParkingSpace>(
            r#"
            SELECT id, carpark, location, booked_until, last_booker
            FROM parking_spaces
            WHERE carpark = $1
            ORDER BY id
            "#,
        )
        .bind(car_park_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(spaces)
    }

    async fn space_has_booking(&self, space_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM bookings WHERE parking_space = $1)",
        )
        .bind(space_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
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
        self.restore_booking(&stored).await?;
        Ok(stored)
    }

    async fn restore_booking(&self, booking: &Booking) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, car_park, user_id, time_start, time_end, parking_space)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&booking.id)
        .bind(&booking.car_park)
        .bind(&booking.user)
        .bind(booking.time_start)
        .bind(booking.time_end)
        .bind(&booking.parking_space)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn due_bookings(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings WHERE time_start <= $1 ORDER BY time_start, id",
            BOOKING_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    async fn delete_booking(&self, booking_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(booking_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_free_space(
        &self,
        car_park_id: &str,
        user: &str,
        booked_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimedSpace>> {
        let claimed = sqlx::query_as::<_, ClaimedSpace>(
            r#"
            WITH picked AS (
                SELECT id, last_booker
                FROM parking_spaces
                WHERE carpark = $1
                AND booked_until < $4
                ORDER BY booked_until ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE parking_spaces AS s
            SET last_booker = $2,
                booked_until = $3
            FROM picked
            WHERE s.id = picked.id
            RETURNING s.id, s.carpark, s.location, s.booked_until, s.last_booker,
                      picked.last_booker AS previous_booker
            "#,
        )
        .bind(car_park_id)
        .bind(user)
        .bind(booked_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed)
    }

    async fn expired_spaces(&self, now: DateTime<Utc>) -> Result<Vec<ParkingSpace>> {
        let spaces = sqlx::query_as::<_, ParkingSpace>(
            r#"
            SELECT id, carpark, location, booked_until, last_booker
            FROM parking_spaces
            WHERE booked_until < $1
            ORDER BY id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(spaces)
    }

    async fn release_space(
        &self,
        space_id: &str,
        expected_booker: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE parking_spaces
            SET last_booker = ''
            WHERE id = $1
            AND last_booker = $2
            AND last_booker <> ''
            AND booked_until < $3
            "#,
        )
        .bind(space_id)
        .bind(expected_booker)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace_all_spaces(&self, spaces: Vec<NewParkingSpace>) -> Result<(u64, u64)> {
        let mut ids = Vec::with_capacity(spaces.len());
        let mut carparks = Vec::with_capacity(spaces.len());
        let mut locations = Vec::with_capacity(spaces.len());
        let mut booked_until = Vec::with_capacity(spaces.len());
        for space in spaces {
            ids.push(space.id);
            carparks.push(space.carpark);
            locations.push(space.location);
            booked_until.push(space.booked_until);
        }

        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM parking_spaces")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let inserted = sqlx::query(
            r#"
            INSERT INTO parking_spaces (id, carpark, location, booked_until, last_booker)
            SELECT id, carpark, location, booked_until, ''
            FROM UNNEST($1::text[], $2::text[], $3::text[], $4::timestamptz[])
                AS t(id, carpark, location, booked_until)
            "#,
        )
        .bind(&ids)
        .bind(&carparks)
        .bind(&locations)
        .bind(&booked_until)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok((deleted, inserted))
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let acquired: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO job_leases (name, holder, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
            SET holder = EXCLUDED.holder,
                expires_at = EXCLUDED.expires_at
            WHERE job_leases.expires_at <= $4
            RETURNING holder
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(expires_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(acquired.as_deref() == Some(holder))
    }

    async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        sqlx::query("DELETE FROM job_leases WHERE name = $1 AND holder = $2")
            .bind(name)
            .bind(holder)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
