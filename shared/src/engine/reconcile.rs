//! Periodic reconciliation.
//!
//! One run makes two passes:
//! 1. every booking whose start time has arrived is claimed (deleted), given
//!    a space, and the user is texted the space's location;
//! 2. every space whose reservation has lapsed and is still attributed to a
//!    user is released and its car park's counter goes back up by one.
//!
//! Pass 1 may hand out a lapsed space before pass 2 reaches it; the allocator
//! then credits the displaced reservation itself, so each reservation is
//! returned to the counter exactly once.
//!
//! Work items within a pass run concurrently up to a fixed bound, and the
//! pass waits for all of them. Item failures are collected in the report
//! instead of aborting the run.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::engine::allocation::{allocate_space, Allocation, Reclaim};
use crate::engine::lease::Lease;
use crate::models::{Booking, ParkingSpace};
use crate::sms::{Delivery, Notifier};
use crate::store::ParkingStore;
use crate::{Error, Result};

/// Lease name shared by all reconciliation runs.
pub const RECONCILE_LEASE: &str = "reconciler";

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Concurrent work items per pass
    pub concurrency: usize,
    /// Lifetime of the run lease
    pub lease_ttl: TimeDelta,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            lease_ttl: TimeDelta::minutes(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent,
    Suppressed,
    Failed(String),
}

/// What happened to one due booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueOutcome {
    /// Another run deleted the booking first.
    AlreadyClaimed,
    Allocated {
        space_id: String,
        location: String,
        reclaim: Reclaim,
        notification: NotificationOutcome,
    },
    /// No free space; the booking was put back for the next run.
    Requeued,
    /// No free space and the booking has already ended.
    Dropped,
}

/// What happened to one expired space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Not attributed to anyone.
    Skipped,
    Released { spaces_left: Option<i32> },
    /// The space changed between listing and release.
    LostRace,
}

/// Summary of a reconciliation run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Another run held the lease; nothing was done.
    pub skipped: bool,
    pub bookings_due: u32,
    pub bookings_already_claimed: u32,
    pub spaces_allocated: u32,
    /// Allocations that took over a reservation not yet released.
    pub spaces_reclaimed: u32,
    pub notifications_sent: u32,
    pub notifications_suppressed: u32,
    pub notification_failures: u32,
    pub bookings_requeued: u32,
    pub bookings_dropped: u32,
    pub spaces_expired: u32,
    pub spaces_released: u32,
    pub releases_lost: u32,
    pub failures: Vec<String>,
}

impl ReconcileReport {
    fn record_due(&mut self, booking_id: &str, outcome: Result<DueOutcome>) {
        match outcome {
            Ok(DueOutcome::AlreadyClaimed) => self.bookings_already_claimed += 1,
            Ok(DueOutcome::Allocated {
                space_id,
                reclaim,
                notification,
                ..
            }) => {
                self.spaces_allocated += 1;
                match reclaim {
                    Reclaim::NotNeeded => {}
                    Reclaim::Credited { .. } => self.spaces_reclaimed += 1,
                    Reclaim::Failed(reason) => self
                        .failures
                        .push(format!("counter credit for space {}: {}", space_id, reason)),
                }
                match notification {
                    NotificationOutcome::Sent => self.notifications_sent += 1,
                    NotificationOutcome::Suppressed => self.notifications_suppressed += 1,
                    NotificationOutcome::Failed(reason) => {
                        self.notification_failures += 1;
                        self.failures
                            .push(format!("notification for booking {}: {}", booking_id, reason));
                    }
                }
            }
            Ok(DueOutcome::Requeued) => self.bookings_requeued += 1,
            Ok(DueOutcome::Dropped) => self.bookings_dropped += 1,
            Err(e) => {
                error!(booking_id, error = %e, "Failed to settle due booking");
                self.failures.push(format!("booking {}: {}", booking_id, e));
            }
        }
    }

    fn record_release(&mut self, space_id: &str, outcome: Result<ReleaseOutcome>) {
        match outcome {
            Ok(ReleaseOutcome::Skipped) => {}
            Ok(ReleaseOutcome::Released { .. }) => self.spaces_released += 1,
            Ok(ReleaseOutcome::LostRace) => self.releases_lost += 1,
            Err(e) => {
                error!(space_id, error = %e, "Failed to release space");
                self.failures.push(format!("space {}: {}", space_id, e));
            }
        }
    }
}

/// Run both passes under the reconciliation lease.
pub async fn reconcile(
    store: Arc<dyn ParkingStore>,
    notifier: Arc<Notifier>,
    settings: &ReconcileSettings,
    run_id: &str,
    now: DateTime<Utc>,
) -> Result<ReconcileReport> {
    let Some(lease) =
        Lease::try_acquire(store.clone(), RECONCILE_LEASE, run_id, settings.lease_ttl, now).await?
    else {
        info!(run_id, "Previous reconciliation still running; skipping");
        return Ok(ReconcileReport {
            skipped: true,
            ..Default::default()
        });
    };

    let mut report = ReconcileReport::default();
    let result = run_passes(store, notifier, settings, now, &mut report).await;
    lease.release().await;
    result?;

    info!(
        run_id,
        bookings_due = report.bookings_due,
        spaces_allocated = report.spaces_allocated,
        spaces_reclaimed = report.spaces_reclaimed,
        notifications_sent = report.notifications_sent,
        bookings_requeued = report.bookings_requeued,
        spaces_released = report.spaces_released,
        failures = report.failures.len(),
        "Reconciliation complete"
    );

    Ok(report)
}

async fn run_passes(
    store: Arc<dyn ParkingStore>,
    notifier: Arc<Notifier>,
    settings: &ReconcileSettings,
    now: DateTime<Utc>,
    report: &mut ReconcileReport,
) -> Result<()> {
    let due = store.due_bookings(now).await?;
    report.bookings_due = due.len() as u32;
    info!(bookings_due = due.len(), "Settling due bookings");

    let settled = fan_out(due, settings.concurrency, |booking: Booking| {
        let store = store.clone();
        let notifier = notifier.clone();
        async move {
            let booking_id = booking.id.clone();
            let outcome = settle_due_booking(store.as_ref(), &notifier, booking, now).await;
            (booking_id, outcome)
        }
    })
    .await?;
    for finished in settled {
        match finished {
            Ok((booking_id, outcome)) => report.record_due(&booking_id, outcome),
            Err(failure) => report.failures.push(failure),
        }
    }

    let expired = store.expired_spaces(now).await?;
    report.spaces_expired = expired.len() as u32;
    let attributed: Vec<ParkingSpace> = expired
        .into_iter()
        .filter(ParkingSpace::is_attributed)
        .collect();
    info!(
        spaces_expired = report.spaces_expired,
        to_release = attributed.len(),
        "Releasing expired spaces"
    );

    let released = fan_out(attributed, settings.concurrency, |space: ParkingSpace| {
        let store = store.clone();
        async move {
            let space_id = space.id.clone();
            let outcome = release_expired_space(store.as_ref(), &space, now).await;
            (space_id, outcome)
        }
    })
    .await?;
    for finished in released {
        match finished {
            Ok((space_id, outcome)) => report.record_release(&space_id, outcome),
            Err(failure) => report.failures.push(failure),
        }
    }

    Ok(())
}

/// Run `work` over `items` on a task set, at most `concurrency` at a time,
/// and wait for every task. A panicking task yields an `Err` entry.
async fn fan_out<T, O, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    work: F,
) -> Result<Vec<std::result::Result<O, String>>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = O> + Send + 'static,
    O: Send + 'static,
{
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for item in items {
        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Internal(format!("worker pool closed: {}", e)))?;
        let job = work(item);
        tasks.spawn(async move {
            let _permit = permit;
            job.await
        });
    }

    let mut finished = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        finished.push(joined.map_err(|e| format!("worker task failed: {}", e)));
    }

    Ok(finished)
}

/// Claim a due booking, allocate a space for it and notify the user.
pub async fn settle_due_booking(
    store: &dyn ParkingStore,
    notifier: &Notifier,
    booking: Booking,
    now: DateTime<Utc>,
) -> Result<DueOutcome> {
    if !store.delete_booking(&booking.id).await? {
        info!(booking_id = %booking.id, "Booking already claimed by another run");
        return Ok(DueOutcome::AlreadyClaimed);
    }
    info!(booking_id = %booking.id, "Deleted booking");

    let allocation =
        match allocate_space(store, &booking.car_park, &booking.user, booking.time_end, now).await {
            Ok(allocation) => allocation,
            Err(e) => {
                // The booking row is gone; put it back so the failure is retried.
                if let Err(restore_error) = store.restore_booking(&booking).await {
                    error!(
                        booking_id = %booking.id,
                        error = %restore_error,
                        "Failed to restore booking after allocation error"
                    );
                }
                return Err(e);
            }
        };

    let (space, reclaim) = match allocation {
        Allocation::Assigned { space, reclaim } => (space, reclaim),
        Allocation::NoSpaceAvailable => return requeue_or_drop(store, &booking, now).await,
    };

    let message = format!("Your parking space is {}", space.location);
    let notification = match notifier.send(&message, &booking.user).await {
        Ok(Delivery::Sent { message_id }) => {
            info!(booking_id = %booking.id, message_id = %message_id, "Notification sent");
            NotificationOutcome::Sent
        }
        Ok(Delivery::Suppressed) => NotificationOutcome::Suppressed,
        Err(e) => {
            warn!(booking_id = %booking.id, error = %e, "Failed to send notification");
            NotificationOutcome::Failed(e.to_string())
        }
    };

    Ok(DueOutcome::Allocated {
        space_id: space.id,
        location: space.location,
        reclaim,
        notification,
    })
}

async fn requeue_or_drop(
    store: &dyn ParkingStore,
    booking: &Booking,
    now: DateTime<Utc>,
) -> Result<DueOutcome> {
    if booking.time_end <= now {
        warn!(
            booking_id = %booking.id,
            car_park_id = %booking.car_park,
            time_end = %booking.time_end,
            "No space became free before the booking ended; dropping it"
        );
        return Ok(DueOutcome::Dropped);
    }

    store.restore_booking(booking).await?;
    warn!(
        booking_id = %booking.id,
        car_park_id = %booking.car_park,
        "No free space; booking requeued for the next run"
    );
    Ok(DueOutcome::Requeued)
}

/// Release a lapsed reservation and return the space to its car park's
/// counter.
pub async fn release_expired_space(
    store: &dyn ParkingStore,
    space: &ParkingSpace,
    now: DateTime<Utc>,
) -> Result<ReleaseOutcome> {
    if !space.is_attributed() {
        return Ok(ReleaseOutcome::Skipped);
    }

    if !store.release_space(&space.id, &space.last_booker, now).await? {
        info!(space_id = %space.id, "Space changed since listing; leaving it");
        return Ok(ReleaseOutcome::LostRace);
    }

    let spaces_left = store.adjust_spaces_left(&space.carpark, 1).await?;
    match spaces_left {
        Some(spaces_left) => {
            info!(space_id = %space.id, car_park_id = %space.carpark, spaces_left, "Space released")
        }
        None => {
            warn!(space_id = %space.id, car_park_id = %space.carpark, "Released space belongs to unknown car park")
        }
    }

    Ok(ReleaseOutcome::Released { spaces_left })
}
