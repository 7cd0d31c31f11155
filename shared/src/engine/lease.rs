//! Time-bounded named leases.
//!
//! EventBridge may start a new run while the previous one is still going; a
//! run only proceeds while it holds the lease. A crashed holder blocks others
//! until the lease expires.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::store::ParkingStore;
use crate::{Error, Result};

pub struct Lease {
    store: Arc<dyn ParkingStore>,
    name: String,
    holder: String,
}

impl Lease {
    /// Try to take `name` for `ttl`. Returns `None` if someone else holds it.
    pub async fn try_acquire(
        store: Arc<dyn ParkingStore>,
        name: &str,
        holder: &str,
        ttl: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::Config(format!("lease duration {} out of range", ttl)))?;

        if !store.try_acquire_lease(name, holder, expires_at, now).await? {
            debug!(lease = name, holder, "Lease held elsewhere");
            return Ok(None);
        }

        Ok(Some(Self {
            store,
            name: name.to_string(),
            holder: holder.to_string(),
        }))
    }

    /// Give the lease back. Failure only delays the next run until expiry.
    pub async fn release(self) {
        if let Err(e) = self.store.release_lease(&self.name, &self.holder).await {
            warn!(lease = %self.name, holder = %self.holder, error = %e, "Failed to release lease");
        }
    }
}
