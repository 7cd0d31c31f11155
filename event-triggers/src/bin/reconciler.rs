//! Reconciler Lambda - Allocates booked spaces and releases expired ones.
//!
//! This Lambda runs every minute via EventBridge and:
//! 1. Claims bookings whose start time has passed
//! 2. Allocates a free space to each and texts the user its location
//! 3. Requeues bookings that found no space, dropping those already ended
//! 4. Releases lapsed reservations back to their car park's capacity

use chrono::{TimeDelta, Utc};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::Deserialize;
use shared::engine::{reconcile, ReconcileReport, ReconcileSettings};
use shared::{Config, Notifier, ParkingStore, PgParkingStore, SecretsCache, SnsSmsGateway};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct ScheduledEvent {
    #[serde(default, rename = "detail-type")]
    detail_type: String,
}

struct AppState {
    store: Arc<dyn ParkingStore>,
    notifier: Arc<Notifier>,
    settings: ReconcileSettings,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let secrets = SecretsCache::new(aws_sdk_secretsmanager::Client::new(&aws_config));
        let sns_client = aws_sdk_sns::Client::new(&aws_config);

        let credentials = secrets.database_credentials(&config.db_secret_arn).await?;
        let pool = shared::db::create_pool(&config, &credentials).await?;

        let gateway = SnsSmsGateway::new(sns_client, config.sms_origination_number.clone());
        let notifier = Notifier::new(Arc::new(gateway), config.suppressed_phone_number.clone());

        let lease_ttl = TimeDelta::try_seconds(config.reconcile_lease_seconds)
            .filter(|ttl| *ttl > TimeDelta::zero())
            .ok_or("RECONCILE_LEASE_SECONDS must be positive")?;

        Ok(Self {
            store: Arc::new(PgParkingStore::new(pool)),
            notifier: Arc::new(notifier),
            settings: ReconcileSettings {
                concurrency: config.reconcile_concurrency,
                lease_ttl,
            },
        })
    }
}

async fn handler(
    state: Arc<AppState>,
    event: LambdaEvent<ScheduledEvent>,
) -> Result<ReconcileReport, Error> {
    let run_id = Uuid::new_v4().to_string();
    info!(
        run_id = %run_id,
        request_id = %event.context.request_id,
        detail_type = %event.payload.detail_type,
        "Starting reconciliation"
    );

    let report = reconcile(
        state.store.clone(),
        state.notifier.clone(),
        &state.settings,
        &run_id,
        Utc::now(),
    )
    .await?;

    if !report.failures.is_empty() {
        warn!(
            run_id = %run_id,
            failures = ?report.failures,
            "Reconciliation finished with failures"
        );
    }

    Ok(report)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);
    let state_clone = state.clone();

    run(service_fn(move |event| {
        let state = state_clone.clone();
        async move { handler(state, event).await }
    }))
    .await
}
