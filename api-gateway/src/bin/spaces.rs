//! Spaces Lambda - Rebuilds the parking space inventory.
//!
//! Endpoints:
//! - POST /spaces/provision - Delete every space and create 50 per car park

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::engine::provision_spaces;
use shared::http::{error_response, error_to_response, json_response, preflight_response, route_path, ApiResponse};
use shared::{Config, ParkingStore, PgParkingStore, SecretsCache};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Application state
struct AppState {
    store: Arc<dyn ParkingStore>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let secrets = SecretsCache::new(aws_sdk_secretsmanager::Client::new(&aws_config));

        let credentials = secrets.database_credentials(&config.db_secret_arn).await?;
        let pool = shared::db::create_pool(&config, &credentials).await?;

        Ok(Self {
            store: Arc::new(PgParkingStore::new(pool)),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let path = route_path(event.uri().path());
    let method = event.method().as_str();

    match (method, path) {
        ("OPTIONS", _) => preflight_response(),

        ("POST", "/spaces/provision") => match provision_spaces(state.store.as_ref(), Utc::now()).await {
            Ok(report) => {
                info!(deleted = report.deleted, created = report.created, "Provisioned spaces");
                json_response(200, &ApiResponse::success(report))
            }
            Err(e) => {
                error!(error = %e, "Failed to provision spaces");
                error_to_response(&e)
            }
        },

        (_, "/spaces/provision") => error_response(405, "Method not allowed"),

        _ => error_response(404, "Not found"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
