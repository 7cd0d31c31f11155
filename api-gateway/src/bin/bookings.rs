//! Bookings Lambda - Records a parking booking.
//!
//! Endpoints:
//! - POST /bookings?TimeStart={epoch}&Duration={seconds}&CarPark={id}&User={phone}
//!
//! The mobile app issues the same request as a GET, so both methods are
//! accepted. The booking is bound to a concrete space by the reconciler once
//! its start time arrives.

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::engine::{create_booking, BookingRequest};
use shared::http::{error_response, error_to_response, json_response, preflight_response, route_path, ApiResponse};
use shared::{Config, ParkingStore, PgParkingStore, SecretsCache};
use std::sync::Arc;
use tracing::{error, info, warn};
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

        ("POST", "/bookings") | ("GET", "/bookings") => {
            let params = event.query_string_parameters();
            let request = BookingRequest::from_params(|key| params.first(key));

            let booking = match request.into_new_booking() {
                Ok(booking) => booking,
                Err(e) => {
                    warn!(error = %e, "Rejected booking request");
                    return error_to_response(&e);
                }
            };

            match create_booking(state.store.as_ref(), booking).await {
                Ok(stored) => {
                    info!(booking_id = %stored.id, "Booking accepted");
                    json_response(201, &ApiResponse::<()>::ok())
                }
                Err(e) => {
                    error!(error = %e, "Failed to create booking");
                    error_to_response(&e)
                }
            }
        }

        (_, "/bookings") => error_response(405, "Method not allowed"),

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
