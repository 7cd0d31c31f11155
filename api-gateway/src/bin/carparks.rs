//! Car Parks Lambda - Lists car parks and reports how full they are.
//!
//! Endpoints:
//! - GET /carparks - List car parks
//! - GET /carparks/full?carpark={id} - Count free spaces in a car park

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::engine::check_fullness;
use shared::http::{error_response, error_to_response, json_response, preflight_response, route_path, FunctionResponse};
use shared::{CarParkSummary, Config, ParkingStore, PgParkingStore, SecretsCache};
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

        ("GET", "/carparks") => match state.store.list_car_parks().await {
            Ok(car_parks) => {
                let summaries: Vec<CarParkSummary> =
                    car_parks.into_iter().map(CarParkSummary::from).collect();
                info!(count = summaries.len(), "Listed car parks");
                json_response(200, &FunctionResponse::new("GetCarParkList", summaries))
            }
            Err(e) => {
                error!(error = %e, "Failed to list car parks");
                error_to_response(&e)
            }
        },

        ("GET", "/carparks/full") => {
            let params = event.query_string_parameters();
            let Some(car_park_id) = params.first("carpark") else {
                return error_response(400, "carpark parameter required");
            };

            match check_fullness(state.store.as_ref(), car_park_id, Utc::now()).await {
                Ok(fullness) => {
                    info!(
                        car_park_id,
                        spaces = fullness.spaces,
                        full = fullness.full,
                        "{} spaces available",
                        fullness.spaces
                    );
                    json_response(200, &FunctionResponse::new("CarParkFull", fullness))
                }
                Err(e) => {
                    error!(car_park_id, error = %e, "Failed to check car park");
                    error_to_response(&e)
                }
            }
        }

        (_, "/carparks") | (_, "/carparks/full") => error_response(405, "Method not allowed"),

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
