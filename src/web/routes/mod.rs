pub mod health;
pub mod links;
pub mod pixel;
pub mod telemetry;

use super::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/telemetry", post(telemetry::record))
        .route("/api/telemetry/stats", get(telemetry::stats))
        .route("/api/telemetry/summary", get(telemetry::summary))
        .route("/api/links", post(links::create))
        .route("/api/links/review", get(links::review))
        .route("/api/links/call", post(links::call))
        .route("/health", get(health::check))
}
