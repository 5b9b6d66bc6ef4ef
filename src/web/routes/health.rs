use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use log::error;
use serde_json::json;

use crate::web::AppState;

pub async fn check(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.store.backend();
    let probe = state
        .blocking_store(|store, _| {
            store.ping()?;
            Ok(())
        })
        .await;

    let (status, label) = match probe {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            error!("[health] store probe failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        status,
        Json(json!({
            "status": label,
            "store": backend,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
