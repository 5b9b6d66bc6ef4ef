use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::warn;
use serde_json::json;

use crate::links::LinkError;
use crate::telemetry::TelemetryError;

pub fn json_message(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

/// Validation problems echo their message back. Storage failures are
/// reported with `storage_message` so store internals do not leak.
pub fn telemetry_error_response(err: &TelemetryError, storage_message: &str) -> Response {
    match err {
        TelemetryError::Validation(message) => {
            warn!("[web] rejected telemetry request: {}", message);
            json_message(StatusCode::BAD_REQUEST, message)
        }
        TelemetryError::Storage(_) => json_message(StatusCode::INTERNAL_SERVER_ERROR, storage_message),
    }
}

pub fn link_error_response(err: &LinkError) -> Response {
    warn!("[web] rejected link request: {}", err);
    json_message(StatusCode::BAD_REQUEST, &err.to_string())
}
