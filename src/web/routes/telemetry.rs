use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, info};
use serde::Serialize;
use serde_json::json;

use crate::telemetry::{summarize, Aggregator, Range, Recorder, Summary};
use crate::web::errors::telemetry_error_response;
use crate::web::forms::{RecordBody, StatsQuery};
use crate::web::AppState;

#[derive(Serialize)]
struct SummaryResponse {
    range: Range,
    #[serde(flatten)]
    summary: Summary,
}

// ── POST /api/telemetry ──

pub async fn record(State(state): State<AppState>, Json(body): Json<RecordBody>) -> Response {
    debug!(
        "[web] POST /api/telemetry page={}, timestamp={:?}",
        body.page, body.timestamp
    );
    let RecordBody { page, timestamp } = body;

    let result = state
        .blocking_store(move |store, clock| {
            Recorder::new(store, clock).record(&page, timestamp.as_deref())
        })
        .await;

    match result {
        Ok(record) => {
            info!("[web] telemetry recorded page={}", record.page);
            (StatusCode::OK, Json(json!({ "success": true }))).into_response()
        }
        Err(e) => telemetry_error_response(&e, "Failed to record telemetry"),
    }
}

// ── GET /api/telemetry/stats ──

pub async fn stats(State(state): State<AppState>, Query(q): Query<StatsQuery>) -> Response {
    let range = Range::parse(&q.range);
    info!("[web] GET /api/telemetry/stats range={}, page={}", range.as_str(), q.page);

    let page = q.page;
    let result = state
        .blocking_store(move |store, clock| Aggregator::new(store, clock).query(range, Some(page.as_str())))
        .await;

    match result {
        Ok(buckets) => (StatusCode::OK, Json(buckets)).into_response(),
        Err(e) => telemetry_error_response(&e, "Failed to fetch telemetry stats"),
    }
}

// ── GET /api/telemetry/summary ──

pub async fn summary(State(state): State<AppState>, Query(q): Query<StatsQuery>) -> Response {
    let range = Range::parse(&q.range);
    info!("[web] GET /api/telemetry/summary range={}, page={}", range.as_str(), q.page);

    let page = q.page;
    let result = state
        .blocking_store(move |store, clock| Aggregator::new(store, clock).query(range, Some(page.as_str())))
        .await;

    match result {
        Ok(buckets) => {
            let summary = summarize(&buckets);
            (StatusCode::OK, Json(SummaryResponse { range, summary })).into_response()
        }
        Err(e) => telemetry_error_response(&e, "Failed to fetch telemetry stats"),
    }
}
