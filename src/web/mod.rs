mod errors;
mod forms;
mod routes;

use axum::http::{StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use log::{error, info};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::store::{EventStore, StoreError};
use crate::telemetry::{Clock, TelemetryError};
use crate::web::errors::json_message;

// ── Shared State ──

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub clock: Arc<dyn Clock>,
    pub public_base_url: String,
}

impl AppState {
    /// Run a store operation off the async runtime.
    ///
    /// The sync postgres client drives its own internal runtime, so the work
    /// goes to a plain thread rather than tokio's blocking pool.
    pub async fn blocking_store<F, T>(&self, f: F) -> Result<T, TelemetryError>
    where
        F: FnOnce(&dyn EventStore, &dyn Clock) -> Result<T, TelemetryError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let (tx, rx) = tokio::sync::oneshot::channel();

        std::thread::spawn(move || {
            let result = f(store.as_ref(), clock.as_ref());
            let _ = tx.send(result);
        });

        rx.await.map_err(|_| {
            error!("[web] store worker thread exited without replying");
            TelemetryError::Storage(StoreError::Unavailable(
                "store worker exited without replying".to_string(),
            ))
        })?
    }
}

// ── Server ──

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::pixel::routes())
        .merge(routes::api_routes())
        .fallback(handle_not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(state: AppState, addr: &str) -> std::io::Result<()> {
    info!(
        "[web] initializing telemetry server on {}, store={}",
        addr,
        state.store.backend()
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("[web] listening on {}", addr);
    axum::serve(listener, app).await
}

async fn handle_not_found(uri: Uri) -> Response {
    json_message(StatusCode::NOT_FOUND, &format!("No route for {}", uri.path()))
}

#[cfg(test)]
pub(crate) mod testing {
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    use super::{router, AppState};
    use crate::store::MemoryStore;
    use crate::telemetry::FixedClock;

    pub const NOW: &str = "2024-01-15T10:30:45.123Z";

    pub fn state(store: Arc<MemoryStore>) -> AppState {
        let now = chrono::DateTime::parse_from_rfc3339(NOW)
            .unwrap()
            .with_timezone(&chrono::Utc);
        AppState {
            store,
            clock: Arc::new(FixedClock(now)),
            public_base_url: "https://app.example.com".to_string(),
        }
    }

    pub async fn send(state: AppState, request: Request<Body>) -> Response<Body> {
        router(state).oneshot(request).await.unwrap()
    }

    pub async fn get(state: AppState, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        read_json(send(state, request).await).await
    }

    pub async fn post_json(state: AppState, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        read_json(send(state, request).await).await
    }

    pub async fn read_json(response: Response<Body>) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

#[cfg(test)]
mod tests {
    use super::testing;
    use crate::store::MemoryStore;
    use axum::http::StatusCode;
    use std::sync::Arc;

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let state = testing::state(Arc::new(MemoryStore::new()));
        let (status, body) = testing::get(state, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "No route for /nope");
    }
}
