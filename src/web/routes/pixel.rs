//! Tracking beacon. Pages embed `<img src="/pixel?page=...">`; the visit is
//! recorded in the background and the image is always served.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use log::{debug, error};

use crate::telemetry::Recorder;
use crate::web::forms::PixelQuery;
use crate::web::AppState;

/// 1x1 transparent GIF89a.
pub const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, // GIF89a header
    0x01, 0x00, 0x01, 0x00,             // Width: 1, Height: 1
    0x80, 0x00, 0x00,                   // Global color table flag, color resolution, sort flag, global color table size
    0xff, 0xff, 0xff,                   // Color 0 (white)
    0x00, 0x00, 0x00,                   // Color 1 (black)
    0x21, 0xf9, 0x04,                   // Graphic control extension
    0x01, 0x00, 0x00, 0x00, 0x00,       // Transparent color flag, delay, transparent index 0
    0x2c, 0x00, 0x00, 0x00, 0x00,       // Image descriptor
    0x01, 0x00, 0x01, 0x00, 0x00,       // Width, height, no local color table
    0x02, 0x02, 0x44, 0x01, 0x00,       // LZW minimum code size, image data
    0x3b,                               // Trailer
];

pub fn routes() -> Router<AppState> {
    Router::new().route("/pixel", get(pixel_handler))
}

async fn pixel_handler(State(state): State<AppState>, Query(params): Query<PixelQuery>) -> Response {
    let page = params.page.trim().to_string();
    debug!(
        "[web] GET /pixel page={}",
        if page.is_empty() { "(empty)" } else { page.as_str() }
    );

    if !page.is_empty() {
        tokio::spawn(async move {
            let result = state
                .blocking_store(move |store, clock| Recorder::new(store, clock).record(&page, None))
                .await;
            if let Err(e) = result {
                error!("[web] pixel visit not recorded: {}", e);
            }
        });
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        PIXEL_GIF,
    )
        .into_response()
}
