use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, info};
use serde::Serialize;
use serde_json::json;

use crate::links::{AbiFunction, TransactionLink};
use crate::web::errors::link_error_response;
use crate::web::forms::{CallBody, LinkBody};
use crate::web::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewResponse {
    contract: String,
    chain_id: u64,
    rpc_url: String,
    functions: Vec<AbiFunction>,
}

// ── POST /api/links ──

pub async fn create(State(state): State<AppState>, Json(body): Json<LinkBody>) -> Response {
    debug!("[web] POST /api/links contract={}", body.contract);
    let link = match TransactionLink::new(&body.contract, &body.chain_id_text(), &body.rpc_url, &body.abi_text()) {
        Ok(link) => link,
        Err(e) => return link_error_response(&e),
    };

    match link.encode(&state.public_base_url) {
        Ok(url) => (StatusCode::OK, Json(json!({ "link": url }))).into_response(),
        Err(e) => link_error_response(&e),
    }
}

// ── GET /api/links/review ──

pub async fn review(RawQuery(query): RawQuery) -> Response {
    let query = query.unwrap_or_default();
    debug!("[web] GET /api/links/review query_len={}", query.len());

    match TransactionLink::decode(&query) {
        Ok(link) => {
            let functions = link.functions();
            info!(
                "[web] link reviewed contract={}, chain_id={}, functions={}",
                link.contract,
                link.chain_id,
                functions.len()
            );
            let response = ReviewResponse {
                contract: link.contract,
                chain_id: link.chain_id,
                rpc_url: link.rpc_url,
                functions,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => link_error_response(&e),
    }
}

// ── POST /api/links/call ──

pub async fn call(Json(body): Json<CallBody>) -> Response {
    debug!("[web] POST /api/links/call function={}", body.function);
    let prepared = TransactionLink::decode(&body.link)
        .and_then(|link| link.prepare_call(&body.function, &body.params));

    match prepared {
        Ok(call) => {
            info!(
                "[web] prepared call contract={}, function={}, args={}",
                call.contract,
                call.function_name,
                call.args.len()
            );
            (StatusCode::OK, Json(call)).into_response()
        }
        Err(e) => link_error_response(&e),
    }
}
