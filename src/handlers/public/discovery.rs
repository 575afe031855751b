// handlers/public/discovery.rs - Endpoints behind the network clues

use axum::{
    extract::Path,
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use crate::clues::CLUE_HEADER;
use crate::error::ApiError;
use crate::middleware::{extract_bearer_token, ApiResponse, ApiResult};
use crate::puzzle::{STEP4_COMPLETION_MARKER, VERIFY_GLOBAL_NAME};

/// POST /api/challenge/step3 - receives the delayed step 3 request.
///
/// The clue itself travels in the request header; the answer is just an
/// acknowledgement.
pub async fn step3_post(headers: HeaderMap, Json(body): Json<Value>) -> ApiResult<Value> {
    let clue_present = headers.contains_key(CLUE_HEADER);
    let user_hash = body.get("user_hash").and_then(Value::as_str).unwrap_or("-");
    tracing::info!(
        user_hash = %user_hash,
        clue_present,
        "step 3 discovery request"
    );

    Ok(ApiResponse::accepted(json!({ "received": true })))
}

/// GET /api/challenge/devtools/:user_hash - step 5 discovery request
pub async fn devtools_get(Path(user_hash): Path<String>) -> ApiResult<Value> {
    tracing::info!(user_hash = %user_hash, "step 5 discovery request");

    Ok(ApiResponse::success(json!({
        "user_hash": user_hash,
        "hint": format!("Call {}.verify() and check local storage", VERIFY_GLOBAL_NAME),
    })))
}

/// GET /api/challenge/secret/:user_hash - the simulated step 4 endpoint.
///
/// Answers with the completion marker only for the matching bearer token.
pub async fn secret_get(Path(user_hash): Path<String>, headers: HeaderMap) -> ApiResult<Value> {
    let token = extract_bearer_token(&headers).map_err(ApiError::unauthorized)?;

    if token != format!("sk_challenge_{}", user_hash) {
        tracing::debug!(user_hash = %user_hash, "secret endpoint rejected bearer token");
        return Err(ApiError::unauthorized("invalid bearer token"));
    }

    Ok(ApiResponse::success(json!({
        "status": STEP4_COMPLETION_MARKER,
        "user_hash": user_hash,
    })))
}
