use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::{json, Value};

use crate::auth::UserIdentity;
use crate::controller::{ChallengeController, SubmitOutcome};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::puzzle::{VERIFY_GLOBAL_NAME, VERIFY_LOG_LINE};
use crate::server::AppState;
use crate::validator::Submission;

/// GET /api/challenges/:challenge_id - open (or resume) the challenge
pub async fn challenge_get(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
    Extension(identity): Extension<UserIdentity>,
) -> ApiResult<Value> {
    let view = state
        .with_session(&challenge_id, &identity, |session| Ok(challenge_view(&session.controller)))
        .await?;
    Ok(ApiResponse::success(view))
}

/// POST /api/challenges/:challenge_id/steps/:step - submit answers for a step
pub async fn step_post(
    State(state): State<Arc<AppState>>,
    Path((challenge_id, step)): Path<(String, u8)>,
    Extension(identity): Extension<UserIdentity>,
    Json(fields): Json<Value>,
) -> ApiResult<SubmitOutcome> {
    let submission = Submission::from_fields(step, fields)?;

    let outcome = state
        .with_session(&challenge_id, &identity, |session| {
            Ok(session.controller.submit(submission)?)
        })
        .await?;
    Ok(ApiResponse::success(outcome))
}

/// DELETE /api/challenges/:challenge_id - forget all progress
///
/// The session is closed afterwards; the next request opens a fresh page.
pub async fn challenge_delete(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
    Extension(identity): Extension<UserIdentity>,
) -> ApiResult<Value> {
    let view = state
        .with_session(&challenge_id, &identity, |session| {
            session.controller.reset()?;
            Ok(challenge_view(&session.controller))
        })
        .await?;
    state.close_session(&challenge_id, &identity).await;
    Ok(ApiResponse::success(view))
}

/// GET /api/challenges/:challenge_id/devtools - what developer tools would show
pub async fn devtools_get(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
    Extension(identity): Extension<UserIdentity>,
) -> ApiResult<Value> {
    let view = state
        .with_session(&challenge_id, &identity, |session| {
            Ok(json!({
                "active_step": session.controller.injector().active_step(),
                "page": session.page.snapshot(),
            }))
        })
        .await?;
    Ok(ApiResponse::success(view))
}

/// POST /api/challenges/:challenge_id/devtools/verify - run the injected verify()
pub async fn verify_post(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
    Extension(identity): Extension<UserIdentity>,
) -> ApiResult<Value> {
    let sentinel = state
        .with_session(&challenge_id, &identity, |session| {
            session
                .page
                .call_verify(VERIFY_GLOBAL_NAME)
                .ok_or_else(|| ApiError::not_found(format!("{} is not defined", VERIFY_GLOBAL_NAME)))
        })
        .await?;

    Ok(ApiResponse::success(json!({
        "console": VERIFY_LOG_LINE,
        "result": sentinel,
    })))
}

fn challenge_view(controller: &ChallengeController) -> Value {
    let steps: Vec<Value> = controller
        .step_statuses()
        .into_iter()
        .map(|(step, status)| json!({ "step": step, "status": status }))
        .collect();

    json!({
        "challenge_id": controller.challenge_id(),
        "user": {
            "id": controller.identity().id,
            "signature_name": controller.identity().signature_name(),
        },
        "state": controller.state(),
        "steps": steps,
        "puzzle": controller.bundle().public_view(),
        "progress": controller.record(),
    })
}
