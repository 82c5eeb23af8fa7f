//! Client-triggered reconciliation sweep.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use promo_models::SweepResult;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct PollPendingResponse {
    pub success: bool,
    pub checked: u32,
    pub updated: u32,
    pub processing: u32,
    pub errors: u32,
    pub timed_out: u32,
    pub results: Vec<SweepResult>,
}

/// `GET /api/videos/poll-pending` — run one sweep and report what changed.
///
/// The browser calls this on its poll interval; it shares the sweep code
/// path with the background loop and performs no writes of its own.
pub async fn poll_pending(State(state): State<AppState>) -> ApiResult<Json<PollPendingResponse>> {
    let report = state.reconciler.sweep().await;

    Ok(Json(PollPendingResponse {
        success: true,
        checked: report.checked,
        updated: report.updated,
        processing: report.still_processing,
        errors: report.errors,
        timed_out: report.timed_out,
        results: report.results,
    }))
}
