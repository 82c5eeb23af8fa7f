//! Job creation, reads, and generation submission handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use promo_models::{Job, JobId, VideoField};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_URL_LEN: usize = 2048;
const MAX_PROMPT_LEN: usize = 4000;
const MAX_SCRIPT_LEN: usize = 8000;

// ============================================================================
// Types
// ============================================================================

/// Create job request. The asset pipeline calls this once per uploaded image;
/// `script_ready` marks the avatar slot as awaiting user submission.
#[derive(Deserialize, Default)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub script_ready: bool,
}

#[derive(Deserialize)]
pub struct SubmitAvatarRequest {
    pub script: String,
    pub image_url: String,
}

#[derive(Deserialize)]
pub struct SubmitCinematicRequest {
    pub prompt: String,
    pub image_url: String,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    /// The provider's job/task id now carried by the `pending:` marker.
    pub external_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new job record.
pub async fn create_job(
    State(state): State<AppState>,
    body: Option<Json<CreateJobRequest>>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let request = body.map(|Json(b)| b).unwrap_or_default();

    let mut job = Job::new(JobId::new());
    if request.script_ready {
        job.avatar_video = Some(VideoField::ScriptReady);
        job.status = job.recomputed_status();
    }

    info!(job_id = %job.id, script_ready = request.script_ready, "Created job");
    state.store.insert(job.clone()).await?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// Fetch a job by id. The UI polls this while videos generate.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job_id = JobId::from(job_id);
    let job = state
        .store
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {}", job_id)))?;
    Ok(Json(job))
}

/// Submit the avatar video for generation.
pub async fn submit_avatar_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<SubmitAvatarRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    validate_image_url(&request.image_url)?;
    if request.script.trim().is_empty() {
        return Err(ApiError::bad_request("script must not be empty"));
    }
    if request.script.len() > MAX_SCRIPT_LEN {
        return Err(ApiError::bad_request("script is too long"));
    }

    let job_id = JobId::from(job_id);
    let external_id = state
        .submitter
        .submit_avatar(&job_id, &request.image_url, &request.script)
        .await?;

    Ok(Json(SubmitResponse {
        success: true,
        external_id,
    }))
}

/// Submit the cinematic video for generation.
///
/// Long-polls the provider within this request when it completes fast enough;
/// otherwise the job is left `pending:` and finished by the sweep or webhook.
pub async fn submit_cinematic_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<SubmitCinematicRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    validate_image_url(&request.image_url)?;
    if request.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    if request.prompt.len() > MAX_PROMPT_LEN {
        return Err(ApiError::bad_request("prompt is too long"));
    }

    let job_id = JobId::from(job_id);
    let external_id = state
        .submitter
        .submit_cinematic(&job_id, &request.image_url, &request.prompt)
        .await?;

    Ok(Json(SubmitResponse {
        success: true,
        external_id,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn validate_image_url(raw: &str) -> ApiResult<()> {
    if raw.len() > MAX_URL_LEN {
        return Err(ApiError::bad_request("image_url is too long"));
    }
    let parsed = url::Url::parse(raw)
        .map_err(|_| ApiError::bad_request("image_url must be a valid URL"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ApiError::bad_request("image_url must be http(s)"));
    }
    Ok(())
}
