//! Provider webhook receiver.
//!
//! One endpoint absorbs pushes from both providers plus an internal
//! simplified shape used by smoke tooling. Every payload is normalized into
//! a [`WebhookEvent`] before any store access; the write itself is the same
//! guarded update the sweep uses, so duplicates and out-of-order deliveries
//! collapse into no-ops. The receiver always answers quickly; it never
//! fetches from a provider.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use promo_models::{JobId, VideoField, VideoKind, WebhookEvent, WebhookOutcome};
use promo_providers::rejection_reason_for;
use promo_store::{Guard, JobStore};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

// ============================================================================
// Payload shapes
// ============================================================================

/// Internal simplified shape: `{ job_id, kind, url | error }`.
#[derive(Deserialize)]
struct InternalPayload {
    job_id: String,
    kind: VideoKind,
    url: Option<String>,
    error: Option<String>,
}

/// Provider B native shape: `{ taskId, status, output?, failureReason? }`.
#[derive(Deserialize)]
struct CinematicPayload {
    #[serde(rename = "taskId")]
    task_id: String,
    status: String,
    #[serde(default)]
    output: Vec<String>,
    #[serde(rename = "failureReason")]
    failure_reason: Option<String>,
}

/// Provider A native shape: `{ id, status, result_url?, error?, user_data? }`.
/// `user_data` echoes the job id we attached at creation.
#[derive(Deserialize)]
struct AvatarPayload {
    id: String,
    status: String,
    result_url: Option<String>,
    error: Option<Value>,
    user_data: Option<String>,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    /// Whether a state change was actually written.
    pub applied: bool,
}

// ============================================================================
// Handler
// ============================================================================

/// `POST /webhooks/video` — receive a provider completion push.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<WebhookResponse>> {
    let Some(event) = normalize(&state, &payload).await? else {
        // Recognized shape, non-terminal status: acknowledged, no write.
        metrics::record_webhook("skipped");
        return Ok(Json(WebhookResponse {
            success: true,
            applied: false,
        }));
    };

    let applied = apply_event(state.store.as_ref(), &event).await?;
    metrics::record_webhook(if applied { "applied" } else { "skipped" });

    Ok(Json(WebhookResponse {
        success: true,
        applied,
    }))
}

/// Parse a raw payload into a normalized event, or `None` for acknowledged
/// no-ops (non-terminal statuses, jobs we cannot correlate).
async fn normalize(state: &AppState, payload: &Value) -> ApiResult<Option<WebhookEvent>> {
    if let Ok(p) = serde_json::from_value::<InternalPayload>(payload.clone()) {
        return Ok(normalize_internal(p));
    }
    if let Ok(p) = serde_json::from_value::<CinematicPayload>(payload.clone()) {
        return normalize_cinematic(state, p).await;
    }
    if let Ok(p) = serde_json::from_value::<AvatarPayload>(payload.clone()) {
        return normalize_avatar(state, p).await;
    }

    metrics::record_webhook("malformed");
    Err(ApiError::bad_request("Unrecognized webhook payload shape"))
}

fn normalize_internal(p: InternalPayload) -> Option<WebhookEvent> {
    let outcome = match (p.url, p.error) {
        (Some(url), _) => WebhookOutcome::Success { url },
        (None, Some(error)) => WebhookOutcome::Failure {
            reason: rejection_reason_for(&error).to_string(),
        },
        (None, None) => WebhookOutcome::InProgress,
    };

    Some(WebhookEvent {
        job_id: JobId::from(p.job_id),
        kind: p.kind,
        external_id: None,
        outcome,
    })
}

async fn normalize_cinematic(
    state: &AppState,
    p: CinematicPayload,
) -> ApiResult<Option<WebhookEvent>> {
    let outcome = match p.status.as_str() {
        "SUCCEEDED" => match p.output.into_iter().next() {
            Some(url) => WebhookOutcome::Success { url },
            None => {
                // The sweep resolves this once the provider serves the URL.
                warn!(task_id = %p.task_id, "SUCCEEDED cinematic webhook carried no output");
                return Ok(None);
            }
        },
        "FAILED" => WebhookOutcome::Failure {
            reason: rejection_reason_for(p.failure_reason.as_deref().unwrap_or_default())
                .to_string(),
        },
        _ => return Ok(None),
    };

    // The payload carries only the provider's task id; find the job holding
    // the matching pending marker.
    let Some(job_id) = find_job_by_pending_id(state, VideoKind::Cinematic, &p.task_id).await?
    else {
        info!(task_id = %p.task_id, "Cinematic webhook for unknown task, ignored");
        metrics::record_webhook("unknown_job");
        return Ok(None);
    };

    Ok(Some(WebhookEvent {
        job_id,
        kind: VideoKind::Cinematic,
        external_id: Some(p.task_id),
        outcome,
    }))
}

async fn normalize_avatar(state: &AppState, p: AvatarPayload) -> ApiResult<Option<WebhookEvent>> {
    let outcome = match p.status.as_str() {
        "done" => match p.result_url {
            Some(url) => WebhookOutcome::Success { url },
            None => {
                warn!(talk_id = %p.id, "done avatar webhook carried no result URL");
                return Ok(None);
            }
        },
        "error" => {
            let message = p
                .error
                .as_ref()
                .map(error_message)
                .unwrap_or_default();
            WebhookOutcome::Failure {
                reason: rejection_reason_for(&message).to_string(),
            }
        }
        _ => return Ok(None),
    };

    // user_data echoes the job id we attached at creation; fall back to
    // scanning pending markers for deliveries created without it.
    let job_id = match p.user_data {
        Some(id) if !id.is_empty() => Some(JobId::from(id)),
        _ => find_job_by_pending_id(state, VideoKind::Avatar, &p.id).await?,
    };
    let Some(job_id) = job_id else {
        info!(talk_id = %p.id, "Avatar webhook for unknown talk, ignored");
        metrics::record_webhook("unknown_job");
        return Ok(None);
    };

    Ok(Some(WebhookEvent {
        job_id,
        kind: VideoKind::Avatar,
        external_id: Some(p.id),
        outcome,
    }))
}

/// Apply a normalized terminal event with the appropriate guard.
async fn apply_event(store: &dyn JobStore, event: &WebhookEvent) -> ApiResult<bool> {
    let value = match &event.outcome {
        WebhookOutcome::Success { url } => VideoField::ready(url),
        WebhookOutcome::Failure { reason } => VideoField::failed(reason),
        WebhookOutcome::InProgress => return Ok(false),
    };

    // An exact external id pins the write to this submission; without one
    // any pending marker may be advanced.
    let guard = match &event.external_id {
        Some(id) => Guard::PendingId(id.clone()),
        None => Guard::AnyPending,
    };

    let applied = match store
        .update_if(&event.job_id, event.kind, &guard, Some(value))
        .await
    {
        Ok(applied) => applied,
        Err(promo_store::StoreError::NotFound(_)) => {
            info!(job_id = %event.job_id, "Webhook for unknown job, ignored");
            metrics::record_webhook("unknown_job");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    if !applied {
        info!(
            job_id = %event.job_id,
            field = event.kind.field_name(),
            "Webhook write skipped, field already advanced"
        );
        metrics::record_guard_conflict(event.kind.as_str());
        return Ok(false);
    }

    if event.kind == VideoKind::Cinematic {
        let message = match &event.outcome {
            WebhookOutcome::Failure { .. } => {
                Some("Cinematic video generation failed. Please try again.".to_string())
            }
            _ => None,
        };
        store.set_cinematic_error(&event.job_id, message).await?;
    }

    info!(
        job_id = %event.job_id,
        field = event.kind.field_name(),
        "Applied webhook terminal state"
    );
    Ok(applied)
}

/// Scan pending jobs for the one whose marker carries this external id.
async fn find_job_by_pending_id(
    state: &AppState,
    kind: VideoKind,
    external_id: &str,
) -> ApiResult<Option<JobId>> {
    let jobs = state.store.list_pending().await?;
    Ok(jobs
        .into_iter()
        .find(|job| {
            job.video(kind)
                .and_then(|v| v.pending_id())
                .is_some_and(|id| id == external_id)
        })
        .map(|job| job.id))
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("description")
            .or_else(|| map.get("message"))
            .or_else(|| map.get("kind"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}
