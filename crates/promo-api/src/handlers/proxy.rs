//! Result proxy with transparent signed-URL refresh.
//!
//! Provider A result URLs are signed CDN links that expire after a day or
//! so, while jobs live much longer. The proxy streams the video through and,
//! when the upstream answers 403/404/410 for a recognized result URL,
//! re-resolves a fresh link from the provider, persists it on the job, and
//! retries once. A URL that cannot be re-resolved retires the field to
//! `expired:` so clients stop asking.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
use tracing::{info, warn};

use promo_models::video_state::REASON_VIDEO_NOT_FOUND;
use promo_models::{JobId, VideoField, VideoKind};
use promo_providers::{AvatarClient, ProviderError};
use promo_store::Guard;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Marker header set when the served bytes came from a refreshed URL.
pub const REFRESHED_HEADER: &str = "x-video-url-refreshed";

#[derive(Deserialize)]
pub struct ProxyQuery {
    pub url: String,
    /// When present, refresh/expire outcomes are persisted on this job.
    pub job_id: Option<String>,
}

/// `GET /api/video-proxy?url=...&job_id=...` — stream a result video.
pub async fn video_proxy(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> ApiResult<Response> {
    let parsed = url::Url::parse(&query.url)
        .map_err(|_| ApiError::bad_request("url must be a valid URL"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ApiError::bad_request("url must be http(s)"));
    }

    let upstream = state
        .http
        .get(&query.url)
        .send()
        .await
        .map_err(|e| ApiError::upstream(format!("Upstream fetch failed: {}", e)))?;

    if upstream.status().is_success() {
        return stream_response(upstream, false);
    }

    let code = upstream.status().as_u16();
    let link_dead = matches!(code, 403 | 404 | 410);

    if link_dead && state.avatar.is_result_url(&query.url) {
        return refresh_and_serve(&state, &query).await;
    }

    Err(ApiError::upstream(format!("Upstream returned {}", code)))
}

/// Re-resolve a dead Provider A result URL and serve from the fresh link.
async fn refresh_and_serve(state: &AppState, query: &ProxyQuery) -> ApiResult<Response> {
    let Some(talk_id) = AvatarClient::url_talk_id(&query.url) else {
        return expire(state, query).await;
    };

    let fresh_url = match state.avatar.get(&talk_id).await {
        Ok(talk) => talk.result_url,
        Err(ProviderError::NotFound(_)) => None,
        Err(e) => {
            // Provider trouble is not proof the video is gone; keep the
            // field intact and report the upstream failure.
            warn!(talk_id = %talk_id, "Could not re-resolve result URL: {}", e);
            return Err(e.into());
        }
    };

    // A URL identical to the dead one resolves nothing.
    let fresh_url = fresh_url.filter(|u| u != &query.url);

    let Some(fresh_url) = fresh_url else {
        return expire(state, query).await;
    };

    if let Some(job_id) = &query.job_id {
        let job_id = JobId::from(job_id.as_str());
        // Ready-only guard: a field that already failed or expired through
        // another path is left alone.
        let applied = state
            .store
            .update_if(
                &job_id,
                VideoKind::Avatar,
                &Guard::Ready,
                Some(VideoField::ready(fresh_url.as_str())),
            )
            .await?;
        if applied {
            info!(job_id = %job_id, talk_id = %talk_id, "Persisted refreshed result URL");
        }
    }

    metrics::record_url_refresh("refreshed");

    let upstream = state
        .http
        .get(&fresh_url)
        .send()
        .await
        .map_err(|e| ApiError::upstream(format!("Refreshed fetch failed: {}", e)))?;

    if !upstream.status().is_success() {
        return Err(ApiError::upstream(format!(
            "Refreshed URL returned {}",
            upstream.status().as_u16()
        )));
    }

    stream_response(upstream, true)
}

/// No fresh URL obtainable: retire the field and answer 410.
async fn expire(state: &AppState, query: &ProxyQuery) -> ApiResult<Response> {
    if let Some(job_id) = &query.job_id {
        let job_id = JobId::from(job_id.as_str());
        let applied = state
            .store
            .update_if(
                &job_id,
                VideoKind::Avatar,
                &Guard::Ready,
                Some(VideoField::expired(REASON_VIDEO_NOT_FOUND)),
            )
            .await?;
        if applied {
            info!(job_id = %job_id, "Result URL expired for good, field retired");
        }
    }

    metrics::record_url_refresh("expired");
    Err(ApiError::gone("Video is no longer available"))
}

/// Stream the upstream body through with playback-friendly headers.
fn stream_response(upstream: reqwest::Response, refreshed: bool) -> ApiResult<Response> {
    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("video/mp4")
        .to_string();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CACHE_CONTROL, "public, max-age=3600")
        // Inline so browsers play instead of downloading.
        .header(CONTENT_DISPOSITION, "inline");

    if refreshed {
        builder = builder.header(REFRESHED_HEADER, "true");
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
