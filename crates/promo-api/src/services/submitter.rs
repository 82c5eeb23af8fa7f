//! Generation submitter.
//!
//! Creates provider jobs for a script/prompt and persists the `pending:`
//! marker. Submission is an ordered list of attempt configurations — the
//! primary configuration, then one reduced fallback — tried in sequence,
//! stopping at first success; the final attempt's error becomes the reported
//! cause and is also written into the job's video field.

use std::sync::Arc;

use tracing::{info, warn};

use promo_models::{JobId, VideoField, VideoKind};
use promo_providers::{
    clamp_script, with_retry, AvatarClient, CinematicClient, ProviderError, RetryConfig,
    VoiceConfig,
};
use promo_store::{Guard, JobStore};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Primary cinematic rendition: portrait, longer cut.
const CINEMATIC_PRIMARY: (&str, u32) = ("768:1280", 10);
/// Reduced fallback: provider-default landscape ratio, short cut.
const CINEMATIC_FALLBACK: (&str, u32) = ("1280:768", 5);

/// Submits generation requests to the providers and records the outcome on
/// the job.
pub struct Submitter {
    store: Arc<dyn JobStore>,
    avatar: Arc<AvatarClient>,
    cinematic: Arc<CinematicClient>,
    retry: RetryConfig,
}

impl Submitter {
    pub fn new(
        store: Arc<dyn JobStore>,
        avatar: Arc<AvatarClient>,
        cinematic: Arc<CinematicClient>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            avatar,
            cinematic,
            retry,
        }
    }

    /// Submit an avatar talk for a job. Returns the provider's talk id.
    ///
    /// The `pending:<id>` marker is persisted before returning, so a crash
    /// after submission still leaves a trace the reconciler can finish.
    pub async fn submit_avatar(
        &self,
        job_id: &JobId,
        image_url: &str,
        script: &str,
    ) -> ApiResult<String> {
        self.require_job(job_id).await?;

        // Length never causes failure; clamp into the provider's bounds.
        let script = clamp_script(script);

        let fallback_image = self
            .avatar
            .fallback_presenter_url()
            .unwrap_or(image_url)
            .to_string();
        let attempts: [(&str, VoiceConfig); 2] = [
            (image_url, VoiceConfig::default_voice()),
            (&fallback_image, VoiceConfig::fallback()),
        ];

        let mut last_error: Option<ProviderError> = None;

        for (attempt, (source, voice)) in attempts.iter().enumerate() {
            let result = with_retry(&self.retry, "avatar.create", || {
                self.avatar
                    .create_with_user_data(source, &script, voice, Some(job_id.as_str()))
            })
            .await;

            match result {
                Ok(created) => {
                    // Replaces any earlier marker atomically; a terminal
                    // field is never reopened.
                    let applied = self
                        .store
                        .update_if(
                            job_id,
                            VideoKind::Avatar,
                            &Guard::NotTerminal,
                            Some(VideoField::pending(created.id.as_str())),
                        )
                        .await?;
                    if !applied {
                        return Err(ApiError::conflict(
                            "Avatar video already has a terminal result",
                        ));
                    }

                    info!(job_id = %job_id, talk_id = %created.id, attempt, "Submitted avatar talk");
                    metrics::record_submission("avatar", "submitted");
                    return Ok(created.id);
                }
                Err(e) => {
                    warn!(job_id = %job_id, attempt, "Avatar submission attempt failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| ProviderError::InvalidResponse("no attempts executed".to_string()));
        self.record_failure(job_id, VideoKind::Avatar, &Guard::NotTerminal, &error)
            .await?;
        metrics::record_submission("avatar", "failed");
        Err(error.into())
    }

    /// Submit a cinematic task for a job and ride it to completion.
    ///
    /// The provider's canonical access pattern is synchronous: create, then
    /// long-poll inside this call. The `pending:<id>` marker is written
    /// before polling begins; if the poll deadline passes, the marker stays
    /// and the reconciler or a webhook finishes the job.
    pub async fn submit_cinematic(
        &self,
        job_id: &JobId,
        image_url: &str,
        prompt: &str,
    ) -> ApiResult<String> {
        self.require_job(job_id).await?;

        let mut last_error: Option<ProviderError> = None;
        let mut task_id: Option<String> = None;

        for (attempt, (ratio, duration)) in [CINEMATIC_PRIMARY, CINEMATIC_FALLBACK]
            .iter()
            .enumerate()
        {
            let result = with_retry(&self.retry, "cinematic.create", || {
                self.cinematic.create(image_url, prompt, ratio, *duration)
            })
            .await;

            match result {
                Ok(created) => {
                    let applied = self
                        .store
                        .update_if(
                            job_id,
                            VideoKind::Cinematic,
                            &Guard::NotTerminal,
                            Some(VideoField::pending(created.id.as_str())),
                        )
                        .await?;
                    if !applied {
                        return Err(ApiError::conflict(
                            "Cinematic video already has a terminal result",
                        ));
                    }

                    info!(job_id = %job_id, task_id = %created.id, attempt, "Submitted cinematic task");
                    task_id = Some(created.id);
                    break;
                }
                Err(e) => {
                    warn!(job_id = %job_id, attempt, "Cinematic submission attempt failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        let Some(task_id) = task_id else {
            let error = last_error.unwrap_or_else(|| {
                ProviderError::InvalidResponse("no attempts executed".to_string())
            });
            // No task was ever created, so there is no id to guard on.
            self.record_failure(job_id, VideoKind::Cinematic, &Guard::NotTerminal, &error)
                .await?;
            metrics::record_submission("cinematic", "failed");
            return Err(error.into());
        };

        match self.cinematic.wait_for_output(&task_id).await {
            Ok(url) => {
                let applied = self
                    .store
                    .update_if(
                        job_id,
                        VideoKind::Cinematic,
                        &Guard::PendingId(task_id.clone()),
                        Some(VideoField::ready(url)),
                    )
                    .await?;
                if applied {
                    self.store.set_cinematic_error(job_id, None).await?;
                }
                metrics::record_submission("cinematic", "completed");
                Ok(task_id)
            }
            Err(ProviderError::PollDeadline { .. }) => {
                // Still running on the provider's side; the reconciler and
                // webhook paths take over from here.
                info!(job_id = %job_id, task_id = %task_id, "Cinematic task outlived the poll deadline, left pending");
                metrics::record_submission("cinematic", "submitted");
                Ok(task_id)
            }
            Err(e) => {
                // Guard on our own task id: if a resubmission has replaced
                // the marker meanwhile, this failure is stale and must not
                // land.
                self.record_failure(
                    job_id,
                    VideoKind::Cinematic,
                    &Guard::PendingId(task_id.clone()),
                    &e,
                )
                .await?;
                metrics::record_submission("cinematic", "failed");
                Err(e.into())
            }
        }
    }

    async fn require_job(&self, job_id: &JobId) -> ApiResult<()> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Job not found: {}", job_id)))?;
        Ok(())
    }

    /// Record a terminal submission failure on the job.
    ///
    /// `guard` names the write the failure is allowed to replace: the exact
    /// `pending:<id>` once an external id exists, so a resubmission that has
    /// already installed a newer marker turns this into a no-op.
    async fn record_failure(
        &self,
        job_id: &JobId,
        kind: VideoKind,
        guard: &Guard,
        error: &ProviderError,
    ) -> ApiResult<()> {
        let reason = error.rejection_reason();
        let applied = self
            .store
            .update_if(job_id, kind, guard, Some(VideoField::failed(reason)))
            .await?;

        if applied && kind == VideoKind::Cinematic {
            self.store
                .set_cinematic_error(job_id, Some(user_message_for(error)))
                .await?;
        }
        Ok(())
    }
}

/// User-facing message for a terminal submission failure.
fn user_message_for(error: &ProviderError) -> String {
    match error {
        ProviderError::TaskFailed { reason } => {
            format!("Video generation failed: {}", reason)
        }
        ProviderError::Rejected { message, .. } if !message.is_empty() => {
            format!("The provider rejected this request: {}", message)
        }
        _ => "Video generation failed. Please try again.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use promo_models::Job;
    use promo_providers::{AvatarConfig, CinematicConfig};
    use promo_store::MemoryJobStore;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn avatar_client(base_url: String) -> Arc<AvatarClient> {
        Arc::new(
            AvatarClient::new(AvatarConfig {
                base_url,
                api_key: "test-key".to_string(),
                request_timeout: Duration::from_secs(5),
                webhook_url: None,
                result_hosts: vec!["cdn-a.example.com".to_string()],
                fallback_presenter_url: None,
            })
            .unwrap(),
        )
    }

    fn cinematic_client(base_url: String) -> Arc<CinematicClient> {
        Arc::new(
            CinematicClient::new(CinematicConfig {
                base_url,
                api_key: "test-key".to_string(),
                request_timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(10),
                poll_deadline: Duration::from_millis(500),
            })
            .unwrap(),
        )
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 0,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_stale_task_failure_does_not_clobber_resubmitted_marker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/image_to_video"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "task-1", "status": "PENDING"})),
            )
            .mount(&server)
            .await;
        // task-1 keeps running long enough for a resubmission to land, then
        // fails.
        Mock::given(method("GET"))
            .and(path("/v1/tasks/task-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "task-1", "status": "RUNNING"})),
            )
            .up_to_n_times(5)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/tasks/task-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "task-1",
                "status": "FAILED",
                "failureReason": "Internal render error"
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryJobStore::new());
        let job_id = JobId::from("job-race");
        store.insert(Job::new(job_id.clone())).await.unwrap();

        let submitter = Arc::new(Submitter::new(
            store.clone(),
            avatar_client(server.uri()),
            cinematic_client(server.uri()),
            fast_retry(),
        ));

        let handle = {
            let submitter = submitter.clone();
            let job_id = job_id.clone();
            tokio::spawn(async move {
                submitter
                    .submit_cinematic(&job_id, "https://img.example.com/p.png", "slow dolly in")
                    .await
            })
        };

        // While task-1 is still long-polling, a resubmission installs a newer
        // marker.
        tokio::time::sleep(Duration::from_millis(25)).await;
        let replaced = store
            .update_if(
                &job_id,
                VideoKind::Cinematic,
                &Guard::PendingId("task-1".to_string()),
                Some(VideoField::pending("task-2")),
            )
            .await
            .unwrap();
        assert!(replaced, "resubmission should have replaced the task-1 marker");

        // The first submission reports its failure, but the write is stale.
        let result = handle.await.unwrap();
        assert!(result.is_err());

        let job = store.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.cinematic_video, Some(VideoField::pending("task-2")));
        assert_eq!(job.cinematic_video_error, None);
    }

    #[tokio::test]
    async fn test_cinematic_failure_with_matching_marker_is_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/image_to_video"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "task-9", "status": "PENDING"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/tasks/task-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "task-9",
                "status": "FAILED",
                "failureReason": "Invalid aspect_ratio for input image"
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryJobStore::new());
        let job_id = JobId::from("job-fail");
        store.insert(Job::new(job_id.clone())).await.unwrap();

        let submitter = Submitter::new(
            store.clone(),
            avatar_client(server.uri()),
            cinematic_client(server.uri()),
            fast_retry(),
        );

        let result = submitter
            .submit_cinematic(&job_id, "https://img.example.com/p.png", "slow dolly in")
            .await;
        assert!(result.is_err());

        let job = store.get(&job_id).await.unwrap().unwrap();
        assert!(matches!(
            job.cinematic_video,
            Some(VideoField::Failed { .. })
        ));
        assert!(job.cinematic_video_error.is_some());
    }

    #[test]
    fn test_user_message_prefers_provider_detail() {
        let msg = user_message_for(&ProviderError::TaskFailed {
            reason: "Invalid aspect_ratio".to_string(),
        });
        assert!(msg.contains("Invalid aspect_ratio"));

        let msg = user_message_for(&ProviderError::Timeout);
        assert!(msg.contains("try again"));
    }
}
