//! Reconciler: the polling half of video-state reconciliation.
//!
//! A sweep is a stateless pass over every job with a `pending:` video field.
//! It is safe to invoke repeatedly and concurrently with webhook deliveries:
//! every write goes through the store's guarded update, so a field already
//! advanced by a racing writer is left alone. First terminal value wins.
//!
//! Policy per pending field:
//! - job older than the hard timeout: `failed:timeout`, no provider call
//! - avatar: ask Provider A for status (with retry); terminal answers are
//!   written through, transient errors leave the field untouched
//! - cinematic: Provider B completes synchronously for its submitter, so a
//!   field still pending past the grace window is escalated to
//!   `failed:stuck` on its own age alone

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use promo_models::video_state::{REASON_GENERATION_ERROR, REASON_STUCK, REASON_TIMEOUT};
use promo_models::{Job, JobId, SweepReport, SweepResult, VideoField, VideoKind};
use promo_providers::{rejection_reason_for, with_retry, AvatarClient, AvatarStatus};
use promo_store::{Guard, JobStore};

use crate::config::OrchestratorConfig;
use crate::metrics;

const TIMEOUT_MESSAGE: &str = "Video generation timed out. Please try again.";
const STUCK_MESSAGE: &str =
    "Cinematic video generation is taking longer than expected and was marked failed.";

/// Reconciles pending video fields against Provider A and the timeout
/// policy.
pub struct Reconciler {
    store: Arc<dyn JobStore>,
    avatar: Arc<AvatarClient>,
    config: OrchestratorConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        avatar: Arc<AvatarClient>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            avatar,
            config,
        }
    }

    /// Run one full sweep over all pending jobs.
    pub async fn sweep(&self) -> SweepReport {
        let jobs = match self.store.list_pending().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Sweep could not list pending jobs: {}", e);
                let mut report = SweepReport::default();
                report.errors += 1;
                return report;
            }
        };

        let mut report = SweepReport::default();
        // Jobs touch disjoint rows; reconcile them concurrently.
        for job_report in join_all(jobs.into_iter().map(|job| self.reconcile_job(job))).await {
            report.merge(job_report);
        }

        metrics::record_sweep(&report);

        if report.updated > 0 || report.timed_out > 0 {
            info!(
                checked = report.checked,
                updated = report.updated,
                still_processing = report.still_processing,
                errors = report.errors,
                timed_out = report.timed_out,
                "Sweep applied changes"
            );
        } else {
            debug!(checked = report.checked, "Sweep made no changes");
        }

        report
    }

    /// Reconcile one job's pending fields.
    async fn reconcile_job(&self, job: Job) -> SweepReport {
        let mut report = SweepReport {
            checked: 1,
            ..Default::default()
        };

        let age = job
            .age(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        if age > self.config.job_timeout {
            self.apply_timeout(&job, &mut report).await;
            return report;
        }

        if let Some(talk_id) = job.video(VideoKind::Avatar).and_then(|v| v.pending_id()) {
            self.reconcile_avatar(&job.id, talk_id, &mut report).await;
        }

        if let Some(task_id) = job.video(VideoKind::Cinematic).and_then(|v| v.pending_id()) {
            self.reconcile_cinematic(&job.id, task_id, age, &mut report)
                .await;
        }

        report
    }

    /// Hard timeout: fail every still-pending field without contacting the
    /// providers. The guard makes this write exactly-once across sweeps.
    async fn apply_timeout(&self, job: &Job, report: &mut SweepReport) {
        for kind in [VideoKind::Avatar, VideoKind::Cinematic] {
            let Some(external_id) = job.video(kind).and_then(|v| v.pending_id()) else {
                continue;
            };

            match self
                .store
                .update_if(
                    &job.id,
                    kind,
                    &Guard::PendingId(external_id.to_string()),
                    Some(VideoField::failed(REASON_TIMEOUT)),
                )
                .await
            {
                Ok(true) => {
                    warn!(job_id = %job.id, field = kind.field_name(), "Job exceeded timeout, marked failed");
                    report.timed_out += 1;
                    report.results.push(SweepResult {
                        job_id: job.id.clone(),
                        status: "timed_out".to_string(),
                        video_url: None,
                        error: Some(REASON_TIMEOUT.to_string()),
                    });
                    if kind == VideoKind::Cinematic {
                        self.set_cinematic_message(&job.id, TIMEOUT_MESSAGE).await;
                    }
                }
                Ok(false) => metrics::record_guard_conflict(kind.as_str()),
                Err(e) => {
                    error!(job_id = %job.id, "Failed to write timeout: {}", e);
                    report.errors += 1;
                }
            }
        }
    }

    /// Poll Provider A for a pending avatar talk and apply the answer.
    async fn reconcile_avatar(&self, job_id: &JobId, talk_id: &str, report: &mut SweepReport) {
        let talk = match with_retry(&self.config.retry, "avatar.get", || self.avatar.get(talk_id))
            .await
        {
            Ok(talk) => talk,
            Err(e) => {
                // Transient trouble never fails the job on its own; the
                // field stays pending for the next sweep.
                warn!(job_id = %job_id, talk_id = %talk_id, "Avatar status check failed: {}", e);
                report.errors += 1;
                report.results.push(SweepResult {
                    job_id: job_id.clone(),
                    status: "error".to_string(),
                    video_url: None,
                    error: Some(e.to_string()),
                });
                return;
            }
        };

        match talk.status {
            AvatarStatus::Done => {
                let Some(url) = talk.result_url else {
                    warn!(job_id = %job_id, talk_id = %talk_id, "Provider reported done without a result URL");
                    report.errors += 1;
                    return;
                };
                self.write_terminal(
                    job_id,
                    VideoKind::Avatar,
                    talk_id,
                    VideoField::ready(url.as_str()),
                    report,
                    SweepResult {
                        job_id: job_id.clone(),
                        status: "updated".to_string(),
                        video_url: Some(url),
                        error: None,
                    },
                )
                .await;
            }
            AvatarStatus::Error => {
                let message = talk
                    .error
                    .as_ref()
                    .map(|e| e.message())
                    .unwrap_or_else(|| REASON_GENERATION_ERROR.to_string());
                let reason = rejection_reason_for(&message);
                self.write_terminal(
                    job_id,
                    VideoKind::Avatar,
                    talk_id,
                    VideoField::failed(reason),
                    report,
                    SweepResult {
                        job_id: job_id.clone(),
                        status: "failed".to_string(),
                        video_url: None,
                        error: Some(message),
                    },
                )
                .await;
            }
            _ => {
                report.still_processing += 1;
                report.results.push(SweepResult {
                    job_id: job_id.clone(),
                    status: "processing".to_string(),
                    video_url: None,
                    error: None,
                });
            }
        }
    }

    /// Cinematic tasks complete synchronously for their submitter, so a
    /// still-pending field is judged on its own age: within the grace window
    /// it is processing, past it it is stuck.
    async fn reconcile_cinematic(
        &self,
        job_id: &JobId,
        task_id: &str,
        age: Duration,
        report: &mut SweepReport,
    ) {
        if age <= self.config.cinematic_grace {
            report.still_processing += 1;
            report.results.push(SweepResult {
                job_id: job_id.clone(),
                status: "processing".to_string(),
                video_url: None,
                error: None,
            });
            return;
        }

        let applied = self
            .write_terminal(
                job_id,
                VideoKind::Cinematic,
                task_id,
                VideoField::failed(REASON_STUCK),
                report,
                SweepResult {
                    job_id: job_id.clone(),
                    status: "failed".to_string(),
                    video_url: None,
                    error: Some(REASON_STUCK.to_string()),
                },
            )
            .await;

        if applied {
            warn!(job_id = %job_id, task_id = %task_id, "Cinematic task pending past grace window, marked stuck");
            self.set_cinematic_message(job_id, STUCK_MESSAGE).await;
        }
    }

    /// Guarded terminal write; returns whether it was applied.
    async fn write_terminal(
        &self,
        job_id: &JobId,
        kind: VideoKind,
        external_id: &str,
        value: VideoField,
        report: &mut SweepReport,
        result: SweepResult,
    ) -> bool {
        match self
            .store
            .update_if(
                job_id,
                kind,
                &Guard::PendingId(external_id.to_string()),
                Some(value),
            )
            .await
        {
            Ok(true) => {
                report.updated += 1;
                report.results.push(result);
                true
            }
            Ok(false) => {
                // A webhook (or a concurrent sweep) got there first.
                debug!(job_id = %job_id, field = kind.field_name(), "Terminal write skipped, field already advanced");
                metrics::record_guard_conflict(kind.as_str());
                false
            }
            Err(e) => {
                error!(job_id = %job_id, "Failed to write terminal value: {}", e);
                report.errors += 1;
                false
            }
        }
    }

    async fn set_cinematic_message(&self, job_id: &JobId, message: &str) {
        if let Err(e) = self
            .store
            .set_cinematic_error(job_id, Some(message.to_string()))
            .await
        {
            error!(job_id = %job_id, "Failed to set cinematic error message: {}", e);
        }
    }
}

/// Background sweep loop.
///
/// Runs indefinitely and should be spawned as a background task. The sweep
/// endpoint invokes the same [`Reconciler::sweep`], so client-triggered
/// polling and this loop share one code path.
pub struct ReconcilerLoop {
    reconciler: Arc<Reconciler>,
    sweep_interval: Duration,
    enabled: bool,
}

impl ReconcilerLoop {
    pub fn new(reconciler: Arc<Reconciler>, config: &OrchestratorConfig) -> Self {
        Self {
            reconciler,
            sweep_interval: config.sweep_interval,
            enabled: config.sweep_enabled,
        }
    }

    /// Start the background sweep loop.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Background sweep is disabled");
            return;
        }

        info!("Starting reconciler loop (interval: {:?})", self.sweep_interval);

        let mut ticker = interval(self.sweep_interval);

        loop {
            ticker.tick().await;
            self.reconciler.sweep().await;
        }
    }
}
