//! In-memory job store.
//!
//! Used by the integration tests and local development runs. The production
//! deployment plugs a relational implementation into the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use promo_models::{Job, JobId, VideoField, VideoKind};

use crate::error::{StoreError, StoreResult};
use crate::store::{Guard, JobStore};

/// `JobStore` over a `RwLock<HashMap>`.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn insert(&self, job: Job) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn update_if(
        &self,
        id: &JobId,
        kind: VideoKind,
        guard: &Guard,
        value: Option<VideoField>,
    ) -> StoreResult<bool> {
        // The write lock makes check-then-write atomic per row.
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if !guard.matches(job.video(kind)) {
            debug!(
                job_id = %id,
                field = kind.field_name(),
                current = ?job.video(kind).map(|v| v.to_string()),
                "Guarded write skipped: current value does not match guard"
            );
            return Ok(false);
        }

        job.set_video(kind, value);
        job.status = job.recomputed_status();
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_cinematic_error(&self, id: &JobId, message: Option<String>) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        job.cinematic_video_error = message;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn list_pending(&self) -> StoreResult<Vec<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.has_pending_video())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promo_models::JobStatus;

    async fn store_with_job() -> (MemoryJobStore, JobId) {
        let store = MemoryJobStore::new();
        let id = JobId::new();
        store.insert(Job::new(id.clone())).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate() {
        let (store, id) = store_with_job().await;
        let err = store.insert(Job::new(id.clone())).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_if_missing_job_is_error() {
        let store = MemoryJobStore::new();
        let err = store
            .update_if(
                &JobId::from("nope"),
                VideoKind::Avatar,
                &Guard::Always,
                Some(VideoField::ScriptReady),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_guarded_write_applies_and_recomputes_status() {
        let (store, id) = store_with_job().await;

        let applied = store
            .update_if(
                &id,
                VideoKind::Avatar,
                &Guard::Absent,
                Some(VideoField::pending("x1")),
            )
            .await
            .unwrap();
        assert!(applied);

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.avatar_video, Some(VideoField::pending("x1")));
        assert_eq!(job.status, JobStatus::Generating);

        let applied = store
            .update_if(
                &id,
                VideoKind::Avatar,
                &Guard::PendingId("x1".to_string()),
                Some(VideoField::ready("https://cdn/a.mp4")),
            )
            .await
            .unwrap();
        assert!(applied);

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Complete);
    }

    #[tokio::test]
    async fn test_terminal_value_never_overwritten() {
        let (store, id) = store_with_job().await;
        store
            .update_if(
                &id,
                VideoKind::Avatar,
                &Guard::Absent,
                Some(VideoField::ready("https://cdn/a.mp4")),
            )
            .await
            .unwrap();

        // A racing reconciliation pass claiming a different URL must lose.
        let applied = store
            .update_if(
                &id,
                VideoKind::Avatar,
                &Guard::AnyPending,
                Some(VideoField::ready("https://cdn/other.mp4")),
            )
            .await
            .unwrap();
        assert!(!applied);

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.avatar_video, Some(VideoField::ready("https://cdn/a.mp4")));
    }

    #[tokio::test]
    async fn test_stale_external_id_write_is_noop() {
        let (store, id) = store_with_job().await;
        store
            .update_if(
                &id,
                VideoKind::Avatar,
                &Guard::Absent,
                Some(VideoField::pending("x2")),
            )
            .await
            .unwrap();

        // Result for the superseded id "x1" arrives late.
        let applied = store
            .update_if(
                &id,
                VideoKind::Avatar,
                &Guard::PendingId("x1".to_string()),
                Some(VideoField::failed("generation_error")),
            )
            .await
            .unwrap();
        assert!(!applied);

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.avatar_video, Some(VideoField::pending("x2")));
    }

    #[tokio::test]
    async fn test_list_pending_selects_either_field() {
        let store = MemoryJobStore::new();

        let mut a = Job::new(JobId::from("job-a"));
        a.avatar_video = Some(VideoField::pending("x1"));
        let mut b = Job::new(JobId::from("job-b"));
        b.cinematic_video = Some(VideoField::pending("t1"));
        let mut c = Job::new(JobId::from("job-c"));
        c.avatar_video = Some(VideoField::ready("https://cdn/a.mp4"));

        for job in [a, b, c] {
            store.insert(job).await.unwrap();
        }

        let mut pending: Vec<String> = store
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id.to_string())
            .collect();
        pending.sort();
        assert_eq!(pending, vec!["job-a", "job-b"]);
    }

    #[tokio::test]
    async fn test_set_cinematic_error() {
        let (store, id) = store_with_job().await;
        store
            .set_cinematic_error(&id, Some("Generation failed".to_string()))
            .await
            .unwrap();
        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.cinematic_video_error.as_deref(), Some("Generation failed"));

        store.set_cinematic_error(&id, None).await.unwrap();
        let job = store.get(&id).await.unwrap().unwrap();
        assert!(job.cinematic_video_error.is_none());
    }
}
