//! Job store trait and the guarded-write primitive.

use async_trait::async_trait;
use promo_models::{Job, JobId, VideoField, VideoKind};

use crate::error::StoreResult;

/// Expected current value for a conditional video-field update.
///
/// `update_if` applies its new value only when the stored field matches the
/// guard; a mismatch returns `false` without touching the row. First
/// terminal value wins — there is no last-writer-wins path through here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Field not requested yet.
    Absent,
    /// Field is `script_ready`.
    ScriptReady,
    /// Field is `pending:` with any external id.
    AnyPending,
    /// Field is `pending:` with exactly this external id. Writes carrying a
    /// stale id after a resubmission fall through as no-ops.
    PendingId(String),
    /// Field is a terminal-success URL. Reserved for the result proxy's
    /// refresh and expire writes.
    Ready,
    /// Unconditional. Used only for initial slot setup (e.g. marking a
    /// script ready); never for reconciliation.
    Always,
    /// Field has not advanced past submission: absent, `script_ready`, or
    /// `pending:`. The submitter's marker write uses this so it can replace
    /// its own earlier marker but never a terminal value.
    NotTerminal,
}

impl Guard {
    /// Does the stored value satisfy this guard?
    pub fn matches(&self, current: Option<&VideoField>) -> bool {
        match self {
            Guard::Absent => current.is_none(),
            Guard::ScriptReady => matches!(current, Some(VideoField::ScriptReady)),
            Guard::AnyPending => current.is_some_and(|v| v.is_pending()),
            Guard::PendingId(id) => current.is_some_and(|v| v.pending_id() == Some(id.as_str())),
            Guard::Ready => current.is_some_and(|v| v.is_success()),
            Guard::Always => true,
            Guard::NotTerminal => current.map_or(true, |v| !v.is_terminal()),
        }
    }
}

/// Persistent job storage.
///
/// All coordination between the orchestrator's writers passes through this
/// trait; implementations must make `update_if` atomic per row.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch a job by id.
    async fn get(&self, id: &JobId) -> StoreResult<Option<Job>>;

    /// Insert a new job record.
    async fn insert(&self, job: Job) -> StoreResult<()>;

    /// Conditionally update one video field.
    ///
    /// Applies `value`, bumps `updated_at`, and recomputes the whole-job
    /// status only if the current field matches `guard`. Returns whether the
    /// write was applied. A missing job is an error; a guard mismatch is not.
    async fn update_if(
        &self,
        id: &JobId,
        kind: VideoKind,
        guard: &Guard,
        value: Option<VideoField>,
    ) -> StoreResult<bool>;

    /// Set or clear the user-facing cinematic error message.
    async fn set_cinematic_error(&self, id: &JobId, message: Option<String>) -> StoreResult<()>;

    /// Jobs with at least one `pending:` video field.
    async fn list_pending(&self) -> StoreResult<Vec<Job>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: &str) -> Option<VideoField> {
        Some(VideoField::pending(id))
    }

    #[test]
    fn test_guard_absent() {
        assert!(Guard::Absent.matches(None));
        assert!(!Guard::Absent.matches(pending("x1").as_ref()));
    }

    #[test]
    fn test_guard_any_pending() {
        assert!(Guard::AnyPending.matches(pending("x1").as_ref()));
        assert!(!Guard::AnyPending.matches(None));
        assert!(!Guard::AnyPending.matches(Some(&VideoField::ready("https://cdn/a.mp4"))));
        assert!(!Guard::AnyPending.matches(Some(&VideoField::failed("timeout"))));
    }

    #[test]
    fn test_guard_pending_id_rejects_stale_id() {
        let guard = Guard::PendingId("x1".to_string());
        assert!(guard.matches(pending("x1").as_ref()));
        // A resubmission replaced the marker; the old id must not match.
        assert!(!guard.matches(pending("x2").as_ref()));
        assert!(!guard.matches(None));
        assert!(!guard.matches(Some(&VideoField::ready("https://cdn/a.mp4"))));
    }

    #[test]
    fn test_guard_ready_only_matches_success() {
        assert!(Guard::Ready.matches(Some(&VideoField::ready("https://cdn/a.mp4"))));
        assert!(!Guard::Ready.matches(Some(&VideoField::expired("video_not_found"))));
        assert!(!Guard::Ready.matches(pending("x1").as_ref()));
    }

    #[test]
    fn test_guard_not_terminal() {
        assert!(Guard::NotTerminal.matches(None));
        assert!(Guard::NotTerminal.matches(Some(&VideoField::ScriptReady)));
        assert!(Guard::NotTerminal.matches(pending("x1").as_ref()));
        assert!(!Guard::NotTerminal.matches(Some(&VideoField::ready("https://cdn/a.mp4"))));
        assert!(!Guard::NotTerminal.matches(Some(&VideoField::failed("timeout"))));
    }
}
