//! Reconciliation wire types.
//!
//! Both reconciliation paths (the poller sweep and the webhook receiver)
//! reduce provider vocabulary to the same tri-state outcome before touching
//! the store.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::video_state::VideoKind;

/// Normalized terminal outcome carried by a webhook payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Terminal success with a result URL.
    Success { url: String },
    /// Terminal failure with a reason code.
    Failure { reason: String },
    /// Non-terminal provider status; acknowledged but applies no state.
    InProgress,
}

/// A provider push normalized to `{job, kind, outcome}`.
///
/// `external_id` is present when the payload carries the provider's own
/// job/task id; guarded writes then require the stored `pending:` marker to
/// match it, so deliveries for a superseded submission are no-ops.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub job_id: JobId,
    pub kind: VideoKind,
    pub external_id: Option<String>,
    pub outcome: WebhookOutcome,
}

/// Per-job result of one reconciler sweep.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SweepResult {
    pub job_id: JobId,
    /// One of `updated`, `processing`, `failed`, `timed_out`, `error`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one full reconciler pass over pending jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SweepReport {
    /// Jobs with at least one pending video field
    pub checked: u32,
    /// Fields advanced to a terminal value this pass
    pub updated: u32,
    /// Fields still pending after this pass
    pub still_processing: u32,
    /// Transient provider errors (field left untouched)
    pub errors: u32,
    /// Fields written to `failed:timeout`
    pub timed_out: u32,
    pub results: Vec<SweepResult>,
}

impl SweepReport {
    pub fn merge(&mut self, other: SweepReport) {
        self.checked += other.checked;
        self.updated += other.updated;
        self.still_processing += other.still_processing;
        self.errors += other.errors;
        self.timed_out += other.timed_out;
        self.results.extend(other.results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates() {
        let mut a = SweepReport {
            checked: 1,
            updated: 1,
            ..Default::default()
        };
        a.results.push(SweepResult {
            job_id: JobId::from("j1"),
            status: "updated".to_string(),
            video_url: Some("https://cdn/a.mp4".to_string()),
            error: None,
        });

        let b = SweepReport {
            checked: 2,
            still_processing: 1,
            errors: 1,
            ..Default::default()
        };

        a.merge(b);
        assert_eq!(a.checked, 3);
        assert_eq!(a.updated, 1);
        assert_eq!(a.still_processing, 1);
        assert_eq!(a.errors, 1);
        assert_eq!(a.results.len(), 1);
    }
}
