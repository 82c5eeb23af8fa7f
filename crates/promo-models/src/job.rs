//! Generation job record.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::video_state::{VideoField, VideoKind};

/// Unique identifier for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Whole-job lifecycle status, derived from the two video fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created, nothing submitted yet
    #[default]
    Pending,
    /// At least one video awaiting generation or user action
    Generating,
    /// Every requested video is terminal-success
    Complete,
    /// Every requested video is terminal and at least one failed
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Generating => "generating",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row per generation request.
///
/// The two video fields complete independently; `status` summarizes them for
/// the UI. `cinematic_video_error` carries the user-facing message when the
/// cinematic field is a `failed:` value.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Opaque identifier, immutable, assigned at creation
    pub id: JobId,

    /// Whole-job status
    #[serde(default)]
    pub status: JobStatus,

    /// Talking-avatar video slot (Provider A)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_video: Option<VideoField>,

    /// Cinematic video slot (Provider B)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cinematic_video: Option<VideoField>,

    /// User-facing message when `cinematic_video` is failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cinematic_video_error: Option<String>,

    /// Creation timestamp; drives timeout decisions
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job record.
    pub fn new(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            avatar_video: None,
            cinematic_video: None,
            cinematic_video_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The video slot for a given kind.
    pub fn video(&self, kind: VideoKind) -> Option<&VideoField> {
        match kind {
            VideoKind::Avatar => self.avatar_video.as_ref(),
            VideoKind::Cinematic => self.cinematic_video.as_ref(),
        }
    }

    /// Replace a video slot.
    pub fn set_video(&mut self, kind: VideoKind, value: Option<VideoField>) {
        match kind {
            VideoKind::Avatar => self.avatar_video = value,
            VideoKind::Cinematic => self.cinematic_video = value,
        }
    }

    /// Job age at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// True if either video slot is awaiting provider completion.
    pub fn has_pending_video(&self) -> bool {
        self.video(VideoKind::Avatar).is_some_and(|v| v.is_pending())
            || self
                .video(VideoKind::Cinematic)
                .is_some_and(|v| v.is_pending())
    }

    /// Derive the whole-job status from the video fields.
    ///
    /// Complete requires every requested field to be terminal-success; a job
    /// is never complete with an outstanding `pending:` video.
    pub fn recomputed_status(&self) -> JobStatus {
        let requested: Vec<&VideoField> = [self.avatar_video.as_ref(), self.cinematic_video.as_ref()]
            .into_iter()
            .flatten()
            .collect();

        if requested.is_empty() {
            return JobStatus::Pending;
        }
        if requested.iter().any(|v| !v.is_terminal()) {
            return JobStatus::Generating;
        }
        if requested.iter().all(|v| v.is_success()) {
            JobStatus::Complete
        } else {
            JobStatus::Failed
        }
    }
}
