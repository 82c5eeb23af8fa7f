//! Shared data models for the PromoKit backend.
//!
//! The orchestrator's single source of truth is the [`Job`] record and the
//! per-video [`VideoField`] state machine stored on it. Everything else in
//! the workspace reads and writes these types.

pub mod job;
pub mod report;
pub mod video_state;

pub use job::{Job, JobId, JobStatus};
pub use report::{SweepReport, SweepResult, WebhookEvent, WebhookOutcome};
pub use video_state::{ParseVideoFieldError, VideoField, VideoKind};
