//! Per-video state machine.
//!
//! Each job carries two independent video fields (avatar and cinematic),
//! persisted as a single string column. The encoding is stable and shared
//! with the frontend:
//!
//! - `script_ready` — avatar script generated, awaiting user submission
//! - `pending:<external-id>` — submitted to the provider, awaiting completion
//! - an absolute URL — terminal success
//! - `failed:<reason>` — terminal failure
//! - `expired:<reason>` — was a URL once, signed link died and could not be
//!   refreshed
//!
//! Terminal values never revert. Only a `pending:` field may be advanced by
//! reconciliation; `Ready -> Ready` (fresh URL) and `Ready -> Expired` are
//! reserved for the result proxy's refresh path.

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which of the two video slots on a job a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VideoKind {
    /// Talking-avatar video (Provider A).
    Avatar,
    /// Cinematic image-to-video (Provider B).
    Cinematic,
}

impl VideoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoKind::Avatar => "avatar",
            VideoKind::Cinematic => "cinematic",
        }
    }

    /// Stored column name for this slot.
    pub fn field_name(&self) -> &'static str {
        match self {
            VideoKind::Avatar => "avatar_video",
            VideoKind::Cinematic => "cinematic_video",
        }
    }
}

impl fmt::Display for VideoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reason code for a job that exceeded its wall-clock budget.
pub const REASON_TIMEOUT: &str = "timeout";
/// Reason code for a cinematic task pending well past its expected window.
pub const REASON_STUCK: &str = "stuck";
/// Generic provider rejection reason.
pub const REASON_GENERATION_ERROR: &str = "generation_error";
/// Source image aspect-ratio rejection.
pub const REASON_ASPECT_RATIO: &str = "aspect_ratio";
/// A once-successful result URL that can no longer be resolved.
pub const REASON_VIDEO_NOT_FOUND: &str = "video_not_found";

/// One video field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum VideoField {
    /// Script generated, awaiting explicit user action to submit (avatar only).
    ScriptReady,
    /// Submitted to the provider; `external_id` is the provider's job/task id.
    Pending { external_id: String },
    /// Terminal success: a playable result URL.
    Ready { url: String },
    /// Terminal failure with a machine-readable reason code.
    Failed { reason: String },
    /// Terminal: the result existed but its signed URL died for good.
    Expired { reason: String },
}

impl VideoField {
    pub fn pending(external_id: impl Into<String>) -> Self {
        Self::Pending {
            external_id: external_id.into(),
        }
    }

    pub fn ready(url: impl Into<String>) -> Self {
        Self::Ready { url: url.into() }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn expired(reason: impl Into<String>) -> Self {
        Self::Expired {
            reason: reason.into(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, VideoField::Pending { .. })
    }

    /// Terminal values never change again without administrative action.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VideoField::Ready { .. } | VideoField::Failed { .. } | VideoField::Expired { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, VideoField::Ready { .. })
    }

    /// External id while pending.
    pub fn pending_id(&self) -> Option<&str> {
        match self {
            VideoField::Pending { external_id } => Some(external_id),
            _ => None,
        }
    }

    /// Result URL when terminal-success.
    pub fn url(&self) -> Option<&str> {
        match self {
            VideoField::Ready { url } => Some(url),
            _ => None,
        }
    }

    /// Reason code for `failed:` / `expired:` values.
    pub fn reason(&self) -> Option<&str> {
        match self {
            VideoField::Failed { reason } | VideoField::Expired { reason } => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for VideoField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoField::ScriptReady => write!(f, "script_ready"),
            VideoField::Pending { external_id } => write!(f, "pending:{}", external_id),
            VideoField::Ready { url } => write!(f, "{}", url),
            VideoField::Failed { reason } => write!(f, "failed:{}", reason),
            VideoField::Expired { reason } => write!(f, "expired:{}", reason),
        }
    }
}

/// Error parsing a stored video field value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized video field value: {0:?}")]
pub struct ParseVideoFieldError(pub String);

impl FromStr for VideoField {
    type Err = ParseVideoFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "script_ready" {
            return Ok(VideoField::ScriptReady);
        }
        if let Some(id) = s.strip_prefix("pending:") {
            if !id.is_empty() {
                return Ok(VideoField::pending(id));
            }
        }
        if let Some(reason) = s.strip_prefix("failed:") {
            return Ok(VideoField::failed(reason));
        }
        if let Some(reason) = s.strip_prefix("expired:") {
            return Ok(VideoField::expired(reason));
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(VideoField::ready(s));
        }
        Err(ParseVideoFieldError(s.to_string()))
    }
}

impl From<VideoField> for String {
    fn from(v: VideoField) -> Self {
        v.to_string()
    }
}

impl TryFrom<String> for VideoField {
    type Error = ParseVideoFieldError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// Serialized as its string encoding, so the schema is a plain string.
impl JsonSchema for VideoField {
    fn schema_name() -> String {
        "VideoField".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}
