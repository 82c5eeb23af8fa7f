//! Provider error taxonomy.

use promo_models::video_state::{REASON_ASPECT_RATIO, REASON_GENERATION_ERROR};
use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Provider task failed: {reason}")]
    TaskFailed { reason: String },

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("Unknown provider job: {0}")]
    NotFound(String),

    #[error("Task {id} did not complete before the poll deadline")]
    PollDeadline { id: String },
}

impl ProviderError {
    /// Classify a reqwest failure; call timeouts count as transient.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(e)
        }
    }

    /// Transient failures are retried within the retry budget and never
    /// surface as job failure on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network(_) | ProviderError::Timeout => true,
            ProviderError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Map a terminal provider rejection to the reason code stored in the
    /// job's video field.
    pub fn rejection_reason(&self) -> &'static str {
        match self {
            ProviderError::Rejected { message, .. } | ProviderError::TaskFailed { reason: message } => {
                rejection_reason_for(message)
            }
            _ => REASON_GENERATION_ERROR,
        }
    }
}

/// Map a provider-reported failure message to a stored reason code.
pub fn rejection_reason_for(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("aspect ratio") || lower.contains("aspect_ratio") {
        REASON_ASPECT_RATIO
    } else {
        REASON_GENERATION_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::Rejected {
            status: 429,
            message: "rate limited".to_string()
        }
        .is_retryable());
        assert!(ProviderError::Rejected {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_retryable());
        assert!(!ProviderError::Rejected {
            status: 400,
            message: "bad request".to_string()
        }
        .is_retryable());
        assert!(!ProviderError::TaskFailed {
            reason: "nsfw".to_string()
        }
        .is_retryable());
        assert!(!ProviderError::PollDeadline {
            id: "t1".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_rejection_reason_mapping() {
        let aspect = ProviderError::Rejected {
            status: 422,
            message: "source image aspect ratio is not supported".to_string(),
        };
        assert_eq!(aspect.rejection_reason(), "aspect_ratio");

        let generic = ProviderError::Rejected {
            status: 400,
            message: "invalid voice id".to_string(),
        };
        assert_eq!(generic.rejection_reason(), "generation_error");

        let task = ProviderError::TaskFailed {
            reason: "Invalid aspect_ratio for input image".to_string(),
        };
        assert_eq!(task.rejection_reason(), "aspect_ratio");
    }
}
