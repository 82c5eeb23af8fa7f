//! Typed HTTP clients for the two video-generation providers.
//!
//! Provider A (avatar) turns an image + script into a talking-head video;
//! completion is asynchronous, retrievable by id, optionally pushed via
//! webhook. Provider B (cinematic) turns an image + prompt into a short
//! motion video; its canonical access pattern is create-then-long-poll
//! inside the caller's own request.
//!
//! Both clients translate provider vocabulary into the shared error taxonomy
//! so the orchestrator never sees provider-specific status strings.

pub mod avatar;
pub mod cinematic;
pub mod error;
pub mod retry;
pub mod script;

pub use avatar::{AvatarClient, AvatarConfig, AvatarStatus, CreateTalkResponse, TalkStatus, VoiceConfig};
pub use cinematic::{CinematicClient, CinematicConfig, CinematicStatus, CreateTaskResponse, TaskStatus};
pub use error::{rejection_reason_for, ProviderError, ProviderResult};
pub use retry::{with_retry, RetryConfig};
pub use script::clamp_script;
