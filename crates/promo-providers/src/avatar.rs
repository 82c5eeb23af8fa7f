//! Provider A client: talking-avatar video generation.
//!
//! The provider accepts an image + script + voice configuration and returns
//! a talk id. Completion is asynchronous: the talk is retrievable by id, and
//! a webhook callback can be registered at creation. Result URLs are signed
//! CDN links that expire; the talk id is embedded in the URL path, which the
//! result proxy uses to re-resolve a fresh link.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// Avatar provider configuration. Credentials are injected, never read from
/// the environment here.
#[derive(Debug, Clone)]
pub struct AvatarConfig {
    /// API base URL, e.g. `https://api.avatar.example`
    pub base_url: String,
    pub api_key: String,
    /// Per-call timeout; a hung provider must not hang the caller.
    pub request_timeout: Duration,
    /// Callback URL registered on each created talk, when configured.
    pub webhook_url: Option<String>,
    /// CDN hosts the provider serves result URLs from.
    pub result_hosts: Vec<String>,
    /// Stock presenter image used by the reduced fallback configuration.
    pub fallback_presenter_url: Option<String>,
}

/// Voice and style configuration sent with every create request. The
/// provider's defaults are never relied on.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub voice_id: String,
    pub style: Option<String>,
}

impl VoiceConfig {
    /// Primary configuration.
    pub fn default_voice() -> Self {
        Self {
            voice_id: "en-US-JennyNeural".to_string(),
            style: Some("Cheerful".to_string()),
        }
    }

    /// Reduced configuration for the one fallback attempt: default voice, no
    /// optional fields.
    pub fn fallback() -> Self {
        Self {
            voice_id: "en-US-JennyNeural".to_string(),
            style: None,
        }
    }
}

/// Talk status domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarStatus {
    Created,
    Started,
    Done,
    Error,
    /// Forward-compatible: unknown statuses are treated as non-terminal.
    #[serde(other)]
    Unknown,
}

impl AvatarStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AvatarStatus::Done | AvatarStatus::Error)
    }
}

/// Response to a create-talk request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTalkResponse {
    pub id: String,
    pub status: AvatarStatus,
}

/// Provider error detail; some endpoints return a bare string, others an
/// object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TalkError {
    Message(String),
    Detail {
        #[serde(default)]
        kind: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl TalkError {
    pub fn message(&self) -> String {
        match self {
            TalkError::Message(s) => s.clone(),
            TalkError::Detail { kind, description } => description
                .clone()
                .or_else(|| kind.clone())
                .unwrap_or_else(|| "unknown provider error".to_string()),
        }
    }
}

/// Status of an existing talk.
#[derive(Debug, Clone, Deserialize)]
pub struct TalkStatus {
    pub id: String,
    pub status: AvatarStatus,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error: Option<TalkError>,
}

#[derive(Serialize)]
struct CreateTalkRequest<'a> {
    source_url: &'a str,
    script: ScriptPayload<'a>,
    config: TalkOutputConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook: Option<&'a str>,
    /// Echoed back verbatim in webhook payloads; carries our job id.
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<&'a str>,
}

#[derive(Serialize)]
struct ScriptPayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    input: &'a str,
    provider: VoicePayload<'a>,
}

#[derive(Serialize)]
struct VoicePayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    voice_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_config: Option<VoiceStylePayload<'a>>,
}

#[derive(Serialize)]
struct VoiceStylePayload<'a> {
    style: &'a str,
}

#[derive(Serialize)]
struct TalkOutputConfig {
    result_format: &'static str,
}

/// Avatar provider client.
pub struct AvatarClient {
    config: AvatarConfig,
    client: reqwest::Client,
}

impl AvatarClient {
    pub fn new(config: AvatarConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ProviderError::from_reqwest)?;
        Ok(Self { config, client })
    }

    /// Create a talk. Always sends an explicit voice configuration and an
    /// explicit mp4 output format.
    pub async fn create(
        &self,
        source_image_url: &str,
        script: &str,
        voice: &VoiceConfig,
    ) -> ProviderResult<CreateTalkResponse> {
        self.create_with_user_data(source_image_url, script, voice, None)
            .await
    }

    /// Create a talk with an opaque `user_data` string the provider echoes
    /// back in webhook payloads.
    pub async fn create_with_user_data(
        &self,
        source_image_url: &str,
        script: &str,
        voice: &VoiceConfig,
        user_data: Option<&str>,
    ) -> ProviderResult<CreateTalkResponse> {
        let request = CreateTalkRequest {
            source_url: source_image_url,
            script: ScriptPayload {
                kind: "text",
                input: script,
                provider: VoicePayload {
                    kind: "microsoft",
                    voice_id: &voice.voice_id,
                    voice_config: voice
                        .style
                        .as_deref()
                        .map(|style| VoiceStylePayload { style }),
                },
            },
            config: TalkOutputConfig {
                result_format: "mp4",
            },
            webhook: self.config.webhook_url.as_deref(),
            user_data,
        };

        let response = self
            .client
            .post(format!("{}/talks", self.config.base_url))
            .header("authorization", format!("Basic {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { status, message });
        }

        let created: CreateTalkResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        debug!(talk_id = %created.id, "Created avatar talk");
        Ok(created)
    }

    /// Fetch the status of a talk by id.
    pub async fn get(&self, id: &str) -> ProviderResult<TalkStatus> {
        let response = self
            .client
            .get(format!("{}/talks/{}", self.config.base_url, id))
            .header("authorization", format!("Basic {}", self.config.api_key))
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if response.status().as_u16() == 404 {
            return Err(ProviderError::NotFound(id.to_string()));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    /// Whether a URL points at this provider's result CDN.
    pub fn is_result_url(&self, raw: &str) -> bool {
        let Ok(url) = Url::parse(raw) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        self.config
            .result_hosts
            .iter()
            .any(|h| host == h || host.ends_with(&format!(".{}", h)))
    }

    /// Extract the talk id embedded in a result-URL path.
    pub fn url_talk_id(raw: &str) -> Option<String> {
        let url = Url::parse(raw).ok()?;
        url.path_segments()?
            .find(|seg| seg.starts_with("tlk_"))
            .map(|s| s.to_string())
    }

    /// Stock presenter image for the fallback attempt.
    pub fn fallback_presenter_url(&self) -> Option<&str> {
        self.config.fallback_presenter_url.as_deref()
    }
}
