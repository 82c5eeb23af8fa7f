//! Provider B client: cinematic image-to-video generation.
//!
//! The provider accepts an image + text prompt and returns a task id. Its
//! SDK favors synchronous completion: create the task, then long-poll the
//! status endpoint inside the caller's own request until terminal or a
//! deadline elapses. There is no task cancellation; a caller that stops
//! polling simply stops watching.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

/// Cinematic provider configuration.
#[derive(Debug, Clone)]
pub struct CinematicConfig {
    /// API base URL, e.g. `https://api.cinematic.example`
    pub base_url: String,
    pub api_key: String,
    /// Per-call timeout.
    pub request_timeout: Duration,
    /// Delay between long-poll status checks.
    pub poll_interval: Duration,
    /// Overall budget for one long-poll session. Past it the task is left
    /// `pending:` for the reconciler or a webhook to finish.
    pub poll_deadline: Duration,
}

/// Task status domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CinematicStatus {
    Pending,
    Running,
    Throttled,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl CinematicStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CinematicStatus::Succeeded | CinematicStatus::Failed)
    }
}

/// Response to a create-task request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskResponse {
    pub id: String,
    pub status: CinematicStatus,
}

/// Status of an existing task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatus {
    pub id: String,
    pub status: CinematicStatus,
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default, rename = "failureReason")]
    pub failure_reason: Option<String>,
}

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    #[serde(rename = "promptImage")]
    prompt_image: &'a str,
    #[serde(rename = "promptText")]
    prompt_text: &'a str,
    ratio: &'a str,
    duration: u32,
}

/// Cinematic provider client.
pub struct CinematicClient {
    config: CinematicConfig,
    client: reqwest::Client,
}

impl CinematicClient {
    pub fn new(config: CinematicConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ProviderError::from_reqwest)?;
        Ok(Self { config, client })
    }

    /// Create an image-to-video task.
    pub async fn create(
        &self,
        source_image_url: &str,
        prompt: &str,
        ratio: &str,
        duration: u32,
    ) -> ProviderResult<CreateTaskResponse> {
        let request = CreateTaskRequest {
            prompt_image: source_image_url,
            prompt_text: prompt,
            ratio,
            duration,
        };

        let response = self
            .client
            .post(format!("{}/v1/image_to_video", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected { status, message });
        }

        let created: CreateTaskResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        debug!(task_id = %created.id, "Created cinematic task");
        Ok(created)
    }

    /// Fetch the status of a task by id.
    pub async fn get(&self, id: &str) -> ProviderResult<TaskStatus> {
        let response = self
            .client
            .get(format!("{}/v1/tasks/{}", self.config.base_url, id))
            .bearer_auth(&self.config.api_key)
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

    /// Long-poll a created task until terminal.
    ///
    /// Transient status-call failures keep the loop alive; only the deadline
    /// or a terminal answer ends it. Returns the first output URL on
    /// success, `TaskFailed` on FAILED, `PollDeadline` past the budget.
    pub async fn wait_for_output(&self, id: &str) -> ProviderResult<String> {
        let started = Instant::now();

        loop {
            match self.get(id).await {
                Ok(task) => match task.status {
                    CinematicStatus::Succeeded => {
                        return task.output.into_iter().next().ok_or_else(|| {
                            ProviderError::InvalidResponse(
                                "SUCCEEDED task carried no output".to_string(),
                            )
                        });
                    }
                    CinematicStatus::Failed => {
                        return Err(ProviderError::TaskFailed {
                            reason: task
                                .failure_reason
                                .unwrap_or_else(|| "unknown failure".to_string()),
                        });
                    }
                    _ => {}
                },
                Err(e) if e.is_retryable() => {
                    warn!(task_id = %id, "Transient error while polling cinematic task: {}", e);
                }
                Err(e) => return Err(e),
            }

            if started.elapsed() >= self.config.poll_deadline {
                return Err(ProviderError::PollDeadline { id: id.to_string() });
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
