//! API and orchestrator configuration.
//!
//! Everything is read from the environment exactly once, in `main`, and
//! passed into components at construction. Provider credentials are injected
//! here and nowhere else.

use std::time::Duration;

use promo_providers::{AvatarConfig, CinematicConfig, RetryConfig};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 2 * 1024 * 1024, // 2MB
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2 * 1024 * 1024),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

/// Reconciliation policy configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard wall-clock budget for a job; a pending field older than this is
    /// written `failed:timeout` without contacting the provider.
    pub job_timeout: Duration,
    /// Cinematic tasks normally finish within minutes; pending past this
    /// grace window is escalated to `failed:stuck`.
    pub cinematic_grace: Duration,
    /// Interval between background sweeps.
    pub sweep_interval: Duration,
    /// Whether the background sweep loop runs at all.
    pub sweep_enabled: bool,
    /// Retry budget for provider status calls within one sweep.
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(10 * 60),
            cinematic_grace: Duration::from_secs(3 * 60),
            sweep_interval: Duration::from_secs(30),
            sweep_enabled: true,
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            job_timeout: duration_from_env("JOB_TIMEOUT_MINUTES", 60, defaults.job_timeout),
            cinematic_grace: duration_from_env("CINEMATIC_GRACE_MINUTES", 60, defaults.cinematic_grace),
            sweep_interval: duration_from_env("SWEEP_INTERVAL_SECS", 1, defaults.sweep_interval),
            sweep_enabled: std::env::var("ENABLE_SWEEP")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            retry: RetryConfig {
                max_retries: std::env::var("PROVIDER_MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_retries),
                ..defaults.retry
            },
        }
    }
}

/// Avatar provider config from environment variables.
pub fn avatar_config_from_env() -> AvatarConfig {
    AvatarConfig {
        base_url: std::env::var("AVATAR_API_URL")
            .unwrap_or_else(|_| "https://api.avatar.example".to_string()),
        api_key: std::env::var("AVATAR_API_KEY").unwrap_or_default(),
        request_timeout: duration_from_env("PROVIDER_REQUEST_TIMEOUT_SECS", 1, Duration::from_secs(30)),
        webhook_url: std::env::var("AVATAR_WEBHOOK_URL").ok(),
        result_hosts: std::env::var("AVATAR_RESULT_HOSTS")
            .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["cdn-a.example.com".to_string()]),
        fallback_presenter_url: std::env::var("AVATAR_FALLBACK_PRESENTER_URL").ok(),
    }
}

/// Cinematic provider config from environment variables.
pub fn cinematic_config_from_env() -> CinematicConfig {
    CinematicConfig {
        base_url: std::env::var("CINEMATIC_API_URL")
            .unwrap_or_else(|_| "https://api.cinematic.example".to_string()),
        api_key: std::env::var("CINEMATIC_API_KEY").unwrap_or_default(),
        request_timeout: duration_from_env("PROVIDER_REQUEST_TIMEOUT_SECS", 1, Duration::from_secs(30)),
        poll_interval: duration_from_env("CINEMATIC_POLL_INTERVAL_SECS", 1, Duration::from_secs(5)),
        poll_deadline: duration_from_env("CINEMATIC_POLL_DEADLINE_SECS", 1, Duration::from_secs(120)),
    }
}

fn duration_from_env(var: &str, unit_secs: u64, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(|n| Duration::from_secs(n * unit_secs))
        .unwrap_or(default)
}
