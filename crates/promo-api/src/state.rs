//! Application state.

use std::sync::Arc;
use std::time::Duration;

use promo_providers::{AvatarClient, CinematicClient};
use promo_store::JobStore;

use crate::config::{ApiConfig, OrchestratorConfig};
use crate::services::{Reconciler, Submitter};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn JobStore>,
    pub avatar: Arc<AvatarClient>,
    pub cinematic: Arc<CinematicClient>,
    pub submitter: Arc<Submitter>,
    pub reconciler: Arc<Reconciler>,
    /// Plain client for result-proxy upstream fetches.
    pub http: reqwest::Client,
}

impl AppState {
    /// Assemble application state from injected collaborators.
    pub fn new(
        config: ApiConfig,
        orchestrator: OrchestratorConfig,
        store: Arc<dyn JobStore>,
        avatar: Arc<AvatarClient>,
        cinematic: Arc<CinematicClient>,
    ) -> Self {
        let submitter = Arc::new(Submitter::new(
            Arc::clone(&store),
            Arc::clone(&avatar),
            Arc::clone(&cinematic),
            orchestrator.retry.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&avatar),
            orchestrator,
        ));

        Self {
            config,
            store,
            avatar,
            cinematic,
            submitter,
            reconciler,
            http: proxy_client(),
        }
    }
}

/// Client for result-proxy upstream fetches.
///
/// No overall timeout: proxied downloads can legitimately run long. A stalled
/// connection or a silent CDN is still cut off so the handler never hangs.
fn proxy_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .read_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
