//! Axum HTTP API server and video-generation orchestrator.
//!
//! This crate provides:
//! - Generation submission endpoints for the avatar and cinematic videos
//! - The reconciler sweep (endpoint + background loop)
//! - The provider webhook receiver
//! - The result proxy with transparent signed-URL refresh
//! - Rate limiting, security headers, and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{ApiConfig, OrchestratorConfig};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{Reconciler, ReconcilerLoop, Submitter};
pub use state::AppState;
