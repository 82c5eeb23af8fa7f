//! Orchestration services.

pub mod reconciler;
pub mod submitter;

pub use reconciler::{Reconciler, ReconcilerLoop};
pub use submitter::Submitter;
