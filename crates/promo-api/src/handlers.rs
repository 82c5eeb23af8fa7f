//! Request handlers.

pub mod health;
pub mod jobs;
pub mod proxy;
pub mod reconcile;
pub mod webhook;

pub use health::*;
pub use jobs::*;
pub use proxy::*;
pub use reconcile::*;
pub use webhook::*;
