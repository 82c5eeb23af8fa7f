//! Job store seam.
//!
//! The relational datastore behind PromoKit is an external collaborator;
//! this crate defines the three operations the orchestrator needs from it
//! (`get`, guarded `update_if`, `list_pending`) plus an in-memory
//! implementation used by tests and local runs.
//!
//! The guarded write is the system's whole consistency discipline: the
//! reconciler sweep and the webhook receiver race freely, and whichever
//! writes a terminal value first wins — the loser's write is a no-op, not an
//! error.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use store::{Guard, JobStore};
