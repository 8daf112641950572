//! Session records and the in-memory store that owns them

mod model;
mod store;

pub use model::{validate_component, MarkerName, RecoveryOutcome, Session, SessionState};
pub use store::{metadata_path, SessionStore};
