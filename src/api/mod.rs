//! HTTP and WebSocket surface over [`SessionService`]

mod error;
mod routes;
mod ws;

use std::sync::Arc;

use crate::server::SessionService;

pub use routes::router;

/// Shared state handed to every handler
pub type AppState = Arc<SessionService>;
