//! Error taxonomy shared by the session, recorder and HTTP layers

use thiserror::Error;

/// Errors surfaced by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Unknown session id
    #[error("session not found: {0}")]
    NotFound(String),

    /// A session with the same identity already exists
    #[error("session already exists: {0}")]
    AlreadyExists(String),

    /// The recorder is already capturing for another session
    #[error("recorder is already capturing for session {0}")]
    AlreadyRecording(String),

    /// Recorder connection or control failure
    #[error("recorder backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Folder or file write failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Marker name outside the fixed slot set
    #[error("unknown sync marker: {0}")]
    InvalidMarker(String),

    /// Malformed client input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Snapshot or log encoding failure
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SessionError {
    /// Wrap an I/O error together with the path it happened on
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<csv::Error> for SessionError {
    fn from(e: csv::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
