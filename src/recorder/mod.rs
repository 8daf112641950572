//! Recorder backend control
//!
//! The recorder is an external capture service (OBS Studio) driven over its
//! WebSocket API. [`RecorderBackend`] is one live connection, [`RecorderConnector`]
//! knows how to open one, and [`RecorderClient`] wraps both so that connection
//! and control failures come back as values instead of escaping to callers.

mod client;
mod obs;

pub use client::RecorderClient;
pub use obs::ObsConnector;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::SessionResult;

/// An established connection to a recorder
#[async_trait]
pub trait RecorderBackend: Send + Sync {
    /// Point the recorder's output at `dir`
    async fn set_record_directory(&self, dir: &Path) -> SessionResult<()>;

    /// Begin capturing
    async fn start_record(&self) -> SessionResult<()>;

    /// Stop capturing, returning the output path when the recorder reports one
    async fn stop_record(&self) -> SessionResult<Option<PathBuf>>;

    /// Whether an output is currently active
    async fn is_recording(&self) -> SessionResult<bool>;
}

/// Factory for recorder connections
#[async_trait]
pub trait RecorderConnector: Send + Sync {
    async fn connect(&self) -> SessionResult<Box<dyn RecorderBackend>>;
}

#[cfg(test)]
pub mod testing {
    //! Scripted in-memory recorder used across the crate's tests

    use super::*;
    use crate::error::SessionError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Shared knobs and counters for a scripted recorder
    #[derive(Default)]
    pub struct ScriptedState {
        pub reachable: AtomicBool,
        pub fail_start: AtomicBool,
        pub fail_set_directory: AtomicBool,
        pub fail_status: AtomicBool,
        pub active: AtomicBool,
        pub connects: AtomicUsize,
        /// Number of upcoming connections that fail every request
        pub dead_connections: AtomicUsize,
        pub starts: AtomicUsize,
        pub stops: AtomicUsize,
        pub record_directory: Mutex<Option<PathBuf>>,
        /// File written into the record directory when a capture stops
        pub output_name: Mutex<Option<String>>,
    }

    impl ScriptedState {
        pub fn reachable() -> Arc<Self> {
            let state = Self::default();
            state.reachable.store(true, Ordering::SeqCst);
            Arc::new(state)
        }

        pub fn unreachable() -> Arc<Self> {
            Arc::new(Self::default())
        }
    }

    pub struct ScriptedConnector {
        pub state: Arc<ScriptedState>,
    }

    struct ScriptedBackend {
        state: Arc<ScriptedState>,
        dead: bool,
    }

    impl ScriptedBackend {
        fn check_alive(&self) -> SessionResult<()> {
            if self.dead {
                return Err(SessionError::BackendUnavailable(
                    "connection reset".to_string(),
                ));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RecorderConnector for ScriptedConnector {
        async fn connect(&self) -> SessionResult<Box<dyn RecorderBackend>> {
            self.state.connects.fetch_add(1, Ordering::SeqCst);
            if !self.state.reachable.load(Ordering::SeqCst) {
                return Err(SessionError::BackendUnavailable(
                    "connection refused".to_string(),
                ));
            }
            let dead = self
                .state
                .dead_connections
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            Ok(Box::new(ScriptedBackend {
                state: self.state.clone(),
                dead,
            }))
        }
    }

    #[async_trait]
    impl RecorderBackend for ScriptedBackend {
        async fn set_record_directory(&self, dir: &Path) -> SessionResult<()> {
            self.check_alive()?;
            if self.state.fail_set_directory.load(Ordering::SeqCst) {
                return Err(SessionError::BackendUnavailable(
                    "SetRecordDirectory rejected".to_string(),
                ));
            }
            *self.state.record_directory.lock().unwrap() = Some(dir.to_path_buf());
            Ok(())
        }

        async fn start_record(&self) -> SessionResult<()> {
            self.check_alive()?;
            if self.state.fail_start.load(Ordering::SeqCst) {
                return Err(SessionError::BackendUnavailable(
                    "StartRecord failed".to_string(),
                ));
            }
            self.state.starts.fetch_add(1, Ordering::SeqCst);
            self.state.active.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop_record(&self) -> SessionResult<Option<PathBuf>> {
            self.check_alive()?;
            self.state.stops.fetch_add(1, Ordering::SeqCst);
            self.state.active.store(false, Ordering::SeqCst);

            let dir = self.state.record_directory.lock().unwrap().clone();
            let name = self.state.output_name.lock().unwrap().clone();
            match (dir, name) {
                (Some(dir), Some(name)) => {
                    let path = dir.join(name);
                    std::fs::write(&path, b"video").unwrap();
                    Ok(Some(path))
                }
                _ => Ok(None),
            }
        }

        async fn is_recording(&self) -> SessionResult<bool> {
            self.check_alive()?;
            if self.state.fail_status.load(Ordering::SeqCst) {
                return Err(SessionError::BackendUnavailable(
                    "GetRecordStatus failed".to_string(),
                ));
            }
            Ok(self.state.active.load(Ordering::SeqCst))
        }
    }
}
