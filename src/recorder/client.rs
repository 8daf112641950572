//! Connection-isolating adapter over a recorder backend

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::{RecorderBackend, RecorderConnector};
use crate::error::{SessionError, SessionResult};

/// Outcome of [`RecorderClient::stop_capture`]
#[derive(Debug)]
pub struct StopReport {
    /// Whether the recorder had an active output when stop was requested
    pub was_active: bool,
    /// Result of the status query and stop request; carries the reported output path
    pub result: SessionResult<Option<PathBuf>>,
}

/// Holds the single process-wide recorder connection.
///
/// The connection is opened lazily and reused; every failure is reported back
/// as a value and logged, never propagated as a panic.
pub struct RecorderClient {
    connector: Arc<dyn RecorderConnector>,
    backend: RwLock<Option<Arc<dyn RecorderBackend>>>,
}

impl RecorderClient {
    pub fn new(connector: Arc<dyn RecorderConnector>) -> Self {
        Self {
            connector,
            backend: RwLock::new(None),
        }
    }

    /// Open a fresh connection, replacing any existing one
    pub async fn connect(&self) -> bool {
        match self.connector.connect().await {
            Ok(backend) => {
                *self.backend.write().await = Some(Arc::from(backend));
                true
            }
            Err(e) => {
                error!("Failed to connect to recorder: {}", e);
                false
            }
        }
    }

    /// Connect only if no connection is held
    pub async fn ensure_connected(&self) -> bool {
        if self.is_connected().await {
            return true;
        }
        self.connect().await
    }

    /// Whether a connection is currently held
    pub async fn is_connected(&self) -> bool {
        self.backend.read().await.is_some()
    }

    async fn backend(&self) -> SessionResult<Arc<dyn RecorderBackend>> {
        if let Some(backend) = self.backend.read().await.as_ref() {
            return Ok(backend.clone());
        }

        if !self.connect().await {
            return Err(SessionError::BackendUnavailable(
                "recorder is not connected".to_string(),
            ));
        }

        self.backend.read().await.clone().ok_or_else(|| {
            SessionError::BackendUnavailable("recorder connection was dropped".to_string())
        })
    }

    /// Drop `failed` if it is still the held connection, so the next call reconnects
    async fn invalidate(&self, failed: &Arc<dyn RecorderBackend>) {
        let mut held = self.backend.write().await;
        if held
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, failed))
        {
            warn!("Dropping recorder connection after a failed request");
            *held = None;
        }
    }

    async fn checked<T>(
        &self,
        backend: &Arc<dyn RecorderBackend>,
        result: SessionResult<T>,
    ) -> SessionResult<T> {
        if let Err(SessionError::BackendUnavailable(_)) = &result {
            self.invalidate(backend).await;
        }
        result
    }

    /// Point recorder output at `dir`
    pub async fn configure_output(&self, dir: &Path) -> SessionResult<()> {
        let backend = self.backend().await?;
        let result = backend.set_record_directory(dir).await;
        self.checked(&backend, result).await
    }

    /// Start capturing
    pub async fn start_capture(&self) -> SessionResult<()> {
        let backend = self.backend().await?;
        let result = backend.start_record().await;
        self.checked(&backend, result).await.inspect_err(|e| {
            error!("Recorder start failed: {}", e);
        })
    }

    /// Stop capturing if the recorder reports an active output.
    /// When nothing is active no stop request is sent.
    pub async fn stop_capture(&self) -> StopReport {
        let backend = match self.backend().await {
            Ok(backend) => backend,
            Err(e) => {
                return StopReport {
                    was_active: false,
                    result: Err(e),
                }
            }
        };

        let status = backend.is_recording().await;
        let active = match self.checked(&backend, status).await {
            Ok(active) => active,
            Err(e) => {
                warn!("Could not query recorder status: {}", e);
                return StopReport {
                    was_active: false,
                    result: Err(e),
                };
            }
        };

        if !active {
            info!("Recorder has no active output, not sending stop");
            return StopReport {
                was_active: false,
                result: Ok(None),
            };
        }

        let result = backend.stop_record().await;
        let result = self.checked(&backend, result).await;
        if let Err(e) = &result {
            error!("Recorder stop failed: {}", e);
        }
        StopReport {
            was_active: true,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::testing::{ScriptedConnector, ScriptedState};
    use std::sync::atomic::Ordering;

    fn client(state: &Arc<ScriptedState>) -> RecorderClient {
        RecorderClient::new(Arc::new(ScriptedConnector {
            state: state.clone(),
        }))
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported_not_raised() {
        let state = ScriptedState::unreachable();
        let client = client(&state);

        assert!(!client.connect().await);
        assert!(!client.is_connected().await);
        assert!(matches!(
            client.start_capture().await,
            Err(SessionError::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_is_reused() {
        let state = ScriptedState::reachable();
        let client = client(&state);

        assert!(client.ensure_connected().await);
        assert!(client.ensure_connected().await);
        client.start_capture().await.unwrap();
        assert_eq!(state.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_skips_when_inactive() {
        let state = ScriptedState::reachable();
        let client = client(&state);

        let report = client.stop_capture().await;
        assert!(!report.was_active);
        assert!(report.result.is_ok());
        assert_eq!(state.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_after_start() {
        let state = ScriptedState::reachable();
        let client = client(&state);

        client.start_capture().await.unwrap();
        let report = client.stop_capture().await;
        assert!(report.was_active);
        assert!(report.result.is_ok());
        assert_eq!(state.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_failure_reports_inactive() {
        let state = ScriptedState::reachable();
        let client = client(&state);
        client.start_capture().await.unwrap();
        state.fail_status.store(true, Ordering::SeqCst);

        let report = client.stop_capture().await;
        assert!(!report.was_active);
        assert!(report.result.is_err());
        assert_eq!(state.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dead_connection_is_replaced() {
        let state = ScriptedState::reachable();
        state.dead_connections.store(1, Ordering::SeqCst);
        let client = client(&state);

        assert!(client.connect().await);
        assert!(matches!(
            client.start_capture().await,
            Err(SessionError::BackendUnavailable(_))
        ));
        assert!(!client.is_connected().await);

        client.start_capture().await.unwrap();
        assert!(client.is_connected().await);
        assert_eq!(state.connects.load(Ordering::SeqCst), 2);
        assert_eq!(state.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_failure_drops_connection() {
        let state = ScriptedState::reachable();
        let client = client(&state);
        client.start_capture().await.unwrap();
        state.fail_status.store(true, Ordering::SeqCst);

        assert!(client.stop_capture().await.result.is_err());
        assert!(!client.is_connected().await);

        state.fail_status.store(false, Ordering::SeqCst);
        let report = client.stop_capture().await;
        assert!(report.was_active);
        assert_eq!(state.connects.load(Ordering::SeqCst), 2);
    }
}
