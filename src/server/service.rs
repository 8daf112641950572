//! Session operations as exposed to clients
//!
//! Composes the store, marker tracker, orchestrator and broadcaster. HTTP and
//! WebSocket handlers call into this and only translate results.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::capture::{RecordingOrchestrator, StartOutcome, StopOutcome};
use crate::config::{Config, ResolvedPaths};
use crate::error::{SessionError, SessionResult};
use crate::events::{EventBroadcaster, SessionEvent};
use crate::recorder::{RecorderClient, RecorderConnector};
use crate::session::{validate_component, MarkerName, Session, SessionStore};
use crate::sync::{MarkerTracker, MarkerWrite};

/// Snapshot returned by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub obs_connected: bool,
    pub active_sessions: usize,
    pub recording_session: Option<String>,
    pub observers: usize,
}

pub struct SessionService {
    store: Arc<SessionStore>,
    tracker: MarkerTracker,
    orchestrator: RecordingOrchestrator,
    recorder: Arc<RecorderClient>,
    broadcaster: Arc<EventBroadcaster>,
}

impl SessionService {
    pub fn new(
        config: &Config,
        paths: &ResolvedPaths,
        connector: Arc<dyn RecorderConnector>,
    ) -> Self {
        let store = Arc::new(SessionStore::new(
            paths.dataset_root.clone(),
            paths.video_output.clone(),
        ));
        let recorder = Arc::new(RecorderClient::new(connector));
        let tracker = MarkerTracker::new(store.clone(), config.recording.marker_policy);
        let orchestrator = RecordingOrchestrator::new(
            store.clone(),
            recorder.clone(),
            paths.video_output.clone(),
            &config.recording,
        );

        Self {
            store,
            tracker,
            orchestrator,
            recorder,
            broadcaster: Arc::new(EventBroadcaster::new()),
        }
    }

    pub fn broadcaster(&self) -> Arc<EventBroadcaster> {
        self.broadcaster.clone()
    }

    /// Try the recorder connection once at startup; failure is not fatal
    pub async fn connect_recorder(&self) -> bool {
        self.recorder.connect().await
    }

    pub async fn create_session(
        &self,
        subject_id: &str,
        session_type: &str,
    ) -> SessionResult<Session> {
        let session = self.store.create_session(subject_id, session_type).await?;
        self.broadcaster
            .broadcast(&SessionEvent::SessionCreated {
                session: session.clone(),
            })
            .await;
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> SessionResult<Session> {
        self.store
            .get(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    pub async fn list_sessions(&self) -> Vec<Session> {
        self.store.list_all().await
    }

    /// Stamp the phone's start instant, then start the recorder
    pub async fn start_session(
        &self,
        session_id: &str,
        phone_timestamp: i64,
    ) -> SessionResult<StartOutcome> {
        self.tracker
            .set_marker(session_id, MarkerName::PhoneStart, phone_timestamp)
            .await;

        let outcome = self.orchestrator.start_recording(session_id).await?;
        if outcome == StartOutcome::Started {
            self.broadcaster
                .broadcast(&SessionEvent::RecordingStarted {
                    session_id: session_id.to_string(),
                })
                .await;
        }
        Ok(outcome)
    }

    /// Stamp the phone's stop instant, stop the recorder and export the marker log
    pub async fn stop_session(
        &self,
        session_id: &str,
        phone_timestamp: i64,
    ) -> SessionResult<StopOutcome> {
        self.tracker
            .set_marker(session_id, MarkerName::PhoneStop, phone_timestamp)
            .await;

        let outcome = self.orchestrator.stop_recording(session_id).await?;

        if let Err(e) = self.tracker.export_log(session_id).await {
            error!("Failed to export sync markers for {}: {}", session_id, e);
        }

        self.broadcaster
            .broadcast(&SessionEvent::RecordingStopped {
                session_id: session_id.to_string(),
            })
            .await;
        Ok(outcome)
    }

    pub async fn set_marker(
        &self,
        session_id: &str,
        marker_name: &str,
        timestamp: i64,
    ) -> SessionResult<MarkerWrite> {
        let marker: MarkerName = marker_name.parse()?;
        Ok(self.tracker.set_marker(session_id, marker, timestamp).await)
    }

    /// Store an uploaded data file as `<sessionFolder>/<fileType>.csv`, replacing any earlier upload
    pub async fn upload_file(
        &self,
        session_id: &str,
        file_type: &str,
        contents: &[u8],
    ) -> SessionResult<PathBuf> {
        let session = self.get_session(session_id).await?;
        validate_component("file_type", file_type)?;

        let path = session.session_folder.join(format!("{}.csv", file_type));
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| SessionError::io(&path, e))?;

        info!(
            "Uploaded {}.csv ({} bytes) for session {}",
            file_type,
            contents.len(),
            session_id
        );
        Ok(path)
    }

    pub async fn health(&self) -> Health {
        Health {
            status: "ok",
            obs_connected: self.recorder.is_connected().await,
            active_sessions: self.store.count().await,
            recording_session: self.orchestrator.active_session().await,
            observers: self.broadcaster.observer_count().await,
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::events::{Observer, ObserverError};
    use crate::recorder::testing::{ScriptedConnector, ScriptedState};
    use crate::session::{RecoveryOutcome, SessionState};
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub fn service(dir: &tempfile::TempDir, state: Arc<ScriptedState>) -> SessionService {
        let paths = ResolvedPaths {
            dataset_root: dir.path().join("dataset"),
            video_output: dir.path().join("videos"),
        };
        std::fs::create_dir_all(&paths.video_output).unwrap();
        let mut config = Config::default();
        config.recording.stop_grace_ms = 0;
        SessionService::new(&config, &paths, Arc::new(ScriptedConnector { state }))
    }

    #[derive(Default)]
    struct Collector {
        received: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl Observer for Collector {
        async fn send_text(&self, text: Arc<str>) -> Result<(), ObserverError> {
            self.received
                .lock()
                .unwrap()
                .push(serde_json::from_str(&text).unwrap());
            Ok(())
        }
    }

    struct Dead;

    #[async_trait]
    impl Observer for Dead {
        async fn send_text(&self, _text: Arc<str>) -> Result<(), ObserverError> {
            Err(ObserverError::Closed)
        }
    }

    #[tokio::test]
    async fn test_full_session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let state = ScriptedState::reachable();
        *state.output_name.lock().unwrap() = Some("obs-output.mp4".to_string());
        let service = service(&dir, state);

        let session = service.create_session("S1", "baseline").await.unwrap();
        let t = session.start_timestamp;

        service.start_session(&session.session_id, t + 100).await.unwrap();
        let recording = service.get_session(&session.session_id).await.unwrap();
        assert_eq!(recording.state, SessionState::Recording);
        assert_eq!(recording.sync_markers.phone_start, Some(t + 100));
        assert!(recording.sync_markers.video_start.is_some());

        let stopped = service.stop_session(&session.session_id, t + 5000).await.unwrap();
        assert_eq!(stopped.recovery, RecoveryOutcome::Renamed);
        assert_eq!(stopped.session.state, SessionState::Stopped);
        assert!(stopped.session.video_path.exists());

        let log = std::fs::read_to_string(session.session_folder.join("sync_markers.csv")).unwrap();
        let rows: Vec<&str> = log.lines().skip(1).collect();
        assert_eq!(rows.len(), 4);
        assert!(rows[0].starts_with(&format!("phone_start,{},", t + 100)));
        assert!(rows[1].starts_with(&format!("phone_stop,{},", t + 5000)));
        assert!(rows[2].starts_with("video_start,"));
        assert!(rows[3].starts_with("video_stop,"));
    }

    #[tokio::test]
    async fn test_observers_get_lifecycle_events_despite_dead_peer() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, ScriptedState::reachable());
        let a = Arc::new(Collector::default());
        let b = Arc::new(Collector::default());
        let broadcaster = service.broadcaster();
        broadcaster.subscribe(a.clone()).await;
        broadcaster.subscribe(Arc::new(Dead)).await;
        broadcaster.subscribe(b.clone()).await;

        let session = service.create_session("S1", "baseline").await.unwrap();
        service.start_session(&session.session_id, 1).await.unwrap();
        service.stop_session(&session.session_id, 2).await.unwrap();

        for observer in [&a, &b] {
            let types: Vec<String> = observer
                .received
                .lock()
                .unwrap()
                .iter()
                .map(|event| event["type"].as_str().unwrap().to_string())
                .collect();
            assert_eq!(
                types,
                vec!["session_created", "recording_started", "recording_stopped"]
            );
        }
    }

    #[tokio::test]
    async fn test_stop_without_output_file_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, ScriptedState::reachable());
        let session = service.create_session("S1", "baseline").await.unwrap();

        service.start_session(&session.session_id, 1).await.unwrap();
        let stopped = service.stop_session(&session.session_id, 2).await.unwrap();

        assert_eq!(stopped.recovery, RecoveryOutcome::Degraded);
        assert_eq!(stopped.session.video_path, session.video_path);
        assert_eq!(stopped.session.recovery, Some(RecoveryOutcome::Degraded));
        assert_eq!(stopped.session.state, SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_set_marker_validates_name_and_tolerates_unknown_session() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, ScriptedState::reachable());

        assert!(matches!(
            service.set_marker("ghost", "not_a_marker", 1).await,
            Err(SessionError::InvalidMarker(_))
        ));
        assert_eq!(
            service.set_marker("ghost", "watch_start", 1).await.unwrap(),
            MarkerWrite::UnknownSession
        );
    }

    #[tokio::test]
    async fn test_upload_overwrites_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, ScriptedState::reachable());
        let session = service.create_session("S1", "baseline").await.unwrap();

        service
            .upload_file(&session.session_id, "ppg", b"first")
            .await
            .unwrap();
        let path = service
            .upload_file(&session.session_id, "ppg", b"second")
            .await
            .unwrap();

        assert_eq!(path, session.session_folder.join("ppg.csv"));
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_targets() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, ScriptedState::reachable());
        let session = service.create_session("S1", "baseline").await.unwrap();

        assert!(matches!(
            service.upload_file("ghost", "ppg", b"x").await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            service.upload_file(&session.session_id, "..", b"x").await,
            Err(SessionError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_health_reports_connection_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir, ScriptedState::unreachable());
        assert!(!service.connect_recorder().await);
        service.create_session("S1", "baseline").await.unwrap();

        let health = service.health().await;
        assert!(!health.obs_connected);
        assert_eq!(health.active_sessions, 1);
    }
}
