//! Recording orchestration
//!
//! Drives a session through `Created -> Recording -> Stopped` against the
//! recorder. Only one capture may be active at a time: the orchestrator holds a
//! process-wide guard naming the session that owns the recorder, and a start
//! for any other session fails with [`SessionError::AlreadyRecording`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::recovery::{recover_output, snapshot_outputs, OutputBaseline};
use crate::config::{MarkerPolicy, RecordingConfig};
use crate::error::{SessionError, SessionResult};
use crate::recorder::RecorderClient;
use crate::session::{MarkerName, RecoveryOutcome, Session, SessionState, SessionStore};

/// Result of a successful start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Recorder started and the session is now recording
    Started,
    /// The session already owns an active capture
    AlreadyActive,
    /// The session is stopped; nothing was sent to the recorder
    Skipped,
}

/// Result of a stop request
#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub recovery: RecoveryOutcome,
    pub session: Session,
}

struct ActiveCapture {
    session_id: String,
    baseline: Option<OutputBaseline>,
}

pub struct RecordingOrchestrator {
    store: Arc<SessionStore>,
    recorder: Arc<RecorderClient>,
    output_root: PathBuf,
    video_extensions: Vec<String>,
    stop_grace: Duration,
    marker_policy: MarkerPolicy,
    /// Session owning the recorder. Only locked to read or claim, never across recorder I/O.
    active: Mutex<Option<ActiveCapture>>,
    /// Serializes start/stop transitions so they observe each other's final state
    transition: Mutex<()>,
}

impl RecordingOrchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        recorder: Arc<RecorderClient>,
        output_root: PathBuf,
        config: &RecordingConfig,
    ) -> Self {
        Self {
            store,
            recorder,
            output_root,
            video_extensions: config.video_extensions.clone(),
            stop_grace: Duration::from_millis(config.stop_grace_ms),
            marker_policy: config.marker_policy,
            active: Mutex::new(None),
            transition: Mutex::new(()),
        }
    }

    /// Id of the session currently owning the recorder, if any
    pub async fn active_session(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|capture| capture.session_id.clone())
    }

    async fn session(&self, session_id: &str) -> SessionResult<Session> {
        self.store
            .get(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Claim the recorder for `session_id`. `Some` is returned when the claim was not taken.
    async fn claim(&self, session_id: &str) -> Option<SessionResult<StartOutcome>> {
        let mut active = self.active.lock().await;
        match active.as_ref() {
            Some(capture) if capture.session_id == session_id => {
                info!("Session {} is already recording", session_id);
                Some(Ok(StartOutcome::AlreadyActive))
            }
            Some(capture) => {
                warn!(
                    "Refusing to start {}: recorder is in use by {}",
                    session_id, capture.session_id
                );
                Some(Err(SessionError::AlreadyRecording(capture.session_id.clone())))
            }
            None => {
                *active = Some(ActiveCapture {
                    session_id: session_id.to_string(),
                    baseline: None,
                });
                None
            }
        }
    }

    async fn release(&self, session_id: &str) {
        let mut active = self.active.lock().await;
        if active
            .as_ref()
            .is_some_and(|capture| capture.session_id == session_id)
        {
            *active = None;
        }
    }

    pub async fn start_recording(&self, session_id: &str) -> SessionResult<StartOutcome> {
        let session = self.session(session_id).await?;
        if session.state == SessionState::Stopped {
            info!("Session {} is already stopped, not restarting capture", session_id);
            return Ok(StartOutcome::Skipped);
        }

        // Fail fast while another session holds the recorder
        if let Some(capture) = self.active.lock().await.as_ref() {
            if capture.session_id != session_id {
                warn!(
                    "Refusing to start {}: recorder is in use by {}",
                    session_id, capture.session_id
                );
                return Err(SessionError::AlreadyRecording(capture.session_id.clone()));
            }
            info!("Session {} is already recording", session_id);
            return Ok(StartOutcome::AlreadyActive);
        }

        let _transition = self.transition.lock().await;

        // A stop may have completed while this start waited
        let session = self.session(session_id).await?;
        if session.state == SessionState::Stopped {
            info!("Session {} was stopped meanwhile, not starting capture", session_id);
            return Ok(StartOutcome::Skipped);
        }

        if let Some(outcome) = self.claim(session_id).await {
            return outcome;
        }

        match self.begin_capture(&session).await {
            Ok(baseline) => {
                if let Some(capture) = self.active.lock().await.as_mut() {
                    if capture.session_id == session_id {
                        capture.baseline = baseline;
                    }
                }
                info!("Started recording for session {}", session_id);
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                self.release(session_id).await;
                Err(e)
            }
        }
    }

    async fn begin_capture(&self, session: &Session) -> SessionResult<Option<OutputBaseline>> {
        if !self.recorder.ensure_connected().await {
            warn!("Recorder not connected, attempting to start anyway");
        }

        match self.recorder.configure_output(&self.output_root).await {
            Ok(()) => {
                info!("Recorder output directory set to: {:?}", self.output_root);
                info!("Video will be saved as: {}", session.video_filename);
            }
            Err(e) => warn!("Could not set recorder output path (continuing anyway): {}", e),
        }

        let baseline = match snapshot_outputs(&self.output_root, &self.video_extensions).await {
            Ok(baseline) => Some(baseline),
            Err(e) => {
                warn!("Could not list {:?} before capture: {}", self.output_root, e);
                None
            }
        };

        self.recorder.start_capture().await?;

        let started_ms = chrono::Utc::now().timestamp_millis();
        let policy = self.marker_policy;
        self.store
            .update(&session.session_id, |s| {
                s.sync_markers
                    .apply(MarkerName::VideoStart, started_ms, policy);
                s.state = SessionState::Recording;
            })
            .await?;

        Ok(baseline)
    }

    /// Stop the capture and stamp the end of the session. Recorder and filesystem
    /// failures are logged; the stop marker and end instant are always recorded.
    pub async fn stop_recording(&self, session_id: &str) -> SessionResult<StopOutcome> {
        self.session(session_id).await?;

        let _transition = self.transition.lock().await;
        let session = self.session(session_id).await?;
        let already_stopped = session.state == SessionState::Stopped;

        // The guard stays in place until the stop completes; only the baseline is taken
        let owned = if already_stopped {
            info!("Session {} already stopped, skipping recorder", session_id);
            None
        } else {
            let mut active = self.active.lock().await;
            match active.as_mut() {
                Some(capture) if capture.session_id != session_id => {
                    warn!(
                        "Recorder belongs to session {}, not stopping it for {}",
                        capture.session_id, session_id
                    );
                    None
                }
                Some(capture) => Some(capture.baseline.take()),
                None => Some(None),
            }
        };

        let (recovery, video_path) = match &owned {
            Some(baseline) => self.stop_and_recover(&session, baseline.as_ref()).await,
            None => (RecoveryOutcome::Skipped, None),
        };

        let stopped_ms = chrono::Utc::now().timestamp_millis();
        let policy = self.marker_policy;
        let updated = self
            .store
            .update(session_id, |s| {
                s.sync_markers.apply(MarkerName::VideoStop, stopped_ms, policy);
                s.end_timestamp = Some(stopped_ms);
                s.state = SessionState::Stopped;
                if let Some(path) = video_path {
                    s.video_path = path;
                }
                if !already_stopped {
                    s.recovery = Some(recovery);
                }
            })
            .await;

        if owned.is_some() {
            self.release(session_id).await;
        }
        let session = updated?;

        info!(
            "Stopped session {} (recovery: {:?})",
            session_id, recovery
        );
        Ok(StopOutcome { recovery, session })
    }

    async fn stop_and_recover(
        &self,
        session: &Session,
        baseline: Option<&OutputBaseline>,
    ) -> (RecoveryOutcome, Option<PathBuf>) {
        let report = self.recorder.stop_capture().await;

        if !report.was_active {
            if let Err(e) = &report.result {
                error!("Recorder stop error for {}: {}", session.session_id, e);
                return (RecoveryOutcome::Failed, None);
            }
            warn!("Recorder was not recording for session {}", session.session_id);
            return (RecoveryOutcome::Skipped, None);
        }

        match report.result {
            Ok(reported) => {
                info!(
                    "Stopped recorder for session {} (reported output: {:?})",
                    session.session_id, reported
                );
            }
            Err(e) => {
                error!("Recorder stop error for {}: {}", session.session_id, e);
                return (RecoveryOutcome::Failed, None);
            }
        }

        tokio::time::sleep(self.stop_grace).await;

        let target = session.target_video_path(&self.output_root);
        match recover_output(&self.output_root, &self.video_extensions, &target, baseline).await {
            Ok(report) => (report.outcome, report.video_path),
            Err(e) => {
                error!("Failed to rename video for {}: {}", session.session_id, e);
                (RecoveryOutcome::Failed, None)
            }
        }
    }
}
