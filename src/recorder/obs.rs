//! OBS WebSocket recorder backend

use async_trait::async_trait;
use obws::Client;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{RecorderBackend, RecorderConnector};
use crate::config::ObsConfig;
use crate::error::{SessionError, SessionResult};

fn backend_error(context: &str, e: impl std::fmt::Display) -> SessionError {
    SessionError::BackendUnavailable(format!("{}: {}", context, e))
}

/// Opens connections to an OBS WebSocket server
pub struct ObsConnector {
    config: ObsConfig,
}

impl ObsConnector {
    pub fn new(config: &ObsConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl RecorderConnector for ObsConnector {
    async fn connect(&self) -> SessionResult<Box<dyn RecorderBackend>> {
        let client = Client::connect(
            &self.config.host,
            self.config.port,
            self.config.password.as_deref(),
        )
        .await
        .map_err(|e| backend_error("Failed to connect to OBS WebSocket", e))?;

        info!(
            "Connected to OBS WebSocket at {}:{}",
            self.config.host, self.config.port
        );
        Ok(Box::new(ObsBackend { client }))
    }
}

/// A live OBS WebSocket connection
pub struct ObsBackend {
    client: Client,
}

#[async_trait]
impl RecorderBackend for ObsBackend {
    async fn set_record_directory(&self, dir: &Path) -> SessionResult<()> {
        let dir_str = dir.to_str().ok_or_else(|| {
            SessionError::InvalidInput(format!("Record directory is not UTF-8: {:?}", dir))
        })?;

        self.client
            .config()
            .set_record_directory(dir_str)
            .await
            .map_err(|e| backend_error("SetRecordDirectory failed", e))?;

        debug!("OBS record directory set to {}", dir_str);
        Ok(())
    }

    async fn start_record(&self) -> SessionResult<()> {
        self.client
            .recording()
            .start()
            .await
            .map_err(|e| backend_error("StartRecord failed", e))?;
        info!("Started OBS recording");
        Ok(())
    }

    async fn stop_record(&self) -> SessionResult<Option<PathBuf>> {
        let output_path = self
            .client
            .recording()
            .stop()
            .await
            .map_err(|e| backend_error("StopRecord failed", e))?;
        info!("Stopped OBS recording (reported output: {})", output_path);

        if output_path.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PathBuf::from(output_path)))
        }
    }

    async fn is_recording(&self) -> SessionResult<bool> {
        let status = self
            .client
            .recording()
            .status()
            .await
            .map_err(|e| backend_error("GetRecordStatus failed", e))?;
        debug!(
            "OBS record status: active={}, paused={}",
            status.active, status.paused
        );
        Ok(status.active)
    }
}
