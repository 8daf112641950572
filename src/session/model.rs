//! Session record and sync marker table

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::MarkerPolicy;
use crate::error::{SessionError, SessionResult};

/// Container extension of the target video filename
pub const VIDEO_EXTENSION: &str = "mp4";

const ID_SEPARATOR: char = '_';

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Created,
    Recording,
    Stopped,
}

/// Result of locating the recorder's output file after a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Newest output file was moved to the session's target path
    Renamed,
    /// Newest output file already had the target name
    AlreadyNamed,
    /// No candidate output file was found
    Degraded,
    /// Recorder was not active or not owned by the session; nothing was moved
    Skipped,
    /// Stopping the recorder or moving its output failed
    Failed,
}

/// Named sync marker slots, in export order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerName {
    WatchStart,
    WatchStop,
    PhoneStart,
    PhoneStop,
    VideoStart,
    VideoStop,
}

impl MarkerName {
    pub const ALL: [MarkerName; 6] = [
        MarkerName::WatchStart,
        MarkerName::WatchStop,
        MarkerName::PhoneStart,
        MarkerName::PhoneStop,
        MarkerName::VideoStart,
        MarkerName::VideoStop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerName::WatchStart => "watch_start",
            MarkerName::WatchStop => "watch_stop",
            MarkerName::PhoneStart => "phone_start",
            MarkerName::PhoneStop => "phone_stop",
            MarkerName::VideoStart => "video_start",
            MarkerName::VideoStop => "video_stop",
        }
    }
}

impl fmt::Display for MarkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarkerName {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MarkerName::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| SessionError::InvalidMarker(s.to_string()))
    }
}

/// Millisecond timestamps for each marker slot; `None` means unset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMarkers {
    pub watch_start: Option<i64>,
    pub watch_stop: Option<i64>,
    pub phone_start: Option<i64>,
    pub phone_stop: Option<i64>,
    pub video_start: Option<i64>,
    pub video_stop: Option<i64>,
}

impl SyncMarkers {
    pub fn get(&self, name: MarkerName) -> Option<i64> {
        match name {
            MarkerName::WatchStart => self.watch_start,
            MarkerName::WatchStop => self.watch_stop,
            MarkerName::PhoneStart => self.phone_start,
            MarkerName::PhoneStop => self.phone_stop,
            MarkerName::VideoStart => self.video_start,
            MarkerName::VideoStop => self.video_stop,
        }
    }

    fn slot_mut(&mut self, name: MarkerName) -> &mut Option<i64> {
        match name {
            MarkerName::WatchStart => &mut self.watch_start,
            MarkerName::WatchStop => &mut self.watch_stop,
            MarkerName::PhoneStart => &mut self.phone_start,
            MarkerName::PhoneStop => &mut self.phone_stop,
            MarkerName::VideoStart => &mut self.video_start,
            MarkerName::VideoStop => &mut self.video_stop,
        }
    }

    /// Write a slot under `policy`. Returns whether the slot now holds `timestamp_ms`
    /// because of this call. Slots are never cleared.
    pub fn apply(&mut self, name: MarkerName, timestamp_ms: i64, policy: MarkerPolicy) -> bool {
        let slot = self.slot_mut(name);
        match (policy, *slot) {
            (MarkerPolicy::FirstWriteWins, Some(_)) => false,
            _ => {
                *slot = Some(timestamp_ms);
                true
            }
        }
    }

    /// Set slots in enumeration order
    pub fn rows(&self) -> Vec<(MarkerName, i64)> {
        MarkerName::ALL
            .into_iter()
            .filter_map(|name| self.get(name).map(|ts| (name, ts)))
            .collect()
    }
}

/// The three fields a session's identity is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub subject_id: String,
    pub session_type: String,
    pub created_ms: i64,
}

impl SessionIdentity {
    /// `subject_id` may not contain `_`, so the first `_` of an id always ends the subject
    /// and the last one always precedes the epoch
    pub fn new(subject_id: &str, session_type: &str, created_ms: i64) -> SessionResult<Self> {
        validate_component("subject_id", subject_id)?;
        validate_component("session_type", session_type)?;
        if subject_id.contains(ID_SEPARATOR) {
            return Err(SessionError::InvalidInput(format!(
                "subject_id may not contain '{}': {:?}",
                ID_SEPARATOR, subject_id
            )));
        }
        Ok(Self {
            subject_id: subject_id.to_string(),
            session_type: session_type.to_string(),
            created_ms,
        })
    }

    /// `<subject>_<type>_<epochMs>`
    pub fn session_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.subject_id, self.session_type, self.created_ms
        )
    }

    /// `<datasetRoot>/<subject>/<type>_<epochMs>`
    pub fn folder(&self, dataset_root: &Path) -> PathBuf {
        dataset_root
            .join(&self.subject_id)
            .join(format!("{}_{}", self.session_type, self.created_ms))
    }

    pub fn video_filename(&self) -> String {
        format!("{}.{}", self.session_id(), VIDEO_EXTENSION)
    }
}

/// One subject's recording attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub subject_id: String,
    pub session_type: String,
    pub start_timestamp: i64,
    pub end_timestamp: Option<i64>,
    pub session_folder: PathBuf,
    pub video_filename: String,
    pub video_path: PathBuf,
    pub sync_markers: SyncMarkers,
    #[serde(default)]
    pub state: SessionState,
    #[serde(default)]
    pub recovery: Option<RecoveryOutcome>,
}

impl Session {
    pub fn new(identity: &SessionIdentity, dataset_root: &Path, video_root: &Path) -> Self {
        let video_filename = identity.video_filename();
        Self {
            session_id: identity.session_id(),
            subject_id: identity.subject_id.clone(),
            session_type: identity.session_type.clone(),
            start_timestamp: identity.created_ms,
            end_timestamp: None,
            session_folder: identity.folder(dataset_root),
            video_path: video_root.join(&video_filename),
            video_filename,
            sync_markers: SyncMarkers::default(),
            state: SessionState::Created,
            recovery: None,
        }
    }

    /// Where the recorder output should end up
    pub fn target_video_path(&self, video_root: &Path) -> PathBuf {
        video_root.join(&self.video_filename)
    }
}

/// Reject values that would escape their directory when used as a path component
pub fn validate_component(field: &str, value: &str) -> SessionResult<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);
    if bad {
        return Err(SessionError::InvalidInput(format!(
            "{} must be a non-empty name without path separators: {:?}",
            field, value
        )));
    }
    Ok(())
}
