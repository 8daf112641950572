//! Sync marker recording and CSV export

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::MarkerPolicy;
use crate::error::{SessionError, SessionResult};
use crate::session::{MarkerName, SessionStore};

const SYNC_LOG_FILENAME: &str = "sync_markers.csv";
const SYNC_LOG_HEADER: [&str; 3] = ["event_type", "timestamp", "video_filename"];

/// What a marker write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerWrite {
    /// Slot now holds the new timestamp
    Applied,
    /// Slot was already set and the policy kept the earlier value
    Kept,
    /// No session with that id; nothing was written
    UnknownSession,
}

/// Records named timestamps on sessions and exports them as a log
pub struct MarkerTracker {
    store: Arc<SessionStore>,
    policy: MarkerPolicy,
}

impl MarkerTracker {
    pub fn new(store: Arc<SessionStore>, policy: MarkerPolicy) -> Self {
        Self { store, policy }
    }

    /// Set a marker slot. An unknown session is a silent no-op so that late or
    /// duplicate client calls stay harmless.
    pub async fn set_marker(
        &self,
        session_id: &str,
        marker: MarkerName,
        timestamp_ms: i64,
    ) -> MarkerWrite {
        let policy = self.policy;
        let mut applied = false;
        let result = self
            .store
            .update(session_id, |session| {
                applied = session.sync_markers.apply(marker, timestamp_ms, policy);
            })
            .await;

        match result {
            Ok(_) if applied => {
                debug!("{}: {} = {}", session_id, marker, timestamp_ms);
                MarkerWrite::Applied
            }
            Ok(_) => {
                warn!(
                    "{}: {} already set, ignoring {} ({:?})",
                    session_id, marker, timestamp_ms, policy
                );
                MarkerWrite::Kept
            }
            Err(_) => {
                debug!(
                    "Ignoring marker {} for unknown session {}",
                    marker, session_id
                );
                MarkerWrite::UnknownSession
            }
        }
    }

    /// Write `sync_markers.csv` into the session folder, one row per set slot
    pub async fn export_log(&self, session_id: &str) -> SessionResult<PathBuf> {
        let session = self
            .store
            .get(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let rows = session.sync_markers.rows();
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(SYNC_LOG_HEADER)?;
        for (name, timestamp) in &rows {
            writer.write_record([
                name.as_str(),
                timestamp.to_string().as_str(),
                session.video_filename.as_str(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| SessionError::Serialization(e.to_string()))?;

        let path = session.session_folder.join(SYNC_LOG_FILENAME);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| SessionError::io(&path, e))?;

        info!(
            "Saved {} sync markers for session {} to {:?}",
            rows.len(),
            session_id,
            path
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup(policy: MarkerPolicy) -> (tempfile::TempDir, Arc<SessionStore>, MarkerTracker, String) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(
            dir.path().join("dataset"),
            dir.path().join("videos"),
        ));
        let session = store.create_session_at("S1", "baseline", 1000).await.unwrap();
        let tracker = MarkerTracker::new(store.clone(), policy);
        (dir, store, tracker, session.session_id)
    }

    #[tokio::test]
    async fn test_set_marker_updates_and_persists() {
        let (_dir, store, tracker, id) = setup(MarkerPolicy::LastWriteWins).await;

        let write = tracker.set_marker(&id, MarkerName::WatchStart, 1100).await;
        assert_eq!(write, MarkerWrite::Applied);

        let session = store.get(&id).await.unwrap();
        assert_eq!(session.sync_markers.watch_start, Some(1100));
        let snapshot = std::fs::read_to_string(crate::session::metadata_path(&session)).unwrap();
        assert!(snapshot.contains("1100"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_noop() {
        let (_dir, store, tracker, _id) = setup(MarkerPolicy::LastWriteWins).await;

        let write = tracker.set_marker("ghost", MarkerName::PhoneStart, 1).await;
        assert_eq!(write, MarkerWrite::UnknownSession);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_policy_controls_repeated_writes() {
        let (_dir, store, tracker, id) = setup(MarkerPolicy::FirstWriteWins).await;

        tracker.set_marker(&id, MarkerName::PhoneStop, 10).await;
        let second = tracker.set_marker(&id, MarkerName::PhoneStop, 20).await;
        assert_eq!(second, MarkerWrite::Kept);
        assert_eq!(store.get(&id).await.unwrap().sync_markers.phone_stop, Some(10));

        let (_dir, store, tracker, id) = setup(MarkerPolicy::LastWriteWins).await;
        tracker.set_marker(&id, MarkerName::PhoneStop, 10).await;
        tracker.set_marker(&id, MarkerName::PhoneStop, 5).await;
        assert_eq!(store.get(&id).await.unwrap().sync_markers.phone_stop, Some(5));
    }

    #[tokio::test]
    async fn test_export_writes_only_set_slots_in_order() {
        let (_dir, _store, tracker, id) = setup(MarkerPolicy::LastWriteWins).await;
        tracker.set_marker(&id, MarkerName::VideoStart, 1200).await;
        tracker.set_marker(&id, MarkerName::PhoneStart, 1100).await;

        let path = tracker.export_log(&id).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "event_type,timestamp,video_filename\n\
             phone_start,1100,S1_baseline_1000.mp4\n\
             video_start,1200,S1_baseline_1000.mp4\n"
        );

        // Same table, same output
        tracker.export_log(&id).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
    }

    #[tokio::test]
    async fn test_export_with_no_markers_has_header_only() {
        let (_dir, _store, tracker, id) = setup(MarkerPolicy::LastWriteWins).await;
        let path = tracker.export_log(&id).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "event_type,timestamp,video_filename\n"
        );
    }

    #[tokio::test]
    async fn test_export_unknown_session() {
        let (_dir, _store, tracker, _id) = setup(MarkerPolicy::LastWriteWins).await;
        assert!(matches!(
            tracker.export_log("ghost").await,
            Err(SessionError::NotFound(_))
        ));
    }
}
