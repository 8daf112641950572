//! In-memory session registry with per-session metadata snapshots
//!
//! The registry map is only locked for lookups and inserts. Each session sits
//! behind its own mutex so that a mutation and the snapshot write that follows
//! it are serialized per session without blocking other sessions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use super::model::{Session, SessionIdentity};
use crate::error::{SessionError, SessionResult};

const METADATA_FILENAME: &str = "metadata.json";

type SessionHandle = Arc<Mutex<Session>>;

#[derive(Default)]
struct Registry {
    order: Vec<String>,
    by_id: HashMap<String, SessionHandle>,
}

/// Owner of all sessions known to this process
pub struct SessionStore {
    dataset_root: PathBuf,
    video_root: PathBuf,
    registry: RwLock<Registry>,
}

impl SessionStore {
    pub fn new(dataset_root: PathBuf, video_root: PathBuf) -> Self {
        Self {
            dataset_root,
            video_root,
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Create a session stamped with the current wall-clock instant
    pub async fn create_session(
        &self,
        subject_id: &str,
        session_type: &str,
    ) -> SessionResult<Session> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.create_session_at(subject_id, session_type, now_ms)
            .await
    }

    /// Create a session with an explicit creation instant
    pub async fn create_session_at(
        &self,
        subject_id: &str,
        session_type: &str,
        created_ms: i64,
    ) -> SessionResult<Session> {
        let identity = SessionIdentity::new(subject_id, session_type, created_ms)?;
        let session_id = identity.session_id();

        if self.registry.read().await.by_id.contains_key(&session_id) {
            return Err(SessionError::AlreadyExists(session_id));
        }

        let session = Session::new(&identity, &self.dataset_root, &self.video_root);
        tokio::fs::create_dir_all(&session.session_folder)
            .await
            .map_err(|e| SessionError::io(&session.session_folder, e))?;

        {
            let mut registry = self.registry.write().await;
            // Re-check: another request may have inserted the same id while the folder was created
            if registry.by_id.contains_key(&session_id) {
                return Err(SessionError::AlreadyExists(session_id));
            }
            registry.order.push(session_id.clone());
            registry
                .by_id
                .insert(session_id.clone(), Arc::new(Mutex::new(session.clone())));
        }

        self.persist_logged(&session).await;
        info!(
            "Created session {} in {:?}",
            session_id, session.session_folder
        );
        Ok(session)
    }

    async fn handle(&self, session_id: &str) -> Option<SessionHandle> {
        self.registry.read().await.by_id.get(session_id).cloned()
    }

    /// Current state of a session
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// All sessions in creation order
    pub async fn list_all(&self) -> Vec<Session> {
        let handles: Vec<SessionHandle> = {
            let registry = self.registry.read().await;
            registry
                .order
                .iter()
                .filter_map(|id| registry.by_id.get(id).cloned())
                .collect()
        };

        let mut sessions = Vec::with_capacity(handles.len());
        for handle in handles {
            sessions.push(handle.lock().await.clone());
        }
        sessions
    }

    pub async fn count(&self) -> usize {
        self.registry.read().await.by_id.len()
    }

    /// Apply `mutate` to a session and persist the result while still holding its lock.
    /// A failed snapshot write is logged; the in-memory change stands.
    pub async fn update<F>(&self, session_id: &str, mutate: F) -> SessionResult<Session>
    where
        F: FnOnce(&mut Session),
    {
        let handle = self
            .handle(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let mut session = handle.lock().await;
        mutate(&mut session);
        self.persist_logged(&session).await;
        Ok(session.clone())
    }

    /// Overwrite the session's metadata snapshot
    pub async fn persist(&self, session: &Session) -> SessionResult<()> {
        let path = metadata_path(session);
        let contents = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| SessionError::io(&path, e))?;
        debug!("Persisted metadata for {}", session.session_id);
        Ok(())
    }

    async fn persist_logged(&self, session: &Session) {
        if let Err(e) = self.persist(session).await {
            error!(
                "Failed to persist metadata for {}: {}",
                session.session_id, e
            );
        }
    }
}

pub fn metadata_path(session: &Session) -> PathBuf {
    session.session_folder.join(METADATA_FILENAME)
}
