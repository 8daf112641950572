//! Fire-and-forget fan-out to connected observers
//!
//! Delivery is at-most-once: an observer whose send fails simply misses the
//! event. Closed observers are dropped from the set.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::SessionEvent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObserverError {
    #[error("observer connection closed")]
    Closed,
    #[error("observer queue full")]
    Full,
}

/// Something that can receive serialized events
#[async_trait]
pub trait Observer: Send + Sync {
    async fn send_text(&self, text: Arc<str>) -> Result<(), ObserverError>;
}

/// Observer backed by a bounded queue drained by a connection task
pub struct ChannelObserver {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Observer for ChannelObserver {
    async fn send_text(&self, text: Arc<str>) -> Result<(), ObserverError> {
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ObserverError::Full,
            mpsc::error::TrySendError::Closed(_) => ObserverError::Closed,
        })
    }
}

/// Set of currently connected observers
#[derive(Default)]
pub struct EventBroadcaster {
    observers: RwLock<HashMap<Uuid, Arc<dyn Observer>>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, observer: Arc<dyn Observer>) -> Uuid {
        let id = Uuid::new_v4();
        self.observers.write().await.insert(id, observer);
        debug!("Observer {} subscribed", id);
        id
    }

    pub async fn unsubscribe(&self, id: Uuid) {
        if self.observers.write().await.remove(&id).is_some() {
            debug!("Observer {} unsubscribed", id);
        }
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Serialize `event` once and send it to every observer concurrently.
    /// Never fails; per-observer errors are only logged.
    pub async fn broadcast(&self, event: &SessionEvent) {
        let text: Arc<str> = match serde_json::to_string(event) {
            Ok(text) => text.into(),
            Err(e) => {
                error!("Failed to serialize event: {}", e);
                return;
            }
        };

        let targets: Vec<(Uuid, Arc<dyn Observer>)> = self
            .observers
            .read()
            .await
            .iter()
            .map(|(id, observer)| (*id, observer.clone()))
            .collect();

        if targets.is_empty() {
            return;
        }

        let results = join_all(targets.iter().map(|(id, observer)| {
            let text = text.clone();
            async move { (*id, observer.send_text(text).await) }
        }))
        .await;

        let mut closed = Vec::new();
        let mut failed = 0usize;
        for (id, result) in results {
            if let Err(e) = result {
                failed += 1;
                debug!("Observer {} missed event: {}", id, e);
                if e == ObserverError::Closed {
                    closed.push(id);
                }
            }
        }

        if failed > 0 {
            warn!(
                "Broadcast delivered to {}/{} observers",
                targets.len() - failed,
                targets.len()
            );
        }

        if !closed.is_empty() {
            let mut observers = self.observers.write().await;
            for id in closed {
                observers.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        received: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Observer for RecordingObserver {
        async fn send_text(&self, text: Arc<str>) -> Result<(), ObserverError> {
            self.received.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct BrokenObserver;

    #[async_trait]
    impl Observer for BrokenObserver {
        async fn send_text(&self, _text: Arc<str>) -> Result<(), ObserverError> {
            Err(ObserverError::Closed)
        }
    }

    fn stopped_event() -> SessionEvent {
        SessionEvent::RecordingStopped {
            session_id: "S1_baseline_1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_one_failing_observer_does_not_block_others() {
        let broadcaster = EventBroadcaster::new();
        let a = Arc::new(RecordingObserver::default());
        let b = Arc::new(RecordingObserver::default());
        broadcaster.subscribe(a.clone()).await;
        broadcaster.subscribe(Arc::new(BrokenObserver)).await;
        broadcaster.subscribe(b.clone()).await;

        broadcaster.broadcast(&stopped_event()).await;

        let expected = r#"{"type":"recording_stopped","session_id":"S1_baseline_1"}"#;
        assert_eq!(a.received.lock().unwrap().as_slice(), [expected]);
        assert_eq!(b.received.lock().unwrap().as_slice(), [expected]);
        // The closed observer is pruned
        assert_eq!(broadcaster.observer_count().await, 2);
    }

    #[tokio::test]
    async fn test_unsubscribed_observer_receives_nothing() {
        let broadcaster = EventBroadcaster::new();
        let a = Arc::new(RecordingObserver::default());
        let id = broadcaster.subscribe(a.clone()).await;
        broadcaster.unsubscribe(id).await;

        broadcaster.broadcast(&stopped_event()).await;
        assert!(a.received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_channel_observer_reports_full_and_closed() {
        let (tx, rx) = mpsc::channel(1);
        let observer = ChannelObserver::new(tx);

        observer.send_text("one".into()).await.unwrap();
        assert_eq!(observer.send_text("two".into()).await, Err(ObserverError::Full));

        drop(rx);
        assert_eq!(observer.send_text("three".into()).await, Err(ObserverError::Closed));
    }

    #[tokio::test]
    async fn test_broadcast_without_observers() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.broadcast(&stopped_event()).await;
        assert_eq!(broadcaster.observer_count().await, 0);
    }
}
