//! Per-batch progress channels
//!
//! Each running batch owns a [`BatchHandle`]: the latest session snapshot
//! plus a broadcast channel of updates. Handles are registered by batch id,
//! so observers of concurrent batches never share state.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::models::{BatchSession, BatchSummary, FileOutcome};

/// Buffered updates per batch before slow observers start lagging
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Update published on a batch's own channel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BatchUpdate {
    /// One more file finished; `results` holds every outcome so far, in submission order
    Progress {
        batch_id: Uuid,
        files_completed: usize,
        total_files: usize,
        percentage: f32,
        results: Vec<FileOutcome>,
    },

    /// Batch reached a terminal state
    Finished { summary: BatchSummary },
}

impl BatchUpdate {
    pub fn event_type(&self) -> &'static str {
        match self {
            BatchUpdate::Progress { .. } => "Progress",
            BatchUpdate::Finished { .. } => "Finished",
        }
    }

    fn progress(session: &BatchSession) -> Self {
        BatchUpdate::Progress {
            batch_id: session.batch_id,
            files_completed: session.files_completed,
            total_files: session.total_files,
            percentage: session.percentage(),
            results: session.results.clone(),
        }
    }
}

/// Live state of one batch
pub struct BatchHandle {
    snapshot: RwLock<BatchSession>,
    tx: broadcast::Sender<BatchUpdate>,
}

impl BatchHandle {
    fn new(session: BatchSession) -> Self {
        let (tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            snapshot: RwLock::new(session),
            tx,
        }
    }

    pub async fn snapshot(&self) -> BatchSession {
        self.snapshot.read().await.clone()
    }

    /// Current snapshot plus a receiver for every later update
    ///
    /// Taken under the snapshot lock, so no update falls between the two.
    pub async fn subscribe(&self) -> (BatchSession, broadcast::Receiver<BatchUpdate>) {
        let snapshot = self.snapshot.read().await;
        (snapshot.clone(), self.tx.subscribe())
    }

    /// Replace the snapshot and publish a `Progress` update
    pub async fn publish_progress(&self, session: &BatchSession) {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = session.clone();
        let _ = self.tx.send(BatchUpdate::progress(session));
    }

    /// Replace the snapshot and publish `Finished`
    pub async fn publish_finished(&self, session: &BatchSession) {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = session.clone();
        let _ = self.tx.send(BatchUpdate::Finished {
            summary: session.summary(),
        });
    }
}

/// Live batches by id
#[derive(Clone, Default)]
pub struct BatchRegistry {
    handles: Arc<RwLock<HashMap<Uuid, Arc<BatchHandle>>>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, session: BatchSession) -> Arc<BatchHandle> {
        let handle = Arc::new(BatchHandle::new(session.clone()));
        self.handles
            .write()
            .await
            .insert(session.batch_id, Arc::clone(&handle));
        handle
    }

    pub async fn get(&self, batch_id: Uuid) -> Option<Arc<BatchHandle>> {
        self.handles.read().await.get(&batch_id).cloned()
    }

    pub async fn remove(&self, batch_id: Uuid) -> Option<Arc<BatchHandle>> {
        self.handles.write().await.remove(&batch_id)
    }

    /// Most recent non-terminal batch of a user
    pub async fn active_for_user(&self, user_id: &str) -> Option<BatchSession> {
        let handles: Vec<Arc<BatchHandle>> = self.handles.read().await.values().cloned().collect();

        let mut active = Vec::new();
        for handle in handles {
            let session = handle.snapshot().await;
            if session.user_id == user_id && !session.is_terminal() {
                active.push(session);
            }
        }
        active.into_iter().max_by_key(|s| s.started_at)
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }
}
