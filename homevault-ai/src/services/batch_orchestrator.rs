//! Batch orchestrator
//!
//! Drives one upload batch through `IDLE → RUNNING → COMPLETED | FAILED`.
//!
//! # Per-file pipeline
//! analysis → save (with dedup) → image upload → attach image URL
//!
//! A failing stage becomes that file's error and the batch moves on. Files are
//! processed with bounded concurrency and always recorded in submission order.
//! Only an error escaping the per-file boundary (a panic in the worker, or the
//! batch record failing to persist) fails the whole batch; the supervising task
//! catches both.

use futures::stream::{self, StreamExt};
use homevault_common::events::{EventBus, VaultEvent};
use homevault_common::time::now;
use homevault_common::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::batches;
use crate::models::{BatchSession, BatchState, BatchSummary, FileOutcome};
use crate::services::asset_persistence::{content_key, AssetStore};
use crate::services::batch_registry::{BatchHandle, BatchRegistry};
use crate::services::image_intake::IntakeFile;
use crate::services::vision_client::VisionClient;

#[derive(Clone)]
pub struct BatchOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    vision: VisionClient,
    assets: AssetStore,
    registry: BatchRegistry,
    max_concurrency: usize,
    /// Grace period before a finished batch's handle is evicted
    retention: Duration,
    max_lock_wait_ms: u64,
}

impl BatchOrchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        vision: VisionClient,
        assets: AssetStore,
        registry: BatchRegistry,
        max_concurrency: usize,
        retention: Duration,
        max_lock_wait_ms: u64,
    ) -> Self {
        Self {
            db,
            event_bus,
            vision,
            assets,
            registry,
            max_concurrency: max_concurrency.max(1),
            retention,
            max_lock_wait_ms,
        }
    }

    pub fn registry(&self) -> &BatchRegistry {
        &self.registry
    }

    /// Accept a batch and start processing it in the background
    ///
    /// Returns the RUNNING session; processing continues after the caller
    /// goes away (there is no cancellation).
    pub async fn start(&self, user_id: &str, files: Vec<IntakeFile>) -> Result<BatchSession> {
        if files.is_empty() {
            return Err(Error::InvalidInput("No files to process".to_string()));
        }

        let mut session = BatchSession::new(user_id, files.len());
        session.transition_to(BatchState::Running);
        batches::save_batch(&self.db, &session, self.max_lock_wait_ms).await?;

        let handle = self.registry.register(session.clone()).await;

        info!(
            batch_id = %session.batch_id,
            user_id,
            total_files = session.total_files,
            max_concurrency = self.max_concurrency,
            "Batch started"
        );

        self.event_bus.emit_lossy(VaultEvent::BatchStarted {
            batch_id: session.batch_id,
            user_id: session.user_id.clone(),
            total_files: session.total_files,
            timestamp: now(),
        });

        let orchestrator = self.clone();
        let worker_session = session.clone();
        tokio::spawn(async move {
            orchestrator.supervise(handle, worker_session, files).await;
        });

        Ok(session)
    }

    /// Run the batch in its own task and catch anything escaping it, then
    /// keep the finished handle around for late observers until `retention`
    async fn supervise(
        self,
        handle: Arc<BatchHandle>,
        session: BatchSession,
        files: Vec<IntakeFile>,
    ) {
        let batch_id = session.batch_id;

        let worker = {
            let orchestrator = self.clone();
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { orchestrator.run(&handle, session, files).await })
        };

        let failure = match worker.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(join_error) if join_error.is_panic() => Some("Batch worker panicked".to_string()),
            Err(join_error) => Some(join_error.to_string()),
        };

        if let Some(failure) = failure {
            error!(batch_id = %batch_id, error = %failure, "Batch failed");
            self.mark_failed(&handle, failure).await;
        }
        tokio::time::sleep(self.retention).await;
        if self.registry.remove(batch_id).await.is_some() {
            debug!(batch_id = %batch_id, "Finished batch handle evicted");
        }
    }

    async fn run(
        &self,
        handle: &BatchHandle,
        mut session: BatchSession,
        files: Vec<IntakeFile>,
    ) -> Result<()> {
        let user_id = session.user_id.clone();

        let mut outcomes = stream::iter(files)
            .map(|file| {
                let user_id = user_id.clone();
                async move { self.process_file(&user_id, file).await }
            })
            .buffered(self.max_concurrency);

        while let Some(outcome) = outcomes.next().await {
            let file_name = outcome.file.name.clone();
            session.record(outcome);
            batches::save_batch(&self.db, &session, self.max_lock_wait_ms).await?;

            handle.publish_progress(&session).await;
            self.event_bus.emit_lossy(VaultEvent::BatchProgress {
                batch_id: session.batch_id,
                user_id: session.user_id.clone(),
                files_completed: session.files_completed,
                total_files: session.total_files,
                percentage: session.percentage(),
                current_file: Some(file_name),
                timestamp: now(),
            });
        }

        session.transition_to(BatchState::Completed);
        batches::save_batch(&self.db, &session, self.max_lock_wait_ms).await?;
        handle.publish_finished(&session).await;

        info!(
            batch_id = %session.batch_id,
            successful = session.successful(),
            failed = session.failed(),
            duration_seconds = session.elapsed_seconds(),
            "Batch completed"
        );

        self.event_bus.emit_lossy(VaultEvent::BatchCompleted {
            batch_id: session.batch_id,
            user_id: session.user_id.clone(),
            successful: session.successful(),
            failed: session.failed(),
            duration_seconds: session.elapsed_seconds(),
            timestamp: now(),
        });

        Ok(())
    }

    /// One file through the pipeline; never fails, errors land in the outcome
    async fn process_file(&self, user_id: &str, file: IntakeFile) -> FileOutcome {
        let mut outcome = FileOutcome::new(file.meta());

        let analysis = match self.vision.analyze(&file).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(user_id, file = %file.name, "Image analysis failed: {}", e);
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };
        outcome.analysis = Some(analysis.clone());

        let key = content_key(user_id, &file.bytes);
        let saved = match self.assets.save(user_id, &analysis, Some(key)).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(user_id, file = %file.name, "Asset save failed: {}", e);
                outcome.error = Some(format!("Failed to save asset: {}", e));
                return outcome;
            }
        };
        outcome.asset_id = Some(saved.asset_id);

        if saved.duplicate {
            debug!(
                user_id,
                file = %file.name,
                asset_id = %saved.asset_id,
                "Duplicate, skipping upload"
            );
            outcome.duplicate = true;
            return outcome;
        }

        let content_type = file.effective_mime();
        let stored = match self
            .assets
            .upload_image(user_id, saved.asset_id, file.bytes.to_vec(), &content_type)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                warn!(user_id, asset_id = %saved.asset_id, "Image upload failed: {}", e);
                outcome.error = Some(format!("Failed to upload image: {}", e));
                return outcome;
            }
        };

        match self.assets.attach_image(user_id, saved.asset_id, &stored).await {
            Ok(asset) => outcome.image_url = Some(asset.image_url),
            Err(e) => {
                warn!(user_id, asset_id = %saved.asset_id, "Attaching image failed: {}", e);
                outcome.error = Some(format!("Failed to attach image: {}", e));
            }
        }

        outcome
    }

    async fn mark_failed(&self, handle: &BatchHandle, message: String) {
        let mut session = handle.snapshot().await;
        session.fail(message.clone());

        if let Err(e) = batches::save_batch(&self.db, &session, self.max_lock_wait_ms).await {
            error!(batch_id = %session.batch_id, "Failed to persist FAILED state: {}", e);
        }
        handle.publish_finished(&session).await;

        self.event_bus.emit_lossy(VaultEvent::BatchFailed {
            batch_id: session.batch_id,
            user_id: session.user_id.clone(),
            error_message: message,
            files_completed: session.files_completed,
            timestamp: now(),
        });
    }

    /// Live snapshot if the batch is still registered, else the persisted one
    pub async fn status(&self, batch_id: Uuid) -> Result<Option<BatchSession>> {
        if let Some(handle) = self.registry.get(batch_id).await {
            return Ok(Some(handle.snapshot().await));
        }
        batches::load_batch(&self.db, batch_id).await
    }

    /// Compact summary; evicts the in-memory handle once the batch is terminal
    pub async fn take_summary(&self, batch_id: Uuid) -> Result<Option<BatchSummary>> {
        let Some(session) = self.status(batch_id).await? else {
            return Ok(None);
        };

        if session.is_terminal() && self.registry.remove(batch_id).await.is_some() {
            debug!(batch_id = %batch_id, "Batch handle evicted after summary read");
        }
        Ok(Some(session.summary()))
    }

    /// Most recent non-terminal batch of a user
    pub async fn active_for_user(&self, user_id: &str) -> Result<Option<BatchSession>> {
        if let Some(session) = self.registry.active_for_user(user_id).await {
            return Ok(Some(session));
        }
        batches::get_active_batch(&self.db, user_id).await
    }
}
