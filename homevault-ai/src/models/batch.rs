//! Batch processing state machine
//!
//! A batch progresses IDLE → RUNNING → COMPLETED | FAILED. Per-file failures
//! never fail the batch; only errors escaping the per-file boundary do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ItemAnalysis;

/// Batch lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchState {
    /// Created, no file processed yet
    Idle,
    /// Working through the file list
    Running,
    /// Every file attempted
    Completed,
    /// Aborted by an error outside per-file handling
    Failed,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Idle => "IDLE",
            BatchState::Running => "RUNNING",
            BatchState::Completed => "COMPLETED",
            BatchState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(BatchState::Idle),
            "RUNNING" => Some(BatchState::Running),
            "COMPLETED" => Some(BatchState::Completed),
            "FAILED" => Some(BatchState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Failed)
    }
}

/// Metadata of one submitted file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub size: usize,
    pub content_type: String,
}

/// Outcome of processing one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file: FileMeta,
    /// Analysis payload, kept even when a later stage failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ItemAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Asset created (or matched, when `duplicate`) for this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub duplicate: bool,
}

impl FileOutcome {
    pub fn new(file: FileMeta) -> Self {
        Self {
            file,
            analysis: None,
            error: None,
            asset_id: None,
            image_url: None,
            duplicate: false,
        }
    }

    pub fn failed(file: FileMeta, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(file)
        }
    }

    /// No error and an asset id
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.asset_id.is_some()
    }
}

/// Batch session (persisted after every file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSession {
    pub batch_id: Uuid,
    pub user_id: String,
    pub state: BatchState,
    pub total_files: usize,
    pub files_completed: usize,
    /// Outcomes in submission order
    pub results: Vec<FileOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl BatchSession {
    pub fn new(user_id: impl Into<String>, total_files: usize) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            user_id: user_id.into(),
            state: BatchState::Idle,
            total_files,
            files_completed: 0,
            results: Vec::with_capacity(total_files),
            error_message: None,
            started_at: homevault_common::time::now(),
            ended_at: None,
        }
    }

    /// Transition to new state, stamping the end time on terminal states
    pub fn transition_to(&mut self, new_state: BatchState) {
        self.state = new_state;
        if new_state.is_terminal() {
            self.ended_at = Some(homevault_common::time::now());
        }
    }

    /// Mark failed with an error escaping per-file handling
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
        self.transition_to(BatchState::Failed);
    }

    /// Record the next outcome (submission order)
    pub fn record(&mut self, outcome: FileOutcome) {
        self.results.push(outcome);
        self.files_completed = self.results.len();
    }

    pub fn percentage(&self) -> f32 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.files_completed as f32 / self.total_files as f32) * 100.0
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0) as u64
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_id: self.batch_id,
            state: self.state,
            total_processed: self.files_completed,
            successful: self.successful(),
            failed: self.failed(),
            assets: self
                .results
                .iter()
                .map(|r| SummaryEntry {
                    name: r.file.name.clone(),
                    success: r.is_success(),
                    asset_id: r.asset_id,
                    duplicate: r.duplicate,
                    error: r.error.clone(),
                })
                .collect(),
        }
    }
}

/// Compact batch report for the completion page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub state: BatchState,
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub assets: Vec<SummaryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<Uuid>,
    #[serde(default)]
    pub duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str) -> FileMeta {
        FileMeta {
            name: name.to_string(),
            size: 1024,
            content_type: "image/jpeg".to_string(),
        }
    }

    #[test]
    fn test_new_batch_is_idle() {
        let session = BatchSession::new("user-1", 3);
        assert_eq!(session.state, BatchState::Idle);
        assert_eq!(session.files_completed, 0);
        assert!(!session.is_terminal());
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn test_terminal_transition_sets_end_time() {
        let mut session = BatchSession::new("user-1", 1);
        session.transition_to(BatchState::Running);
        assert!(session.ended_at.is_none());

        session.transition_to(BatchState::Completed);
        assert!(session.is_terminal());
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn test_summary_counts() {
        let mut session = BatchSession::new("user-1", 3);
        session.transition_to(BatchState::Running);

        let mut ok = FileOutcome::new(meta("a.jpg"));
        ok.asset_id = Some(Uuid::new_v4());
        session.record(ok);
        session.record(FileOutcome::failed(meta("b.jpg"), "analysis failed"));
        // Analysis succeeded but persistence did not
        let mut partial = FileOutcome::failed(meta("c.jpg"), "store unavailable");
        partial.analysis = Some(ItemAnalysis::default());
        session.record(partial);

        assert_eq!(session.files_completed, 3);
        assert_eq!(session.percentage(), 100.0);

        let summary = session.summary();
        assert_eq!(summary.total_processed, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.assets[1].name, "b.jpg");
        assert!(!summary.assets[1].success);
    }

    #[test]
    fn test_state_string_roundtrip() {
        for state in [
            BatchState::Idle,
            BatchState::Running,
            BatchState::Completed,
            BatchState::Failed,
        ] {
            assert_eq!(BatchState::parse(state.as_str()), Some(state));
            assert_eq!(
                serde_json::to_string(&state).unwrap(),
                format!("\"{}\"", state.as_str())
            );
        }
        assert_eq!(BatchState::parse("PAUSED"), None);
    }
}
