use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

use crate::config::CaptureConfig;

/// Callback invoked on status transitions.
pub type StatusCallback = Arc<dyn Fn(RecordingStatus) + Send + Sync>;

/// Callback invoked once per accepted transcript fragment.
pub type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Status of a recording task.
///
/// Transitions are monotonic: `Pending → Initializing → Recording →
/// Processing → {Completed | Failed}`, with `Failed` reachable from any
/// non-terminal state. `Pending` is the implicit initial state and is never
/// delivered through a status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    Pending,
    Initializing,
    Recording,
    Processing,
    Completed,
    Failed,
}

impl RecordingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// What a caller hands to [`RecordingQueue::submit`](crate::RecordingQueue::submit).
#[derive(Clone)]
pub struct RecordingRequest {
    pub language: String,
    pub capture: CaptureConfig,
    pub on_status: Option<StatusCallback>,
    pub on_text_chunk: Option<TextCallback>,
}

impl RecordingRequest {
    pub fn new(capture: CaptureConfig, language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            capture,
            on_status: None,
            on_text_chunk: None,
        }
    }

    pub fn on_status(mut self, callback: impl Fn(RecordingStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Arc::new(callback));
        self
    }

    pub fn on_text_chunk(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_text_chunk = Some(Arc::new(callback));
        self
    }
}

/// One enqueued recording; immutable from submission until the worker
/// drops it after publishing the result.
#[derive(Clone)]
pub struct RecordingTask {
    pub task_id: String,
    pub language: String,
    pub capture: CaptureConfig,
    pub on_status: Option<StatusCallback>,
    pub on_text_chunk: Option<TextCallback>,
    pub created_at: DateTime<Utc>,
}

impl RecordingTask {
    pub(crate) fn from_request(task_id: String, request: RecordingRequest) -> Self {
        Self {
            task_id,
            language: request.language,
            capture: request.capture,
            on_status: request.on_status,
            on_text_chunk: request.on_text_chunk,
            created_at: Utc::now(),
        }
    }

    /// Deliver a status transition; callback failures are contained.
    pub(crate) fn notify_status(&self, status: RecordingStatus) {
        if let Some(callback) = &self.on_status {
            if catch_unwind(AssertUnwindSafe(|| callback(status))).is_err() {
                warn!("Status callback panicked for task {}", self.task_id);
            }
        }
    }
}

impl fmt::Debug for RecordingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingTask")
            .field("task_id", &self.task_id)
            .field("language", &self.language)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Deliver a transcript fragment to a text callback; failures are contained.
pub(crate) fn emit_text_chunk(callback: &TextCallback, text: &str) {
    if catch_unwind(AssertUnwindSafe(|| callback(text))).is_err() {
        warn!("Text chunk callback panicked");
    }
}

/// Outcome of one recording task, produced exactly once by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingResult {
    pub task_id: String,
    pub success: bool,
    /// Finalized transcript; empty is valid and distinct from failure
    pub transcript: String,
    /// Human-readable error, empty unless the task failed
    pub error: String,
    pub elapsed_seconds: f64,
}

impl RecordingResult {
    pub(crate) fn completed(task_id: &str, transcript: String, elapsed_seconds: f64) -> Self {
        Self {
            task_id: task_id.to_string(),
            success: true,
            transcript,
            error: String::new(),
            elapsed_seconds,
        }
    }

    pub(crate) fn failed(task_id: &str, error: String, elapsed_seconds: f64) -> Self {
        Self {
            task_id: task_id.to_string(),
            success: false,
            transcript: String::new(),
            error,
            elapsed_seconds,
        }
    }
}
