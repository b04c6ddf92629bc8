//! Recording task queue
//!
//! This module provides the queue a caller interacts with:
//! - Task submission, FIFO dispatch onto a single background worker
//! - Stop signalling for the in-flight recording
//! - Result publication and bounded retrieval
//!
//! A stop request for a task that has not started yet is lost; no token
//! exists before the worker picks the task up. This matches the queue's
//! documented contract rather than being an oversight.

mod stop;
pub(crate) mod task;
mod worker;

pub use stop::StopToken;
pub use task::{
    RecordingRequest, RecordingResult, RecordingStatus, RecordingTask, StatusCallback,
    TextCallback,
};
pub use worker::{QueueOptions, RecordingQueue};
