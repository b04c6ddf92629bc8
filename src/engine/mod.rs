//! Transcription engine seam
//!
//! The capture session treats the speech-to-text engine as an opaque,
//! stateful session: once opened it repeatedly yields finalized text
//! segments on demand, and it must be torn down on every exit path.
//! Two adapters are provided:
//! - `ProcessEngineFactory`: an external STT command emitting one segment
//!   per stdout line
//! - `ChannelSession`: an in-process channel, used for wiring and tests

mod channel;
mod process;

pub use channel::ChannelSession;
pub use process::ProcessEngineFactory;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::CaptureConfig;

/// Settings handed to the engine when a session is opened.
///
/// These mirror the tuning fields of [`CaptureConfig`]; the queue and the
/// session pass them through without interpreting them.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub model: String,
    pub language: String,
    pub sensitivity: u32,
    pub post_speech_silence_secs: f64,
    pub min_gap_secs: f64,
    pub min_recording_secs: f64,
    pub pre_capture_buffer_secs: f64,
}

impl EngineOptions {
    pub fn from_capture(capture: &CaptureConfig, language: &str) -> Self {
        Self {
            model: capture.model.clone(),
            language: language.to_string(),
            sensitivity: capture.sensitivity,
            post_speech_silence_secs: capture.post_speech_silence_secs,
            min_gap_secs: capture.min_gap_secs,
            min_recording_secs: capture.min_recording_secs,
            pre_capture_buffer_secs: capture.pre_capture_buffer_secs,
        }
    }
}

/// One open transcription session.
#[async_trait]
pub trait EngineSession: Send {
    /// Wait for the next finalized text segment.
    ///
    /// Blocks until the engine has a segment ready; `Ok(None)` means the
    /// session has ended and no further segments will arrive.
    async fn next_segment(&mut self) -> Result<Option<String>>;

    /// Tear the session down.
    ///
    /// Called exactly once on every exit path, including after errors.
    async fn close(&mut self) -> Result<()>;
}

/// Opens engine sessions for the recording worker.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Open a new session.
    ///
    /// This may be slow (engines typically load a model here); audio
    /// capture is already running while it happens.
    async fn open(&self, options: EngineOptions) -> Result<Box<dyn EngineSession>>;
}
