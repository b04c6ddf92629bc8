//! Capture session management
//!
//! This module provides the `CaptureSession` abstraction that manages:
//! - Parallel raw-audio capture to a scratch WAV file
//! - One transcription engine session per recording
//! - Bridging engine segments into the de-duplicating accumulator
//! - The staged, bounded shutdown once a stop is signalled

mod capture;
mod transcript;

pub use capture::{CaptureSession, SessionTiming};
pub use transcript::TranscriptAccumulator;
