use anyhow::Result;
use tokio::sync::mpsc;

use crate::config::CaptureConfig;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for an audio source
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Target sample rate (the source downsamples if the device runs faster)
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    /// Samples per delivered block
    pub block_size: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz for speech engines
            channels: 1,        // Mono
            block_size: 4096,
        }
    }
}

impl From<&CaptureConfig> for SourceConfig {
    fn from(capture: &CaptureConfig) -> Self {
        Self {
            sample_rate: capture.sample_rate,
            channels: capture.channels,
            block_size: capture.block_size,
        }
    }
}

/// Audio capture source
///
/// Delivers fixed-size blocks of samples over a channel from the moment
/// `start` returns until `stop` is called or the device goes away.
#[async_trait::async_trait]
pub trait AudioSource: Send {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio; idempotent and safe to call more than once
    async fn stop(&mut self) -> Result<()>;

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Opens audio sources for the recording worker.
pub trait SourceFactory: Send + Sync {
    fn open(&self, config: SourceConfig) -> Result<Box<dyn AudioSource>>;
}
