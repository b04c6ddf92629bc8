use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration, loaded from a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default speech recognition language code (e.g. "en", "pt")
    pub language: String,

    pub capture: CaptureConfig,

    pub engine: EngineCommand,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            capture: CaptureConfig::default(),
            engine: EngineCommand::default(),
        }
    }
}

/// Capture settings handed to each recording task.
///
/// The engine tuning fields are passed through to the transcription engine
/// untouched; this crate does not interpret them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sample rate for raw capture (speech engines expect 16kHz)
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono)
    pub channels: u16,

    /// Samples per block delivered by the audio source
    pub block_size: u32,

    /// Engine model size (e.g. "base", "small", "medium")
    pub model: String,

    /// Voice-activity sensitivity, lower is more sensitive
    pub sensitivity: u32,

    /// Silence after speech before the engine finalizes a segment, in seconds
    pub post_speech_silence_secs: f64,

    /// Minimum gap between recordings, in seconds
    pub min_gap_secs: f64,

    /// Minimum length of a recording, in seconds
    pub min_recording_secs: f64,

    /// Audio kept from before voice activity triggers, in seconds
    pub pre_capture_buffer_secs: f64,

    /// Directory for the per-session scratch recording
    pub scratch_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            block_size: 4096,
            model: "base".to_string(),
            sensitivity: 1,
            post_speech_silence_secs: 1.0,
            min_gap_secs: 0.2,
            min_recording_secs: 0.3,
            pre_capture_buffer_secs: 0.3,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// External speech-to-text command launched per session.
///
/// `{model}` and `{language}` placeholders in the arguments are substituted
/// when the engine session is opened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
