pub mod microphone;
pub mod sink;
pub mod source;

pub use microphone::{MicrophoneFactory, MicrophoneSource};
pub use sink::WavTape;
pub use source::{AudioFrame, AudioSource, SourceConfig, SourceFactory};
