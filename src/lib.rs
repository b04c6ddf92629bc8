pub mod audio;
pub mod config;
pub mod engine;
pub mod queue;
pub mod session;

pub use audio::{
    AudioFrame, AudioSource, MicrophoneFactory, MicrophoneSource, SourceConfig, SourceFactory,
    WavTape,
};
pub use config::{CaptureConfig, Config, EngineCommand};
pub use engine::{
    ChannelSession, EngineFactory, EngineOptions, EngineSession, ProcessEngineFactory,
};
pub use queue::{
    QueueOptions, RecordingQueue, RecordingRequest, RecordingResult, RecordingStatus,
    RecordingTask, StopToken,
};
pub use session::{CaptureSession, SessionTiming, TranscriptAccumulator};
