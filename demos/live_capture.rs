//! Record a few seconds from the default microphone to a WAV file.
//!
//! Run with: cargo run --example live_capture

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use hark::{MicrophoneSource, SourceConfig, WavTape};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let source = Box::new(MicrophoneSource::new(SourceConfig::default()));
    let mut tape = WavTape::start(source, Path::new("recordings")).await?;

    println!("Recording 5 seconds to {} ...", tape.path().display());
    tokio::time::sleep(Duration::from_secs(5)).await;

    tape.stop().await;
    println!("Done.");

    Ok(())
}
