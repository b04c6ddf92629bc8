//! Walk the full queue flow against an in-process engine.
//!
//! A scripted engine stands in for a real speech-to-text backend and a
//! generated tone stands in for the microphone, so this runs anywhere.
//!
//! Run with: cargo run --example scripted_session

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use hark::{
    AudioFrame, AudioSource, CaptureConfig, ChannelSession, EngineFactory, EngineOptions,
    EngineSession, RecordingQueue, RecordingRequest, SourceConfig, SourceFactory,
};

/// Feeds a fixed script of segments, one every half second.
struct ScriptedEngines;

#[async_trait]
impl EngineFactory for ScriptedEngines {
    async fn open(&self, options: EngineOptions) -> Result<Box<dyn EngineSession>> {
        println!(
            "(engine opened: model={}, language={})",
            options.model, options.language
        );
        let (tx, session) = ChannelSession::pair(16);
        tokio::spawn(async move {
            for segment in ["this is a scripted", "this is a scripted engine", "goodbye"] {
                tokio::time::sleep(Duration::from_millis(500)).await;
                if tx.send(segment.to_string()).await.is_err() {
                    break;
                }
            }
            // Dropping the sender ends the stream.
        });
        Ok(Box::new(session))
    }
}

/// Emits blocks of a 440Hz tone until stopped.
struct ToneSources;

impl SourceFactory for ToneSources {
    fn open(&self, config: SourceConfig) -> Result<Box<dyn AudioSource>> {
        Ok(Box::new(ToneSource {
            config,
            stop: None,
        }))
    }
}

struct ToneSource {
    config: SourceConfig,
    stop: Option<oneshot::Sender<()>>,
}

#[async_trait]
impl AudioSource for ToneSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(100);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        self.stop = Some(stop_tx);

        let config = self.config.clone();
        tokio::spawn(async move {
            let block = config.block_size as usize;
            let mut t = 0usize;
            let mut elapsed_ms = 0u64;
            loop {
                let samples: Vec<i16> = (0..block)
                    .map(|i| {
                        let phase = (t + i) as f32 * 440.0 / config.sample_rate as f32;
                        ((phase * std::f32::consts::TAU).sin() * 8000.0) as i16
                    })
                    .collect();
                t += block;

                let frame = AudioFrame {
                    samples,
                    sample_rate: config.sample_rate,
                    channels: config.channels,
                    timestamp_ms: elapsed_ms,
                };
                elapsed_ms += (block as u64 * 1000) / config.sample_rate as u64;

                tokio::select! {
                    _ = &mut stop_rx => break,
                    sent = tx.send(frame) => {
                        if sent.is_err() {
                            break;
                        }
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stop.is_some()
    }

    fn name(&self) -> &str {
        "tone"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let queue = RecordingQueue::new(Arc::new(ScriptedEngines), Arc::new(ToneSources));
    queue.start();

    let request = RecordingRequest::new(CaptureConfig::default(), "en")
        .on_status(|status| println!("status: {:?}", status))
        .on_text_chunk(|text| println!("chunk:  {}", text));

    let task_id = queue.submit(request);
    println!("Submitted task {}", task_id);

    // Let it collect for a while, then stop mid-stream.
    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("Stopping: {}", queue.stop(&task_id));

    match queue.get_result(&task_id, Some(Duration::from_secs(30))).await {
        Some(result) => println!(
            "\nsuccess={} transcript={:?} ({:.1}s)",
            result.success, result.transcript, result.elapsed_seconds
        ),
        None => println!("No result within the deadline"),
    }

    queue.shutdown().await;
    Ok(())
}
