use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::source::{AudioFrame, AudioSource, SourceConfig, SourceFactory};

/// Opens the default input device as an [`AudioSource`].
pub struct MicrophoneFactory;

impl SourceFactory for MicrophoneFactory {
    fn open(&self, config: SourceConfig) -> Result<Box<dyn AudioSource>> {
        Ok(Box::new(MicrophoneSource::new(config)))
    }
}

/// Microphone capture via cpal.
///
/// Device output is normalized to 16-bit PCM at the requested channel
/// count, downsampled by decimation when the device runs at an integer
/// multiple of the target rate, and delivered in fixed-size blocks.
pub struct MicrophoneSource {
    config: SourceConfig,
    stream: Option<StreamHolder>,
}

struct StreamHolder(cpal::Stream);

// SAFETY: the stream is created, paused and dropped only by the task that
// owns this source; it is moved between threads but never shared.
unsafe impl Send for StreamHolder {}

impl MicrophoneSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioSource for MicrophoneSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.stream.is_some() {
            anyhow::bail!("Microphone capture already started");
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("No default input device available")?;
        let supported = device
            .default_input_config()
            .context("Failed to query default input config")?;

        let device_rate = supported.sample_rate().0;
        let device_channels = supported.channels();
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();

        info!(
            "Opening microphone: {} ({}Hz, {} channels, {:?})",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            device_rate,
            device_channels,
            sample_format
        );

        let (tx, rx) = mpsc::channel(100);
        let mut blocks =
            BlockAssembler::new(tx, self.config.clone(), device_rate, device_channels);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let pcm: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    blocks.push(&pcm);
                },
                log_stream_error,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    blocks.push(data);
                },
                log_stream_error,
                None,
            )?,
            cpal::SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let pcm: Vec<i16> = data.iter().map(|&s| (s as i32 - 0x8000) as i16).collect();
                    blocks.push(&pcm);
                },
                log_stream_error,
                None,
            )?,
            other => anyhow::bail!("Unsupported input sample format: {:?}", other),
        };

        stream.play().context("Failed to start input stream")?;
        self.stream = Some(StreamHolder(stream));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(holder) = self.stream.take() {
            // Pause first so the callback stops firing before the stream
            // (and the sender captured in it) is dropped.
            if let Err(e) = holder.0.pause() {
                warn!("Failed to pause input stream: {}", e);
            }
            drop(holder);
            info!("Microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

fn log_stream_error(err: cpal::StreamError) {
    error!("Audio stream error: {}", err);
}

/// Accumulates device callbacks into fixed-size frames.
struct BlockAssembler {
    tx: mpsc::Sender<AudioFrame>,
    started: Instant,
    pending: Vec<i16>,
    config: SourceConfig,
    device_channels: u16,
    out_rate: u32,
    out_channels: u16,
    ratio: u32,
    phase: u32,
    dropped: u64,
}

impl BlockAssembler {
    fn new(
        tx: mpsc::Sender<AudioFrame>,
        config: SourceConfig,
        device_rate: u32,
        device_channels: u16,
    ) -> Self {
        // Decimation only works for integer ratios; otherwise keep the
        // device rate and let the frames carry the truth.
        let ratio = (device_rate / config.sample_rate.max(1)).max(1);
        let out_rate = device_rate / ratio;
        let out_channels = if device_channels > 1 && config.channels == 1 {
            1
        } else {
            device_channels
        };

        Self {
            tx,
            started: Instant::now(),
            pending: Vec::new(),
            config,
            device_channels,
            out_rate,
            out_channels,
            ratio,
            phase: 0,
            dropped: 0,
        }
    }

    fn push(&mut self, samples: &[i16]) {
        if self.device_channels > 1 && self.out_channels == 1 {
            let n = self.device_channels as usize;
            for chunk in samples.chunks_exact(n) {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                self.take((sum / n as i32) as i16);
            }
        } else {
            for &s in samples {
                self.take(s);
            }
        }
        self.flush_blocks();
    }

    fn take(&mut self, sample: i16) {
        if self.phase == 0 {
            self.pending.push(sample);
        }
        self.phase += 1;
        if self.phase == self.ratio {
            self.phase = 0;
        }
    }

    fn flush_blocks(&mut self) {
        let block = self.config.block_size as usize;
        while self.pending.len() >= block {
            let rest = self.pending.split_off(block);
            let samples = std::mem::replace(&mut self.pending, rest);
            let frame = AudioFrame {
                samples,
                sample_rate: self.out_rate,
                channels: self.out_channels,
                timestamp_ms: self.started.elapsed().as_millis() as u64,
            };
            if self.tx.try_send(frame).is_err() {
                self.dropped += 1;
                if self.dropped == 1 || self.dropped % 100 == 0 {
                    warn!("Dropped {} audio blocks (receiver backed up)", self.dropped);
                }
            }
        }
    }
}
