use anyhow::{Context, Result};
use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::source::{AudioFrame, AudioSource};

/// Scratch recording of a capture session's raw audio.
///
/// Frames from an [`AudioSource`] are written to a uniquely named WAV file
/// as they arrive. The file is a diagnostic/fallback artifact only; the
/// session discards it once the recording ends, success or failure.
pub struct WavTape {
    path: PathBuf,
    source: Box<dyn AudioSource>,
    writer: Option<JoinHandle<Result<usize>>>,
}

impl WavTape {
    /// Start the source and begin persisting its frames.
    ///
    /// The WAV header takes its format from the first frame, so a source
    /// that cannot honor the requested rate still produces a valid file.
    pub async fn start(mut source: Box<dyn AudioSource>, scratch_dir: &Path) -> Result<Self> {
        fs::create_dir_all(scratch_dir).with_context(|| {
            format!("Failed to create scratch directory: {}", scratch_dir.display())
        })?;

        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = scratch_dir.join(format!("rec_{}.wav", stamp));

        let rx = source.start().await.context("Failed to start audio source")?;

        info!("Scratch recording started: {}", path.display());

        let writer = tokio::spawn(write_frames(rx, path.clone()));

        Ok(Self {
            path,
            source,
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the source and finish the file; idempotent.
    pub async fn stop(&mut self) {
        if let Err(e) = self.source.stop().await {
            warn!("Failed to stop audio source: {:#}", e);
        }

        let Some(writer) = self.writer.take() else {
            return;
        };
        // Stopping the source closes the frame channel, which ends the
        // writer; the bound guards against a source that never does.
        match tokio::time::timeout(Duration::from_secs(5), writer).await {
            Ok(Ok(Ok(samples))) => {
                debug!("Scratch recording stopped: {} samples written", samples)
            }
            Ok(Ok(Err(e))) => warn!("Scratch writer failed: {:#}", e),
            Ok(Err(e)) => warn!("Scratch writer panicked: {}", e),
            Err(_) => warn!("Scratch writer did not finish; abandoning it"),
        }
    }

    /// Stop if still running, then delete the file.
    ///
    /// The delay gives any in-flight write time to land before the unlink.
    pub async fn discard(mut self, delay: Duration) {
        self.stop().await;
        tokio::time::sleep(delay).await;

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("Deleted scratch recording: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to delete scratch recording {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

async fn write_frames(mut rx: mpsc::Receiver<AudioFrame>, path: PathBuf) -> Result<usize> {
    let mut writer: Option<hound::WavWriter<BufWriter<File>>> = None;
    let mut samples = 0usize;

    while let Some(frame) = rx.recv().await {
        if writer.is_none() {
            let spec = hound::WavSpec {
                channels: frame.channels,
                sample_rate: frame.sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            writer = Some(
                hound::WavWriter::create(&path, spec)
                    .with_context(|| format!("Failed to create WAV file: {:?}", path))?,
            );
        }

        if let Some(w) = writer.as_mut() {
            for &sample in &frame.samples {
                w.write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            samples += frame.samples.len();
        }
    }

    if let Some(writer) = writer {
        writer.finalize().context("Failed to finalize WAV file")?;
    }

    Ok(samples)
}
