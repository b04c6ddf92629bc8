use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::transcript::TranscriptAccumulator;
use crate::audio::{SourceConfig, SourceFactory, WavTape};
use crate::engine::{EngineFactory, EngineOptions, EngineSession};
use crate::queue::task::{emit_text_chunk, TextCallback};
use crate::queue::{RecordingStatus, RecordingTask, StopToken};

/// Windows and bounds governing the session's staged shutdown.
///
/// Defaults are tuned for engines with ~1s post-speech silence detection;
/// tests shrink them to milliseconds.
#[derive(Debug, Clone)]
pub struct SessionTiming {
    /// After the stop signal, how long the engine gets to flush speech
    /// already inside its buffer before raw capture stops
    pub engine_flush_window: Duration,

    /// Second drain window after raw capture stops, before the collector
    /// join begins
    pub residual_window: Duration,

    /// How long to wait for the collector to finish before abandoning it
    pub collector_join: Duration,

    /// Post-stop drain: maximum polls for late segments
    pub drain_attempts: u32,

    /// Post-stop drain: pause between polls
    pub drain_interval: Duration,

    /// Post-stop drain: per-poll wait for a segment
    pub drain_segment_timeout: Duration,

    /// Post-stop drain: consecutive empty polls before giving up
    pub drain_empty_limit: u32,

    /// Consecutive `next_segment` errors before the collector gives up
    pub segment_retry_limit: u32,

    /// Pause between retried `next_segment` calls
    pub segment_retry_backoff: Duration,

    /// Extra polls for delayed engine output when nothing was accumulated
    pub late_text_attempts: u32,

    /// Pause between those extra polls
    pub late_text_interval: Duration,

    /// Delay before the scratch recording is deleted, letting in-flight
    /// writes land
    pub cleanup_delay: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            engine_flush_window: Duration::from_millis(2500),
            residual_window: Duration::from_millis(2000),
            collector_join: Duration::from_secs(10),
            drain_attempts: 10,
            drain_interval: Duration::from_millis(500),
            drain_segment_timeout: Duration::from_millis(500),
            drain_empty_limit: 3,
            segment_retry_limit: 10,
            segment_retry_backoff: Duration::from_millis(100),
            late_text_attempts: 10,
            late_text_interval: Duration::from_secs(1),
            cleanup_delay: Duration::from_millis(200),
        }
    }
}

/// Drives one recording end-to-end: parallel raw-audio capture, an engine
/// session bridged into the transcript accumulator, and a graceful, staged
/// shutdown once stopped.
#[derive(Clone)]
pub struct CaptureSession {
    engines: Arc<dyn EngineFactory>,
    sources: Arc<dyn SourceFactory>,
    timing: SessionTiming,
}

impl CaptureSession {
    pub fn new(
        engines: Arc<dyn EngineFactory>,
        sources: Arc<dyn SourceFactory>,
        timing: SessionTiming,
    ) -> Self {
        Self {
            engines,
            sources,
            timing,
        }
    }

    /// Run the session for one task until the engine ends the stream or the
    /// stop token is signalled, and return the finalized transcript.
    ///
    /// Status callbacks fire in order: `Initializing`, `Recording`,
    /// `Processing`; terminal states are delivered by the worker once the
    /// result is stored.
    pub async fn run(&self, task: &RecordingTask, stop: StopToken) -> Result<String> {
        info!("Starting capture session for task {}", task.task_id);
        task.notify_status(RecordingStatus::Initializing);

        let transcript = Arc::new(TranscriptAccumulator::new());

        // Raw capture starts before the engine session opens. Engine
        // construction loads a model and is slow; words spoken while it
        // loads would otherwise be lost.
        let mut tape = match self.sources.open(SourceConfig::from(&task.capture)) {
            Ok(source) => match WavTape::start(source, &task.capture.scratch_dir).await {
                Ok(tape) => Some(tape),
                Err(e) => {
                    warn!("Continuing without scratch recording: {:#}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Audio input unavailable, continuing without it: {:#}", e);
                None
            }
        };

        let outcome = self.drive(task, &stop, &transcript, &mut tape).await;

        // The scratch recording is transient regardless of how the session
        // ended.
        if let Some(tape) = tape.take() {
            tape.discard(self.timing.cleanup_delay).await;
        }

        outcome
    }

    async fn drive(
        &self,
        task: &RecordingTask,
        stop: &StopToken,
        transcript: &Arc<TranscriptAccumulator>,
        tape: &mut Option<WavTape>,
    ) -> Result<String> {
        let options = EngineOptions::from_capture(&task.capture, &task.language);
        let engine = self
            .engines
            .open(options)
            .await
            .context("Failed to open transcription engine session")?;

        task.notify_status(RecordingStatus::Recording);
        info!("Recording task {}", task.task_id);

        let mut collector = tokio::spawn(collect_segments(
            engine,
            Arc::clone(transcript),
            task.on_text_chunk.clone(),
            stop.clone(),
            self.timing.clone(),
        ));

        tokio::select! {
            _ = stop.wait() => {
                // Staged shutdown: the engine processes audio with inherent
                // latency, so raw capture must outlive the stop signal or
                // the final utterance gets truncated.
                debug!("Stop signalled; letting the engine flush buffered speech");
                sleep(self.timing.engine_flush_window).await;

                if let Some(tape) = tape.as_mut() {
                    tape.stop().await;
                }
                sleep(self.timing.residual_window).await;

                match timeout(self.timing.collector_join, &mut collector).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Segment collector panicked: {}", e),
                    Err(_) => warn!(
                        "Segment collector still busy after {:?}; abandoning the wait",
                        self.timing.collector_join
                    ),
                }
            }
            joined = &mut collector => {
                debug!("Engine ended the stream on its own");
                if let Err(e) = joined {
                    warn!("Segment collector panicked: {}", e);
                }
                if let Some(tape) = tape.as_mut() {
                    tape.stop().await;
                }
            }
        }

        task.notify_status(RecordingStatus::Processing);

        // Engines may finalize text asynchronously after the caller
        // perceives speech as finished; give a still-running collector a
        // bounded chance before giving up on an empty transcript.
        if transcript.is_empty() {
            debug!("No text accumulated yet; waiting for delayed transcription");
            for _ in 0..self.timing.late_text_attempts {
                sleep(self.timing.late_text_interval).await;
                if !transcript.is_empty() {
                    break;
                }
            }
        }

        let text = transcript.finalize();
        info!(
            "Capture session for task {} collected {} fragments",
            task.task_id,
            transcript.len()
        );

        Ok(text)
    }
}

/// Pulls finalized segments out of the engine and feeds accepted,
/// non-duplicate fragments to the accumulator and the text callback.
///
/// Owns the engine session and closes it on every exit path.
async fn collect_segments(
    mut engine: Box<dyn EngineSession>,
    transcript: Arc<TranscriptAccumulator>,
    on_text_chunk: Option<TextCallback>,
    stop: StopToken,
    timing: SessionTiming,
) {
    let mut stream_ended = false;
    let mut gave_up = false;
    let mut errors = 0u32;

    // Live phase: collect until the stop signal or end of stream.
    while !stop.is_signalled() {
        match engine.next_segment().await {
            Ok(Some(text)) => {
                errors = 0;
                accept_fragment(&transcript, &on_text_chunk, &text);
            }
            Ok(None) => {
                debug!("Engine reported end of stream");
                stream_ended = true;
                break;
            }
            Err(e) => {
                errors += 1;
                if errors >= timing.segment_retry_limit {
                    warn!(
                        "Giving up on segment collection after {} consecutive errors: {:#}",
                        errors, e
                    );
                    gave_up = true;
                    break;
                }
                debug!("Transient segment error (attempt {}): {:#}", errors, e);
                sleep(timing.segment_retry_backoff).await;
            }
        }
    }

    // Drain phase: the engine may still hold speech that was in its buffer
    // when the stop arrived. Poll with a bound until it runs dry.
    if !stream_ended && !gave_up {
        debug!("Stop observed; draining buffered engine output");
        let mut empties = 0u32;
        for attempt in 0..timing.drain_attempts {
            if attempt > 0 {
                sleep(timing.drain_interval).await;
            }
            match timeout(timing.drain_segment_timeout, engine.next_segment()).await {
                Ok(Ok(Some(text))) => {
                    empties = 0;
                    accept_fragment(&transcript, &on_text_chunk, &text);
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    empties += 1;
                    debug!("Segment error during drain: {:#}", e);
                }
                Err(_) => empties += 1,
            }
            if empties >= timing.drain_empty_limit {
                debug!("No more text after {} empty polls", empties);
                break;
            }
        }
    }

    if let Err(e) = engine.close().await {
        warn!("Failed to close engine session: {:#}", e);
    }
    debug!("Segment collector finished");
}

fn accept_fragment(
    transcript: &TranscriptAccumulator,
    on_text_chunk: &Option<TextCallback>,
    text: &str,
) {
    if transcript.accept(text) {
        debug!("Accepted segment: {}", text.trim());
        if let Some(callback) = on_text_chunk {
            emit_text_chunk(callback, text.trim());
        }
    }
}
