use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::stop::StopToken;
use super::task::{RecordingRequest, RecordingResult, RecordingStatus, RecordingTask};
use crate::audio::SourceFactory;
use crate::engine::EngineFactory;
use crate::session::{CaptureSession, SessionTiming};

/// Tunables for a [`RecordingQueue`].
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Session drain/shutdown windows
    pub timing: SessionTiming,
    /// How long `shutdown` waits for the worker to drain the current task
    pub join_timeout: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            timing: SessionTiming::default(),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Single-worker recording task queue.
///
/// Tasks are processed strictly in submission order by one background
/// worker, so at most one capture session is ever active (the engine and
/// the audio device are not safely shareable). Submission, stop signalling
/// and result polling are safe from any number of callers.
///
/// Results are retained until the process exits; nothing evicts them.
/// Callers are expected to retrieve each result once, but repeated polls
/// are safe.
pub struct RecordingQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    session: CaptureSession,
    join_timeout: Duration,
    task_tx: mpsc::UnboundedSender<RecordingTask>,
    task_rx: Mutex<Option<mpsc::UnboundedReceiver<RecordingTask>>>,
    results: Mutex<HashMap<String, RecordingResult>>,
    result_published: Notify,
    active: Mutex<HashMap<String, StopToken>>,
    shutdown: StopToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RecordingQueue {
    pub fn new(engines: Arc<dyn EngineFactory>, sources: Arc<dyn SourceFactory>) -> Self {
        Self::with_options(engines, sources, QueueOptions::default())
    }

    pub fn with_options(
        engines: Arc<dyn EngineFactory>,
        sources: Arc<dyn SourceFactory>,
        options: QueueOptions,
    ) -> Self {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(QueueInner {
                session: CaptureSession::new(engines, sources, options.timing),
                join_timeout: options.join_timeout,
                task_tx,
                task_rx: Mutex::new(Some(task_rx)),
                results: Mutex::new(HashMap::new()),
                result_published: Notify::new(),
                active: Mutex::new(HashMap::new()),
                shutdown: StopToken::new(),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Start the background worker; idempotent.
    pub fn start(&self) {
        let Some(task_rx) = lock(&self.inner.task_rx).take() else {
            return; // already started
        };
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(worker_loop(inner, task_rx));
        *lock(&self.inner.worker) = Some(handle);
        debug!("Recording worker started");
    }

    /// Enqueue a recording; never blocks.
    ///
    /// No validation happens here; a broken configuration surfaces later as
    /// a `Failed` result.
    pub fn submit(&self, request: RecordingRequest) -> String {
        let task_id = uuid::Uuid::new_v4().to_string();
        let task = RecordingTask::from_request(task_id.clone(), request);

        if self.inner.task_tx.send(task).is_err() {
            warn!("Worker is gone; task {} will never run", task_id);
        } else {
            debug!("Task {} submitted", task_id);
        }
        task_id
    }

    /// Signal an in-flight recording to stop.
    ///
    /// Returns true only if a stop token is currently registered for the
    /// id; a task that has not started yet (or already finished) is not
    /// affected and yields false.
    pub fn stop(&self, task_id: &str) -> bool {
        match lock(&self.inner.active).get(task_id) {
            Some(token) => {
                token.signal();
                debug!("Stop signal sent for task {}", task_id);
                true
            }
            None => false,
        }
    }

    /// Wait for a task's result.
    ///
    /// Blocks the caller (only) until the result is published or the
    /// timeout elapses; `None` waits indefinitely. The store is untouched,
    /// so repeated polls are safe.
    pub async fn get_result(
        &self,
        task_id: &str,
        timeout: Option<Duration>,
    ) -> Option<RecordingResult> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            // Arm the notification before re-checking the store so a result
            // published in between cannot be missed.
            let published = self.inner.result_published.notified();
            tokio::pin!(published);
            published.as_mut().enable();

            if let Some(result) = lock(&self.inner.results).get(task_id) {
                return Some(result.clone());
            }

            match deadline {
                None => published.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, published).await.is_err() {
                        warn!("Timed out waiting for result of task {}", task_id);
                        return None;
                    }
                }
            }
        }
    }

    /// Stop the worker after it drains the current task; idempotent.
    ///
    /// The join is bounded; a session that refuses to finish is abandoned
    /// with a warning rather than blocking shutdown forever.
    pub async fn shutdown(&self) {
        self.inner.shutdown.signal();

        let handle = lock(&self.inner.worker).take();
        if let Some(handle) = handle {
            match tokio::time::timeout(self.inner.join_timeout, handle).await {
                Ok(Ok(())) => debug!("Recording worker stopped"),
                Ok(Err(e)) => error!("Recording worker panicked: {}", e),
                Err(_) => warn!(
                    "Recording worker did not stop within {:?}; abandoning the join",
                    self.inner.join_timeout
                ),
            }
        }
    }
}

async fn worker_loop(inner: Arc<QueueInner>, mut task_rx: mpsc::UnboundedReceiver<RecordingTask>) {
    debug!("Worker loop started");

    loop {
        let task = tokio::select! {
            _ = inner.shutdown.wait() => break,
            task = task_rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        info!("Processing task {}", task.task_id);
        process_task(&inner, task).await;
    }

    debug!("Worker loop stopped");
}

async fn process_task(inner: &QueueInner, task: RecordingTask) {
    let started = Instant::now();
    let task = Arc::new(task);

    let token = StopToken::new();
    lock(&inner.active).insert(task.task_id.clone(), token.clone());

    // The session runs in its own task so a panic is contained to this
    // recording instead of killing the worker.
    let run = {
        let session = inner.session.clone();
        let task = Arc::clone(&task);
        tokio::spawn(async move { session.run(&task, token).await })
    };
    let outcome = match run.await {
        Ok(outcome) => outcome,
        Err(e) => Err(anyhow!("capture session panicked: {}", e)),
    };

    lock(&inner.active).remove(&task.task_id);

    let elapsed_seconds = started.elapsed().as_secs_f64();
    let (result, status) = match outcome {
        Ok(transcript) => (
            RecordingResult::completed(&task.task_id, transcript, elapsed_seconds),
            RecordingStatus::Completed,
        ),
        Err(e) => {
            error!("Task {} failed: {:#}", task.task_id, e);
            (
                RecordingResult::failed(&task.task_id, format!("{:#}", e), elapsed_seconds),
                RecordingStatus::Failed,
            )
        }
    };

    // The result lands in the store before the terminal status fires, so a
    // caller reacting to the callback can fetch it immediately.
    lock(&inner.results).insert(task.task_id.clone(), result);
    inner.result_published.notify_waiters();
    info!(
        "Result stored for task {} ({:?}, {:.1}s)",
        task.task_id, status, elapsed_seconds
    );

    task.notify_status(status);
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
