// Integration tests for the recording queue
//
// These cover the queue contract end to end: FIFO dispatch on a single
// worker, stop signalling, bounded result retrieval, and failure isolation.
// Scripted engine factories stand in for the speech-to-text backend.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hark::{
    AudioSource, CaptureConfig, EngineFactory, EngineOptions, EngineSession, QueueOptions,
    RecordingQueue, RecordingRequest, RecordingStatus, SessionTiming, SourceConfig, SourceFactory,
};

#[derive(Clone)]
enum Step {
    Text(&'static str),
    Wait(u64),
    End,
}

/// Per-task engine script; `FailOpen` makes `open` itself error.
#[derive(Clone)]
enum Script {
    Run(Vec<Step>),
    FailOpen,
}

/// Hands out one scripted session per `open` call, in order, and records
/// whether two sessions were ever active at the same time.
struct QueueEngines {
    scripts: Mutex<VecDeque<Script>>,
    active: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
}

impl QueueEngines {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            active: Arc::new(AtomicBool::new(false)),
            overlaps: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineFactory for QueueEngines {
    async fn open(&self, _options: EngineOptions) -> Result<Box<dyn EngineSession>> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Run(vec![Step::End]));

        let steps = match script {
            Script::FailOpen => anyhow::bail!("engine model not available"),
            Script::Run(steps) => steps,
        };

        if self.active.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        Ok(Box::new(ScriptSession {
            steps: steps.into(),
            active: Arc::clone(&self.active),
        }))
    }
}

struct ScriptSession {
    steps: VecDeque<Step>,
    active: Arc<AtomicBool>,
}

#[async_trait]
impl EngineSession for ScriptSession {
    async fn next_segment(&mut self) -> Result<Option<String>> {
        while let Some(step) = self.steps.pop_front() {
            match step {
                Step::Text(text) => return Ok(Some(text.to_string())),
                Step::Wait(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                Step::End => return Ok(None),
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Source factory that always reports "no device"; the session degrades to
/// engine-only, which keeps these tests off the filesystem.
struct NoSources;

impl SourceFactory for NoSources {
    fn open(&self, _config: SourceConfig) -> Result<Box<dyn AudioSource>> {
        anyhow::bail!("no input device")
    }
}

fn fast_timing() -> SessionTiming {
    SessionTiming {
        engine_flush_window: Duration::from_millis(20),
        residual_window: Duration::from_millis(20),
        collector_join: Duration::from_millis(200),
        drain_attempts: 5,
        drain_interval: Duration::from_millis(10),
        drain_segment_timeout: Duration::from_millis(20),
        drain_empty_limit: 3,
        segment_retry_limit: 5,
        segment_retry_backoff: Duration::from_millis(10),
        late_text_attempts: 2,
        late_text_interval: Duration::from_millis(20),
        cleanup_delay: Duration::from_millis(10),
    }
}

fn test_queue(engines: Arc<QueueEngines>) -> RecordingQueue {
    RecordingQueue::with_options(
        engines,
        Arc::new(NoSources),
        QueueOptions {
            timing: fast_timing(),
            join_timeout: Duration::from_secs(2),
        },
    )
}

fn request() -> RecordingRequest {
    RecordingRequest::new(CaptureConfig::default(), "en")
}

fn status_recorder() -> (
    Arc<Mutex<Vec<RecordingStatus>>>,
    impl Fn(RecordingStatus) + Send + Sync + 'static,
) {
    let statuses: Arc<Mutex<Vec<RecordingStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);
    (statuses, move |status| sink.lock().unwrap().push(status))
}

async fn wait_for_status(
    statuses: &Arc<Mutex<Vec<RecordingStatus>>>,
    wanted: RecordingStatus,
) -> bool {
    for _ in 0..200 {
        if statuses.lock().unwrap().contains(&wanted) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_results_become_available_in_submission_order() -> Result<()> {
    let engines = Arc::new(QueueEngines::new(vec![
        Script::Run(vec![Step::Wait(30), Step::Text("one"), Step::End]),
        Script::Run(vec![Step::Text("two"), Step::End]),
        Script::Run(vec![Step::Text("three"), Step::End]),
    ]));
    let queue = test_queue(Arc::clone(&engines));
    queue.start();

    let completions: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let mut ids = Vec::new();
    for index in 0..3 {
        let completions = Arc::clone(&completions);
        let id = queue.submit(request().on_status(move |status| {
            if status == RecordingStatus::Completed {
                completions.lock().unwrap().push(index);
            }
        }));
        ids.push(id);
    }

    let texts = ["one", "two", "three"];
    for (id, expected) in ids.iter().zip(texts) {
        let result = queue
            .get_result(id, Some(Duration::from_secs(5)))
            .await
            .expect("result should arrive");
        assert!(result.success);
        assert_eq!(result.transcript, expected);
    }

    assert_eq!(*completions.lock().unwrap(), vec![0, 1, 2]);

    queue.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_sessions_never_overlap() -> Result<()> {
    let engines = Arc::new(QueueEngines::new(vec![
        Script::Run(vec![Step::Wait(50), Step::Text("a"), Step::End]),
        Script::Run(vec![Step::Wait(50), Step::Text("b"), Step::End]),
        Script::Run(vec![Step::Wait(50), Step::Text("c"), Step::End]),
    ]));
    let queue = test_queue(Arc::clone(&engines));
    queue.start();

    let ids: Vec<String> = (0..3).map(|_| queue.submit(request())).collect();
    for id in &ids {
        queue
            .get_result(id, Some(Duration::from_secs(5)))
            .await
            .expect("result should arrive");
    }

    assert_eq!(engines.overlaps(), 0, "engine sessions overlapped in time");

    queue.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_before_start_returns_false_and_task_still_runs() -> Result<()> {
    let engines = Arc::new(QueueEngines::new(vec![Script::Run(vec![
        Step::Text("unaffected"),
        Step::End,
    ])]));
    let queue = test_queue(engines);

    // Worker not started yet, so no stop token can exist for the task.
    let id = queue.submit(request());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!queue.stop(&id));

    queue.start();
    let result = queue
        .get_result(&id, Some(Duration::from_secs(5)))
        .await
        .expect("task should still complete");
    assert!(result.success);
    assert_eq!(result.transcript, "unaffected");

    queue.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_get_result_times_out_then_succeeds() -> Result<()> {
    let engines = Arc::new(QueueEngines::new(vec![Script::Run(vec![
        Step::Wait(300),
        Step::Text("late"),
        Step::End,
    ])]));
    let queue = test_queue(engines);
    queue.start();

    let id = queue.submit(request());

    // Too early: absent, not an error.
    assert!(queue
        .get_result(&id, Some(Duration::from_millis(50)))
        .await
        .is_none());

    let result = queue
        .get_result(&id, Some(Duration::from_secs(5)))
        .await
        .expect("result should arrive with a longer deadline");
    assert!(result.success);
    assert_eq!(result.transcript, "late");

    queue.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_engine_open_failure_fails_task_but_not_queue() -> Result<()> {
    let engines = Arc::new(QueueEngines::new(vec![
        Script::FailOpen,
        Script::Run(vec![Step::Text("second task"), Step::End]),
    ]));
    let queue = test_queue(engines);
    queue.start();

    let (statuses, record) = status_recorder();
    let failed_id = queue.submit(request().on_status(record));
    let ok_id = queue.submit(request());

    let failed = queue
        .get_result(&failed_id, Some(Duration::from_secs(5)))
        .await
        .expect("failed result should still be published");
    assert!(!failed.success);
    assert!(!failed.error.is_empty());
    assert!(failed.transcript.is_empty());
    assert_eq!(
        statuses.lock().unwrap().last(),
        Some(&RecordingStatus::Failed)
    );

    // The worker survives and processes the next task.
    let ok = queue
        .get_result(&ok_id, Some(Duration::from_secs(5)))
        .await
        .expect("queue should remain usable");
    assert!(ok.success);
    assert_eq!(ok.transcript, "second task");

    queue.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_terminal_status_is_stable() -> Result<()> {
    let engines = Arc::new(QueueEngines::new(vec![Script::Run(vec![
        Step::Text("done"),
        Step::End,
    ])]));
    let queue = test_queue(engines);
    queue.start();

    let (statuses, record) = status_recorder();
    let id = queue.submit(request().on_status(record));

    queue
        .get_result(&id, Some(Duration::from_secs(5)))
        .await
        .expect("result should arrive");

    // Nothing further may be delivered once a terminal state fired.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let seen = statuses.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            RecordingStatus::Initializing,
            RecordingStatus::Recording,
            RecordingStatus::Processing,
            RecordingStatus::Completed,
        ]
    );

    queue.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_active_task_returns_true() -> Result<()> {
    let engines = Arc::new(QueueEngines::new(vec![Script::Run(vec![
        Step::Text("partial"),
        Step::Wait(10_000),
        Step::End,
    ])]));
    let queue = test_queue(engines);
    queue.start();

    let (statuses, record) = status_recorder();
    let id = queue.submit(request().on_status(record));

    assert!(wait_for_status(&statuses, RecordingStatus::Recording).await);
    assert!(queue.stop(&id), "an in-flight task should be stoppable");

    let result = queue
        .get_result(&id, Some(Duration::from_secs(5)))
        .await
        .expect("stopped task should still produce a result");
    assert!(result.success);
    assert_eq!(result.transcript, "partial");

    queue.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_unknown_task_returns_false() {
    let engines = Arc::new(QueueEngines::new(Vec::new()));
    let queue = test_queue(engines);
    queue.start();

    assert!(!queue.stop("no-such-task"));

    queue.shutdown().await;
}

#[tokio::test]
async fn test_result_can_be_polled_repeatedly() -> Result<()> {
    let engines = Arc::new(QueueEngines::new(vec![Script::Run(vec![
        Step::Text("kept"),
        Step::End,
    ])]));
    let queue = test_queue(engines);
    queue.start();

    let id = queue.submit(request());

    let first = queue
        .get_result(&id, Some(Duration::from_secs(5)))
        .await
        .expect("result should arrive");
    let second = queue
        .get_result(&id, Some(Duration::from_millis(10)))
        .await
        .expect("retrieval must not consume the result");

    assert_eq!(first.transcript, second.transcript);
    assert_eq!(first.task_id, second.task_id);

    queue.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_drains_current_task() -> Result<()> {
    let engines = Arc::new(QueueEngines::new(vec![
        Script::Run(vec![Step::Wait(100), Step::Text("drained"), Step::End]),
        Script::Run(vec![Step::Text("never runs"), Step::End]),
    ]));
    let queue = test_queue(engines);
    queue.start();

    let (statuses, record) = status_recorder();
    let current = queue.submit(request().on_status(record));
    let queued = queue.submit(request());

    assert!(wait_for_status(&statuses, RecordingStatus::Initializing).await);
    queue.shutdown().await;

    // The in-flight task was drained and its result published...
    let result = queue
        .get_result(&current, Some(Duration::from_secs(1)))
        .await
        .expect("current task should be drained before the worker exits");
    assert!(result.success);
    assert_eq!(result.transcript, "drained");

    // ...but the task still waiting in the queue never ran.
    assert!(queue
        .get_result(&queued, Some(Duration::from_millis(100)))
        .await
        .is_none());

    Ok(())
}

#[tokio::test]
async fn test_stop_with_busy_engine_still_completes() -> Result<()> {
    // The collector is stuck inside a blocking engine call; the session
    // abandons the wait after its join bound and publishes what it has.
    let engines = Arc::new(QueueEngines::new(vec![Script::Run(vec![
        Step::Text("early words"),
        Step::Wait(10_000),
        Step::End,
    ])]));
    let queue = test_queue(engines);
    queue.start();

    let (statuses, record) = status_recorder();
    let id = queue.submit(request().on_status(record));

    assert!(wait_for_status(&statuses, RecordingStatus::Recording).await);
    assert!(queue.stop(&id));

    let result = queue
        .get_result(&id, Some(Duration::from_secs(3)))
        .await
        .expect("session must not hang on a busy engine");
    assert!(result.success);
    assert_eq!(result.transcript, "early words");

    queue.shutdown().await;
    Ok(())
}
