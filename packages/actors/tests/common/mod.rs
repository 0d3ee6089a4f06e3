#![allow(dead_code)]

use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Mutex, MutexGuard};

use actors::{EventEmitter, JobQueue, set_default_emitter, take_default_emitter};
use compactor_core::{
    AgentDefinition, CompressionEvent, CoordinatorConfig, EventConfig, Job, JobId, JobStatus,
    QueueConfig, SwarmConfig, Tier,
};

static TEST_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub const WAIT: Duration = Duration::from_secs(3);

/// Serializes tests and installs a fresh process-wide emitter.
///
/// The previous emitter is put back when the guard drops.
pub struct EmitterGuard {
    pub emitter: Arc<EventEmitter>,
    previous: Option<Arc<EventEmitter>>,
    _lock: MutexGuard<'static, ()>,
}

impl Drop for EmitterGuard {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => set_default_emitter(previous),
            None => take_default_emitter(),
        };
    }
}

pub async fn setup() -> EmitterGuard {
    let lock = TEST_LOCK.lock().await;
    let emitter = Arc::new(EventEmitter::new(1024));
    let previous = set_default_emitter(emitter.clone());
    EmitterGuard {
        emitter,
        previous,
        _lock: lock,
    }
}

/// Config with short intervals and the given catalog.
pub fn fast_config(agents: Vec<AgentDefinition>, concurrency: u32) -> CoordinatorConfig {
    CoordinatorConfig {
        queue: QueueConfig {
            concurrency,
            schedule_interval_ms: 20,
            poll_interval_ms: 5,
            progress_interval_ms: 10,
            default_timeout_secs: 60,
        },
        swarm: SwarmConfig::default().with_agents(agents),
        events: EventConfig::default(),
    }
}

pub fn single_agent(capability: &str) -> Vec<AgentDefinition> {
    vec![AgentDefinition::new("solo", Tier::Fast, capability)]
}

pub async fn wait_for_status(queue: &JobQueue, job_id: JobId, status: JobStatus) -> Job {
    let deadline = Instant::now() + WAIT;
    loop {
        let job = queue
            .job(job_id)
            .await
            .expect("queue reachable")
            .expect("job exists");
        if job.status == status {
            return job;
        }
        assert!(
            Instant::now() < deadline,
            "job {job_id} is {} after waiting for {status}",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Next event on `rx` that satisfies `accept`.
pub async fn next_event(
    rx: &mut UnboundedReceiver<CompressionEvent>,
    accept: impl Fn(&CompressionEvent) -> bool,
) -> CompressionEvent {
    let found = tokio::time::timeout(WAIT, async {
        while let Some(event) = rx.recv().await {
            if accept(&event) {
                return Some(event);
            }
        }
        None
    })
    .await;
    found
        .expect("timed out waiting for event")
        .expect("emitter dropped the subscription")
}

/// Everything currently buffered on `rx`.
pub fn drain(rx: &mut UnboundedReceiver<CompressionEvent>) -> Vec<CompressionEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}
