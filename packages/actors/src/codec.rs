//! Engine adapter that runs a blocking [`Codec`] on Tokio's blocking pool.
//!
//! The codec reports progress and observes cancellation and suspension
//! through a [`CodecControl`]; the adapter's `poll` only reads shared
//! counters, so the queue never waits on codec work.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use compactor_core::{JobConfig, JobKind};
use parking_lot::{Condvar, Mutex};

use crate::engine::{
    EngineAdapter, EngineError, EngineHandle, EngineOutcome, EnginePoll, ProgressSnapshot,
};

/// Errors a codec returns from [`Codec::run`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The run was cancelled at a checkpoint.
    #[error("interrupted")]
    Interrupted,

    #[error("{0}")]
    Failed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-level implementation plugged into a [`BlockingEngine`].
pub trait Codec: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Process `config.target_path`, returning the number of bytes processed.
    ///
    /// Runs on a blocking thread. Long loops should call
    /// [`CodecControl::checkpoint`] between chunks.
    fn run(&self, config: &JobConfig, control: &CodecControl) -> Result<u64, CodecError>;
}

const UNKNOWN_TOTAL: u64 = u64::MAX;

struct RunShared {
    processed: AtomicU64,
    total: AtomicU64,
    cancelled: AtomicBool,
    suspended: Mutex<bool>,
    wake: Condvar,
    outcome: Mutex<Option<EngineOutcome>>,
}

impl RunShared {
    fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            total: AtomicU64::new(UNKNOWN_TOTAL),
            cancelled: AtomicBool::new(false),
            suspended: Mutex::new(false),
            wake: Condvar::new(),
            outcome: Mutex::new(None),
        }
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let total = self.total.load(Ordering::Acquire);
        ProgressSnapshot {
            bytes_processed: self.processed.load(Ordering::Acquire),
            total_bytes: (total != UNKNOWN_TOTAL).then_some(total),
        }
    }

    fn set_suspended(&self, suspended: bool) {
        *self.suspended.lock() = suspended;
        self.wake.notify_all();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        // Take the lock so a codec about to wait sees the flag.
        let _guard = self.suspended.lock();
        self.wake.notify_all();
    }
}

/// The codec's view of its run.
pub struct CodecControl {
    shared: Arc<RunShared>,
}

impl CodecControl {
    pub fn set_total(&self, bytes: u64) {
        self.shared.total.store(bytes, Ordering::Release);
    }

    pub fn advance(&self, bytes: u64) {
        self.shared.processed.fetch_add(bytes, Ordering::AcqRel);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Block while the run is suspended. Returns `Interrupted` once cancelled.
    pub fn checkpoint(&self) -> Result<(), CodecError> {
        let mut suspended = self.shared.suspended.lock();
        while *suspended && !self.is_cancelled() {
            self.shared.wake.wait(&mut suspended);
        }
        if self.is_cancelled() {
            return Err(CodecError::Interrupted);
        }
        Ok(())
    }
}

/// [`EngineAdapter`] backed by a [`Codec`] running on the blocking pool.
pub struct BlockingEngine<C> {
    codec: Arc<C>,
    runtime: tokio::runtime::Handle,
    next_handle: AtomicU64,
    runs: Mutex<HashMap<EngineHandle, Arc<RunShared>>>,
}

impl<C: Codec> BlockingEngine<C> {
    /// Must be called inside a Tokio runtime; runs are spawned onto it.
    pub fn new(codec: C) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::Backend(format!("no Tokio runtime: {e}")))?;
        Ok(Self {
            codec: Arc::new(codec),
            runtime,
            next_handle: AtomicU64::new(1),
            runs: Mutex::new(HashMap::new()),
        })
    }

    fn shared(&self, handle: EngineHandle) -> Result<Arc<RunShared>, EngineError> {
        self.runs
            .lock()
            .get(&handle)
            .cloned()
            .ok_or(EngineError::UnknownHandle(handle))
    }
}

impl<C: Codec> EngineAdapter for BlockingEngine<C> {
    fn name(&self) -> &str {
        self.codec.name()
    }

    fn start(&self, config: &JobConfig) -> Result<EngineHandle, EngineError> {
        let handle = EngineHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(RunShared::new());
        self.runs.lock().insert(handle, shared.clone());

        let codec = self.codec.clone();
        let config = config.clone();
        self.runtime.spawn_blocking(move || {
            let control = CodecControl {
                shared: shared.clone(),
            };
            let outcome = match catch_unwind(AssertUnwindSafe(|| codec.run(&config, &control))) {
                Ok(Ok(bytes_processed)) => EngineOutcome::Completed { bytes_processed },
                Ok(Err(e)) => EngineOutcome::Failed {
                    error: e.to_string(),
                },
                Err(_) => {
                    tracing::error!("Codec {} panicked on {}", codec.name(), handle);
                    EngineOutcome::Failed {
                        error: format!("codec {} panicked", codec.name()),
                    }
                }
            };
            *shared.outcome.lock() = Some(outcome);
        });

        Ok(handle)
    }

    fn poll(&self, handle: EngineHandle) -> Result<EnginePoll, EngineError> {
        let shared = self.shared(handle)?;
        let finished = shared.outcome.lock().take();
        match finished {
            Some(outcome) => {
                self.runs.lock().remove(&handle);
                Ok(EnginePoll::Finished(outcome))
            }
            None => Ok(EnginePoll::Running(shared.snapshot())),
        }
    }

    fn cancel(&self, handle: EngineHandle) -> Result<(), EngineError> {
        if let Some(shared) = self.runs.lock().remove(&handle) {
            shared.cancel();
        }
        Ok(())
    }

    fn suspend(&self, handle: EngineHandle) -> Result<(), EngineError> {
        self.shared(handle)?.set_suspended(true);
        Ok(())
    }

    fn resume(&self, handle: EngineHandle) -> Result<(), EngineError> {
        self.shared(handle)?.set_suspended(false);
        Ok(())
    }
}

const CHUNK: usize = 64 * 1024;

/// Stored (level-agnostic) codec: streams the target to the output file in
/// chunks, or only reads it for verify jobs.
///
/// Output defaults to the target path with a `.stored` suffix.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreCodec;

impl StoreCodec {
    fn output_path(config: &JobConfig) -> PathBuf {
        config.output_path.clone().unwrap_or_else(|| {
            let mut name = config.target_path.clone().into_os_string();
            name.push(".stored");
            PathBuf::from(name)
        })
    }
}

impl Codec for StoreCodec {
    fn name(&self) -> &str {
        "store"
    }

    fn run(&self, config: &JobConfig, control: &CodecControl) -> Result<u64, CodecError> {
        let mut input = File::open(&config.target_path)?;
        control.set_total(input.metadata()?.len());

        let mut output = match config.kind {
            JobKind::Verify => None,
            JobKind::Compress | JobKind::Decompress => {
                Some(File::create(Self::output_path(config))?)
            }
        };

        let mut buf = vec![0u8; CHUNK];
        let mut processed = 0u64;
        loop {
            control.checkpoint()?;
            let read = input.read(&mut buf)?;
            if read == 0 {
                break;
            }
            if let Some(out) = output.as_mut() {
                out.write_all(&buf[..read])?;
            }
            processed += read as u64;
            control.advance(read as u64);
        }
        if let Some(mut out) = output {
            out.flush()?;
        }
        Ok(processed)
    }
}
