//! Boundary to the compression engine.
//!
//! The queue never compresses anything itself. It starts a run through an
//! [`EngineAdapter`], polls it for progress and reads the outcome when the
//! run reports it is finished.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use compactor_core::JobConfig;
use parking_lot::Mutex;

/// Opaque identifier of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

impl std::fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Byte counts reported by a running engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub bytes_processed: u64,
    pub total_bytes: Option<u64>,
}

impl ProgressSnapshot {
    /// Completion percentage, or `None` while the total is unknown.
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.bytes_processed as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}

/// How a finished run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Completed { bytes_processed: u64 },
    Failed { error: String },
}

/// Result of polling a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePoll {
    Running(ProgressSnapshot),
    Finished(EngineOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("unknown engine run {0}")]
    UnknownHandle(EngineHandle),

    #[error("engine refused to start: {0}")]
    Start(String),

    #[error("engine failure: {0}")]
    Backend(String),
}

/// A compression backend driven by the queue.
///
/// Calls are synchronous and must return quickly; long work belongs on the
/// engine's own threads. After `poll` returns [`EnginePoll::Finished`] the
/// handle may be forgotten by the engine.
pub trait EngineAdapter: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn start(&self, config: &JobConfig) -> Result<EngineHandle, EngineError>;

    fn poll(&self, handle: EngineHandle) -> Result<EnginePoll, EngineError>;

    /// Stop a run. Unknown handles are not an error once the run is gone.
    fn cancel(&self, handle: EngineHandle) -> Result<(), EngineError>;

    fn suspend(&self, handle: EngineHandle) -> Result<(), EngineError>;

    fn resume(&self, handle: EngineHandle) -> Result<(), EngineError>;
}

/// Option key read by [`StubEngine`] for the simulated input size.
pub const SIZE_OPTION: &str = "size_bytes";

const DEFAULT_SIZE: u64 = 1 << 20;

struct StubRun {
    total: u64,
    step: u32,
    fails: bool,
    suspended: bool,
}

/// Engine that simulates a run in a fixed number of polls.
///
/// Each poll advances an unsuspended run by one step. The run finishes on
/// the last step; runs whose target is listed with `failing_on` fail there.
pub struct StubEngine {
    steps: u32,
    default_size: u64,
    failing: Vec<PathBuf>,
    next_handle: AtomicU64,
    runs: Mutex<HashMap<EngineHandle, StubRun>>,
}

impl StubEngine {
    pub fn new(steps: u32) -> Self {
        Self {
            steps: steps.max(1),
            default_size: DEFAULT_SIZE,
            failing: Vec::new(),
            next_handle: AtomicU64::new(1),
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.default_size = bytes;
        self
    }

    /// Make every run over `path` fail on its last step.
    pub fn failing_on(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing.push(path.into());
        self
    }

    /// Runs started and not yet finished or cancelled.
    pub fn active_runs(&self) -> usize {
        self.runs.lock().len()
    }

    fn with_run<T>(
        &self,
        handle: EngineHandle,
        f: impl FnOnce(&mut StubRun) -> T,
    ) -> Result<T, EngineError> {
        let mut runs = self.runs.lock();
        let run = runs
            .get_mut(&handle)
            .ok_or(EngineError::UnknownHandle(handle))?;
        Ok(f(run))
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new(10)
    }
}

impl EngineAdapter for StubEngine {
    fn name(&self) -> &str {
        "stub"
    }

    fn start(&self, config: &JobConfig) -> Result<EngineHandle, EngineError> {
        let total = match config.options.get(SIZE_OPTION) {
            Some(value) => value
                .as_u64()
                .ok_or_else(|| EngineError::Start(format!("{SIZE_OPTION} must be an integer")))?,
            None => self.default_size,
        };
        let handle = EngineHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let fails = self.failing.iter().any(|p| *p == config.target_path);
        self.runs.lock().insert(
            handle,
            StubRun {
                total,
                step: 0,
                fails,
                suspended: false,
            },
        );
        tracing::debug!(
            "Stub engine started {} on {}",
            handle,
            config.target_path.display()
        );
        Ok(handle)
    }

    fn poll(&self, handle: EngineHandle) -> Result<EnginePoll, EngineError> {
        let mut runs = self.runs.lock();
        let run = runs
            .get_mut(&handle)
            .ok_or(EngineError::UnknownHandle(handle))?;
        if !run.suspended && run.step < self.steps {
            run.step += 1;
        }
        // Widened so huge simulated sizes cannot overflow; the quotient fits back into u64.
        let bytes = (u128::from(run.total) * u128::from(run.step) / u128::from(self.steps)) as u64;
        if run.step < self.steps {
            return Ok(EnginePoll::Running(ProgressSnapshot {
                bytes_processed: bytes,
                total_bytes: Some(run.total),
            }));
        }

        let outcome = if run.fails {
            EngineOutcome::Failed {
                error: format!("simulated failure after {bytes} bytes"),
            }
        } else {
            EngineOutcome::Completed {
                bytes_processed: run.total,
            }
        };
        runs.remove(&handle);
        Ok(EnginePoll::Finished(outcome))
    }

    fn cancel(&self, handle: EngineHandle) -> Result<(), EngineError> {
        self.runs.lock().remove(&handle);
        Ok(())
    }

    fn suspend(&self, handle: EngineHandle) -> Result<(), EngineError> {
        self.with_run(handle, |run| run.suspended = true)
    }

    fn resume(&self, handle: EngineHandle) -> Result<(), EngineError> {
        self.with_run(handle, |run| run.suspended = false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_handles_unknown_and_empty_totals() {
        let unknown = ProgressSnapshot {
            bytes_processed: 10,
            total_bytes: None,
        };
        assert_eq!(unknown.percent(), None);
        let empty = ProgressSnapshot {
            bytes_processed: 0,
            total_bytes: Some(0),
        };
        assert_eq!(empty.percent(), Some(100.0));
        let half = ProgressSnapshot {
            bytes_processed: 50,
            total_bytes: Some(100),
        };
        assert_eq!(half.percent(), Some(50.0));
    }

    #[test]
    fn stub_run_advances_and_completes() {
        let engine = StubEngine::new(4).with_size(400);
        let handle = engine.start(&JobConfig::compress("/data/a")).unwrap();

        let mut seen = Vec::new();
        loop {
            match engine.poll(handle).unwrap() {
                EnginePoll::Running(snapshot) => seen.push(snapshot.bytes_processed),
                EnginePoll::Finished(outcome) => {
                    assert_eq!(
                        outcome,
                        EngineOutcome::Completed {
                            bytes_processed: 400
                        }
                    );
                    break;
                }
            }
        }
        assert_eq!(seen, vec![100, 200, 300]);
        assert_eq!(engine.active_runs(), 0);
        assert_eq!(
            engine.poll(handle),
            Err(EngineError::UnknownHandle(handle))
        );
    }

    #[test]
    fn suspended_run_does_not_advance() {
        let engine = StubEngine::new(4).with_size(400);
        let handle = engine.start(&JobConfig::compress("/data/a")).unwrap();
        engine.poll(handle).unwrap();
        engine.suspend(handle).unwrap();
        for _ in 0..3 {
            assert_eq!(
                engine.poll(handle).unwrap(),
                EnginePoll::Running(ProgressSnapshot {
                    bytes_processed: 100,
                    total_bytes: Some(400)
                })
            );
        }
        engine.resume(handle).unwrap();
        assert!(matches!(
            engine.poll(handle).unwrap(),
            EnginePoll::Running(ProgressSnapshot {
                bytes_processed: 200,
                ..
            })
        ));
    }

    #[test]
    fn failing_target_and_size_option() {
        let engine = StubEngine::new(1).failing_on("/data/bad");
        let handle = engine.start(&JobConfig::compress("/data/bad")).unwrap();
        assert!(matches!(
            engine.poll(handle).unwrap(),
            EnginePoll::Finished(EngineOutcome::Failed { .. })
        ));

        let config = JobConfig::compress("/data/a").with_option(SIZE_OPTION, 42.into());
        let handle = engine.start(&config).unwrap();
        assert_eq!(
            engine.poll(handle).unwrap(),
            EnginePoll::Finished(EngineOutcome::Completed {
                bytes_processed: 42
            })
        );

        let bad = JobConfig::compress("/data/a").with_option(SIZE_OPTION, "big".into());
        assert!(matches!(engine.start(&bad), Err(EngineError::Start(_))));
    }

    #[test]
    fn huge_size_reports_progress_without_overflow() {
        let engine = StubEngine::new(10);
        let config = JobConfig::compress("/data/huge").with_option(SIZE_OPTION, u64::MAX.into());
        let handle = engine.start(&config).unwrap();
        assert_eq!(
            engine.poll(handle).unwrap(),
            EnginePoll::Running(ProgressSnapshot {
                bytes_processed: u64::MAX / 10,
                total_bytes: Some(u64::MAX)
            })
        );
        for _ in 0..8 {
            engine.poll(handle).unwrap();
        }
        assert_eq!(
            engine.poll(handle).unwrap(),
            EnginePoll::Finished(EngineOutcome::Completed {
                bytes_processed: u64::MAX
            })
        );
    }

    #[test]
    fn cancel_forgets_the_run() {
        let engine = StubEngine::new(4);
        let handle = engine.start(&JobConfig::compress("/data/a")).unwrap();
        engine.cancel(handle).unwrap();
        engine.cancel(handle).unwrap();
        assert_eq!(engine.active_runs(), 0);
        assert!(engine.suspend(handle).is_err());
    }
}
