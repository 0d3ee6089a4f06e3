//! Message types for actor communication.

use compactor_core::{Job, JobConfig, JobId, JobStatus, Priority, QueueStats};
use ractor::RpcReplyPort;

use crate::engine::{EngineOutcome, ProgressSnapshot};
use crate::error::CoordinatorResult;

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Submit a new job.
    Submit {
        config: Box<JobConfig>,
        priority: Priority,
        reply: RpcReplyPort<CoordinatorResult<JobId>>,
    },

    /// Cancel a queued, running or paused job.
    Cancel {
        job_id: JobId,
        reply: RpcReplyPort<CoordinatorResult<()>>,
    },

    /// Suspend a running job.
    Pause {
        job_id: JobId,
        reply: RpcReplyPort<CoordinatorResult<()>>,
    },

    /// Continue a paused job.
    Resume {
        job_id: JobId,
        reply: RpcReplyPort<CoordinatorResult<()>>,
    },

    /// Get a job by ID.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// List jobs, optionally only those in one status.
    ListJobs {
        status: Option<JobStatus>,
        reply: RpcReplyPort<Vec<Job>>,
    },

    /// Get per-status counts.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Progress read by a job's poller.
    EngineProgress {
        job_id: JobId,
        snapshot: ProgressSnapshot,
    },

    /// Terminal outcome read by a job's poller.
    EngineFinished {
        job_id: JobId,
        outcome: EngineOutcome,
    },

    /// Run a scheduling pass: timeouts, agent cooldowns, then dispatch.
    Schedule,

    /// Shutdown the queue gracefully.
    Shutdown,
}
