//! Error types returned to callers of the queue and the swarm.

use compactor_core::{
    AgentId, AgentStatus, ConfigError, JobId, JobStatus, TransitionError, ValidationError,
};

use crate::engine::EngineError;

/// Errors from agent registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwarmError {
    #[error("swarm is already initialized")]
    AlreadyInitialized,

    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("agent {0} is defined more than once")]
    DuplicateAgent(AgentId),

    #[error("agent {agent_id} cannot {operation} while {status}")]
    InvalidState {
        agent_id: AgentId,
        status: AgentStatus,
        operation: &'static str,
    },
}

/// Error type for queue and coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("invalid job configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job {job_id} cannot {operation} while {status}")]
    InvalidState {
        job_id: JobId,
        status: JobStatus,
        operation: &'static str,
    },

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error(transparent)]
    Swarm(#[from] SwarmError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("actor error: {0}")]
    Actor(String),
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
