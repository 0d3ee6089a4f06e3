//! Core domain types for the compression coordinator.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and the job state machine
//! - Agent, Tier, Task and swarm health snapshots
//! - Events and subscriber filters for real-time updates
//! - Startup configuration

mod agent;
mod config;
mod events;
mod job;
mod queue;

pub use agent::{
    Agent, AgentDefinition, AgentId, AgentMetrics, AgentStatus, HealthLevel, SwarmConfig,
    SwarmHealth, Task, TaskOutcome, Tier, default_catalog,
};
pub use config::{ConfigError, CoordinatorConfig, EventConfig};
pub use events::{CompressionEvent, EventFilter, EventKind, EventType};
pub use job::{
    DEFAULT_LEVEL, Job, JobConfig, JobId, JobKind, JobProgress, JobStatus, MAX_LEVEL, MIN_LEVEL,
    Priority, TransitionError, ValidationError,
};
pub use queue::{QueueConfig, QueueStats};
