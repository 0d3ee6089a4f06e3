//! Job domain types for compression work items.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::AgentId;

/// Lowest accepted compression level.
pub const MIN_LEVEL: u8 = 1;
/// Highest accepted compression level.
pub const MAX_LEVEL: u8 = 9;
/// Level used when a configuration does not name one.
pub const DEFAULT_LEVEL: u8 = 6;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority level for job execution order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Current status of a job in its lifecycle.
///
/// ```text
/// queued ──► running ──► completed | failed | cancelled
///   │          ▲  │
///   │          │  ▼
///   │        paused ──► cancelled
///   └──► cancelled
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a free slot and a matching agent.
    #[default]
    Queued,
    /// Executing on an agent.
    Running,
    /// Suspended; keeps its agent and its concurrency slot.
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (*self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
        )
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status change that the job state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition from {from} to {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// What a job does with its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    #[default]
    Compress,
    Decompress,
    Verify,
}

impl JobKind {
    /// Capability tag an agent needs to run this kind when the job does not
    /// request a more specific one.
    pub fn default_capability(&self) -> &'static str {
        match self {
            JobKind::Compress => "compress",
            JobKind::Decompress => "decompress",
            JobKind::Verify => "verify",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            JobKind::Compress => "compress",
            JobKind::Decompress => "decompress",
            JobKind::Verify => "verify",
        })
    }
}

/// Rejection reasons for a job configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("target path is missing")]
    MissingPath,

    #[error("compression level {0} is outside {min}..={max}", min = MIN_LEVEL, max = MAX_LEVEL)]
    InvalidLevel(u8),

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("no agent in the catalog provides capability '{0}'")]
    UnsupportedCapability(String),
}

fn default_level() -> u8 {
    DEFAULT_LEVEL
}

/// Caller-supplied description of the work a job performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub kind: JobKind,
    /// File or directory the engine reads.
    pub target_path: PathBuf,
    /// Where the engine writes, if somewhere other than next to the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(default = "default_level")]
    pub level: u8,
    /// Overrides the capability implied by `kind`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Overrides the queue's default timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Engine-specific settings.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl JobConfig {
    /// Create a configuration for `kind` over `target_path` with defaults.
    pub fn new(kind: JobKind, target_path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            target_path: target_path.into(),
            output_path: None,
            level: DEFAULT_LEVEL,
            capability: None,
            timeout_secs: None,
            options: serde_json::Map::new(),
        }
    }

    pub fn compress(target_path: impl Into<PathBuf>) -> Self {
        Self::new(JobKind::Compress, target_path)
    }

    pub fn decompress(target_path: impl Into<PathBuf>) -> Self {
        Self::new(JobKind::Decompress, target_path)
    }

    pub fn verify(target_path: impl Into<PathBuf>) -> Self {
        Self::new(JobKind::Verify, target_path)
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn with_output(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(output_path.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Capability tag an agent must carry to run this job.
    pub fn required_capability(&self) -> &str {
        self.capability
            .as_deref()
            .unwrap_or_else(|| self.kind.default_capability())
    }

    /// Check the parts of the configuration that do not depend on the swarm.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target_path.as_os_str().is_empty() {
            return Err(ValidationError::MissingPath);
        }
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&self.level) {
            return Err(ValidationError::InvalidLevel(self.level));
        }
        if self.timeout_secs == Some(0) {
            return Err(ValidationError::ZeroTimeout);
        }
        Ok(())
    }
}

/// How far along a job is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// 0.0 to 100.0.
    pub percent: f64,
    pub bytes_processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl JobProgress {
    /// A finished progress record for `bytes` processed bytes.
    pub fn complete(bytes: u64) -> Self {
        Self {
            percent: 100.0,
            bytes_processed: bytes,
            total_bytes: Some(bytes),
            estimated_completion: None,
        }
    }
}

/// A job represents a unit of compression work owned by a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    pub priority: Priority,
    pub status: JobStatus,
    pub config: JobConfig,
    pub progress: JobProgress,
    /// Agent currently or last assigned; lookup only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Human-readable reason for a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Submission order within the owning queue.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(config: JobConfig, priority: Priority, sequence: u64) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            priority,
            status: JobStatus::Queued,
            config,
            progress: JobProgress::default(),
            agent_id: None,
            error: None,
            sequence,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.config.kind
    }

    /// Move to `next`, stamping the matching timestamp.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        if next == JobStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Milliseconds between start and finish, if both happened.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds().max(0) as u64)
    }
}
