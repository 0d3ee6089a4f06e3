//! Agent, task and swarm health types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Identifier of an agent, derived from its catalog entry (`<name>-<n>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cost ranking of an agent. Cheaper tiers are preferred.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Fast = 0,
    #[default]
    Balanced = 1,
    Deep = 2,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Fast => write!(f, "fast"),
            Tier::Balanced => write!(f, "balanced"),
            Tier::Deep => write!(f, "deep"),
        }
    }
}

/// Operational state of an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Busy,
    /// Failed too often recently; only picked as a fallback.
    Degraded,
    /// Taken out of rotation by an operator.
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Degraded => "degraded",
            AgentStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn one() -> u32 {
    1
}

/// One entry of the static agent catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub tier: Tier,
    pub capability: String,
    /// Number of agents created from this entry.
    #[serde(default = "one")]
    pub replicas: u32,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, tier: Tier, capability: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tier,
            capability: capability.into(),
            replicas: 1,
        }
    }

    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }
}

/// The catalog used when configuration does not provide one.
pub fn default_catalog() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition::new("lz-swift", Tier::Fast, "fast-compress").with_replicas(2),
        AgentDefinition::new("lz-swift-full", Tier::Fast, "compress"),
        AgentDefinition::new("zstd", Tier::Balanced, "compress").with_replicas(2),
        AgentDefinition::new("xz-archive", Tier::Deep, "compress"),
        AgentDefinition::new("inflate", Tier::Fast, "decompress").with_replicas(2),
        AgentDefinition::new("checksum", Tier::Fast, "verify"),
        AgentDefinition::new("deep-verify", Tier::Deep, "verify"),
    ]
}

/// Cumulative counters for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    /// Sum of completed and failed task durations.
    pub total_duration_ms: u64,
    /// When the agent last came online.
    pub online_since: DateTime<Utc>,
}

impl AgentMetrics {
    pub fn new(online_since: DateTime<Utc>) -> Self {
        Self {
            tasks_completed: 0,
            tasks_failed: 0,
            tasks_cancelled: 0,
            total_duration_ms: 0,
            online_since,
        }
    }

    /// Average duration of completed and failed tasks.
    pub fn avg_duration_ms(&self) -> Option<f64> {
        let timed = self.tasks_completed + self.tasks_failed;
        if timed == 0 {
            None
        } else {
            Some(self.total_duration_ms as f64 / timed as f64)
        }
    }
}

/// A worker that executes tasks for one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub tier: Tier,
    pub capability: String,
    pub status: AgentStatus,
    /// Job whose task the agent is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<JobId>,
    pub metrics: AgentMetrics,
    /// Consecutive failed tasks since the last success.
    pub failure_streak: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_since: Option<DateTime<Utc>>,
    /// Position in the catalog; the final tie-break in selection.
    pub ordinal: usize,
}

impl Agent {
    pub fn new(
        id: AgentId,
        tier: Tier,
        capability: impl Into<String>,
        ordinal: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tier,
            capability: capability.into(),
            status: AgentStatus::Idle,
            current_task: None,
            metrics: AgentMetrics::new(now),
            failure_streak: 0,
            degraded_since: None,
            ordinal,
        }
    }

    /// Time since the agent came online; zero while offline.
    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        if self.status == AgentStatus::Offline {
            return Duration::ZERO;
        }
        (now - self.metrics.online_since)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// The transient assignment of a job to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub job_id: JobId,
    pub capability: String,
    /// After this instant the job is failed as timed out.
    pub deadline: DateTime<Utc>,
}

impl Task {
    pub fn new(job_id: JobId, capability: impl Into<String>, timeout: Duration) -> Self {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let deadline = Utc::now()
            .checked_add_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            job_id,
            capability: capability.into(),
            deadline,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

/// How a task ended, reported when its agent is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded { duration_ms: u64 },
    Failed { duration_ms: u64 },
    /// Stopped by the caller; leaves the failure streak untouched.
    Cancelled,
}

/// Configuration for the agent swarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub agents: Vec<AgentDefinition>,
    /// Consecutive failures after which an agent becomes degraded.
    pub failure_threshold: u32,
    /// How long a degraded agent rests before it returns to idle.
    pub degraded_cooldown_ms: u64,
    /// Hand out degraded agents when no idle agent matches.
    pub fallback_to_degraded: bool,
    /// Operational fraction below which the swarm is strained.
    pub strained_below: f64,
    /// Operational fraction below which the swarm is critical.
    pub critical_below: f64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            agents: default_catalog(),
            failure_threshold: 3,
            degraded_cooldown_ms: 60_000,
            fallback_to_degraded: true,
            strained_below: 0.75,
            critical_below: 0.5,
        }
    }
}

impl SwarmConfig {
    pub fn with_agents(mut self, agents: Vec<AgentDefinition>) -> Self {
        self.agents = agents;
        self
    }

    pub fn degraded_cooldown(&self) -> Duration {
        Duration::from_millis(self.degraded_cooldown_ms)
    }

    /// Classify an operational fraction (idle plus busy over total).
    pub fn health_level(&self, operational: f64) -> HealthLevel {
        if operational < self.critical_below {
            HealthLevel::Critical
        } else if operational < self.strained_below {
            HealthLevel::Strained
        } else {
            HealthLevel::Healthy
        }
    }
}

/// Coarse classification of swarm health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    #[default]
    Healthy,
    Strained,
    Critical,
}

impl std::fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthLevel::Healthy => write!(f, "healthy"),
            HealthLevel::Strained => write!(f, "strained"),
            HealthLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Aggregate snapshot of the swarm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmHealth {
    pub total: usize,
    pub idle: usize,
    pub busy: usize,
    pub degraded: usize,
    pub offline: usize,
    pub idle_fraction: f64,
    pub busy_fraction: f64,
    pub degraded_fraction: f64,
    pub offline_fraction: f64,
    /// Average task duration across all agents.
    pub avg_task_duration_ms: Option<f64>,
    pub level: HealthLevel,
}

impl SwarmHealth {
    /// Summarize `agents` against the thresholds in `config`.
    pub fn from_agents<'a>(
        agents: impl IntoIterator<Item = &'a Agent>,
        config: &SwarmConfig,
    ) -> Self {
        let mut health = SwarmHealth::default();
        let mut total_duration = 0u64;
        let mut timed_tasks = 0u64;
        for agent in agents {
            health.total += 1;
            match agent.status {
                AgentStatus::Idle => health.idle += 1,
                AgentStatus::Busy => health.busy += 1,
                AgentStatus::Degraded => health.degraded += 1,
                AgentStatus::Offline => health.offline += 1,
            }
            total_duration += agent.metrics.total_duration_ms;
            timed_tasks += agent.metrics.tasks_completed + agent.metrics.tasks_failed;
        }

        if health.total > 0 {
            let total = health.total as f64;
            health.idle_fraction = health.idle as f64 / total;
            health.busy_fraction = health.busy as f64 / total;
            health.degraded_fraction = health.degraded as f64 / total;
            health.offline_fraction = health.offline as f64 / total;
        }
        if timed_tasks > 0 {
            health.avg_task_duration_ms = Some(total_duration as f64 / timed_tasks as f64);
        }
        // An empty swarm has nothing operational.
        let operational = if health.total == 0 {
            0.0
        } else {
            health.idle_fraction + health.busy_fraction
        };
        health.level = config.health_level(operational);
        health
    }
}
