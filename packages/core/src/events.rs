//! Event types for real-time updates.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AgentId, AgentStatus, Job, JobId, JobProgress, SwarmHealth};

/// Discriminant of an [`EventKind`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    JobQueued,
    JobStarted,
    ProgressUpdated,
    JobPaused,
    JobResumed,
    JobCompleted,
    JobFailed,
    JobCancelled,
    AgentStatusChanged,
    SwarmHealthChanged,
}

/// Payload of a compression event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// A new job was accepted.
    JobQueued { job: Box<Job> },
    /// A job was handed to an agent.
    JobStarted { job_id: JobId, agent_id: AgentId },
    /// A running job made progress (coalesced).
    ProgressUpdated {
        job_id: JobId,
        progress: JobProgress,
    },
    JobPaused { job_id: JobId },
    JobResumed { job_id: JobId },
    JobCompleted {
        job_id: JobId,
        duration_ms: u64,
        bytes_processed: u64,
    },
    JobFailed { job_id: JobId, error: String },
    JobCancelled { job_id: JobId },
    AgentStatusChanged {
        agent_id: AgentId,
        old_status: AgentStatus,
        new_status: AgentStatus,
    },
    /// The swarm's health level crossed a threshold.
    SwarmHealthChanged { health: SwarmHealth },
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::JobQueued { .. } => EventType::JobQueued,
            EventKind::JobStarted { .. } => EventType::JobStarted,
            EventKind::ProgressUpdated { .. } => EventType::ProgressUpdated,
            EventKind::JobPaused { .. } => EventType::JobPaused,
            EventKind::JobResumed { .. } => EventType::JobResumed,
            EventKind::JobCompleted { .. } => EventType::JobCompleted,
            EventKind::JobFailed { .. } => EventType::JobFailed,
            EventKind::JobCancelled { .. } => EventType::JobCancelled,
            EventKind::AgentStatusChanged { .. } => EventType::AgentStatusChanged,
            EventKind::SwarmHealthChanged { .. } => EventType::SwarmHealthChanged,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            EventKind::JobQueued { job } => Some(job.id),
            EventKind::JobStarted { job_id, .. }
            | EventKind::ProgressUpdated { job_id, .. }
            | EventKind::JobPaused { job_id }
            | EventKind::JobResumed { job_id }
            | EventKind::JobCompleted { job_id, .. }
            | EventKind::JobFailed { job_id, .. }
            | EventKind::JobCancelled { job_id } => Some(*job_id),
            EventKind::AgentStatusChanged { .. } | EventKind::SwarmHealthChanged { .. } => None,
        }
    }

    /// Get the agent ID associated with this event, if any.
    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            EventKind::JobStarted { agent_id, .. }
            | EventKind::AgentStatusChanged { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }

    /// Whether this event ends a job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::JobCompleted { .. }
                | EventKind::JobFailed { .. }
                | EventKind::JobCancelled { .. }
        )
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            EventKind::JobQueued { job } => {
                format!("Job {} queued ({}, {})", job.id, job.kind(), job.priority)
            }
            EventKind::JobStarted { job_id, agent_id } => {
                format!("Job {} started on {}", job_id, agent_id)
            }
            EventKind::ProgressUpdated { job_id, progress } => {
                format!("Job {} at {:.1}%", job_id, progress.percent)
            }
            EventKind::JobPaused { job_id } => format!("Job {} paused", job_id),
            EventKind::JobResumed { job_id } => format!("Job {} resumed", job_id),
            EventKind::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            EventKind::JobFailed { job_id, error } => format!("Job {} failed: {}", job_id, error),
            EventKind::JobCancelled { job_id } => format!("Job {} cancelled", job_id),
            EventKind::AgentStatusChanged {
                agent_id,
                old_status,
                new_status,
            } => format!("Agent {} {} -> {}", agent_id, old_status, new_status),
            EventKind::SwarmHealthChanged { health } => {
                format!("Swarm {} ({}/{} idle)", health.level, health.idle, health.total)
            }
        }
    }
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionEvent {
    /// Strictly increasing per emitter.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl CompressionEvent {
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.kind.job_id()
    }
}

/// Selects which events a subscriber receives. Empty criteria match all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    event_types: Option<HashSet<EventType>>,
    job_id: Option<JobId>,
    agent_id: Option<AgentId>,
}

impl EventFilter {
    /// A filter that matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to the given event types.
    pub fn types(types: impl IntoIterator<Item = EventType>) -> Self {
        Self {
            event_types: Some(types.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Restrict to events about one job.
    pub fn for_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Restrict to events about one agent.
    pub fn for_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn matches(&self, event: &CompressionEvent) -> bool {
        if let Some(types) = &self.event_types
            && !types.contains(&event.event_type())
        {
            return false;
        }
        if let Some(job_id) = self.job_id
            && event.job_id() != Some(job_id)
        {
            return false;
        }
        if let Some(agent_id) = &self.agent_id
            && event.kind.agent_id() != Some(agent_id)
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind) -> CompressionEvent {
        CompressionEvent {
            sequence: 1,
            timestamp: Utc::now(),
            kind,
        }
    }

    #[test]
    fn filter_by_type_and_job() {
        let job_id = JobId::new();
        let cancelled = event(EventKind::JobCancelled { job_id });
        let other = event(EventKind::JobCancelled {
            job_id: JobId::new(),
        });

        assert!(EventFilter::all().matches(&cancelled));
        assert!(EventFilter::types([EventType::JobCancelled]).matches(&cancelled));
        assert!(!EventFilter::types([EventType::JobFailed]).matches(&cancelled));

        let by_job = EventFilter::all().for_job(job_id);
        assert!(by_job.matches(&cancelled));
        assert!(!by_job.matches(&other));
    }

    #[test]
    fn filter_by_agent_skips_job_only_events() {
        let agent_id = AgentId::new("zstd-1");
        let changed = event(EventKind::AgentStatusChanged {
            agent_id: agent_id.clone(),
            old_status: AgentStatus::Busy,
            new_status: AgentStatus::Idle,
        });
        let filter = EventFilter::all().for_agent(agent_id);
        assert!(filter.matches(&changed));
        assert!(!filter.matches(&event(EventKind::JobPaused {
            job_id: JobId::new()
        })));
    }

    #[test]
    fn serializes_as_flat_tagged_record() {
        let job_id = JobId::new();
        let value = serde_json::to_value(event(EventKind::JobFailed {
            job_id,
            error: "disk full".into(),
        }))
        .unwrap();
        assert_eq!(value["event"], "job_failed");
        assert_eq!(value["sequence"], 1);
        assert_eq!(value["error"], "disk full");
        assert_eq!(value["job_id"], job_id.to_string());
    }
}
