//! Agent selection strategy.
//!
//! Pure function over a snapshot of the registry so the tier preference and
//! the degraded fallback can be tested without a swarm or a scheduler.

use compactor_core::{Agent, AgentId, AgentStatus, Tier};

/// Whether degraded agents may be handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Only idle agents are eligible.
    IdleOnly,
    /// A degraded agent is picked when no idle agent of any tier matches.
    AllowDegraded,
}

impl FallbackPolicy {
    pub fn from_toggle(fallback_to_degraded: bool) -> Self {
        if fallback_to_degraded {
            FallbackPolicy::AllowDegraded
        } else {
            FallbackPolicy::IdleOnly
        }
    }
}

/// What the strategy needs to know about one agent.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub id: &'a AgentId,
    pub tier: Tier,
    pub capability: &'a str,
    pub status: AgentStatus,
    pub tasks_completed: u64,
    pub ordinal: usize,
}

impl<'a> From<&'a Agent> for Candidate<'a> {
    fn from(agent: &'a Agent) -> Self {
        Self {
            id: &agent.id,
            tier: agent.tier,
            capability: &agent.capability,
            status: agent.status,
            tasks_completed: agent.metrics.tasks_completed,
            ordinal: agent.ordinal,
        }
    }
}

/// The agent picked for a task and how it qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Idle(AgentId),
    DegradedFallback(AgentId),
}

impl Selection {
    pub fn agent_id(&self) -> &AgentId {
        match self {
            Selection::Idle(id) | Selection::DegradedFallback(id) => id,
        }
    }

    pub fn into_agent_id(self) -> AgentId {
        match self {
            Selection::Idle(id) | Selection::DegradedFallback(id) => id,
        }
    }
}

/// Pick an agent for `capability`.
///
/// Among idle agents carrying the capability, the cheapest tier wins, then
/// the agent with the fewest completed tasks, then catalog order. Offline and
/// busy agents are never eligible. Degraded agents are ranked the same way
/// and only considered under [`FallbackPolicy::AllowDegraded`] when no idle
/// agent matches. Returns `None` when nothing is eligible.
pub fn select_agent<'a>(
    capability: &str,
    candidates: impl IntoIterator<Item = Candidate<'a>>,
    policy: FallbackPolicy,
) -> Option<Selection> {
    let rank = |c: &Candidate<'a>| (c.tier, c.tasks_completed, c.ordinal);

    let mut best_idle: Option<Candidate<'a>> = None;
    let mut best_degraded: Option<Candidate<'a>> = None;
    for candidate in candidates {
        if candidate.capability != capability {
            continue;
        }
        let slot = match candidate.status {
            AgentStatus::Idle => &mut best_idle,
            AgentStatus::Degraded => &mut best_degraded,
            AgentStatus::Busy | AgentStatus::Offline => continue,
        };
        if slot.is_none_or(|current| rank(&candidate) < rank(&current)) {
            *slot = Some(candidate);
        }
    }

    if let Some(idle) = best_idle {
        return Some(Selection::Idle(idle.id.clone()));
    }
    match (policy, best_degraded) {
        (FallbackPolicy::AllowDegraded, Some(degraded)) => {
            Some(Selection::DegradedFallback(degraded.id.clone()))
        }
        _ => None,
    }
}
