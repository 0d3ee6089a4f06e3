//! Agent swarm: the registry of tiered workers.
//!
//! Registry mutations (acquire, release, mark_*) are serialized behind one
//! mutex. Health reads go through a `watch` snapshot that is refreshed after
//! every mutation, so they never contend with the registry lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use compactor_core::{
    Agent, AgentDefinition, AgentId, AgentStatus, EventKind, HealthLevel, SwarmConfig,
    SwarmHealth, Task, TaskOutcome,
};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::emitter::EventEmitter;
use crate::error::SwarmError;
use crate::selection::{Candidate, FallbackPolicy, Selection, select_agent};

#[derive(Default)]
struct Registry {
    initialized: bool,
    agents: Vec<Agent>,
    index: HashMap<AgentId, usize>,
    /// Agents handed out by acquire and not yet released, whatever their status.
    claimed: HashSet<AgentId>,
    level: Option<HealthLevel>,
}

impl Registry {
    fn get_mut(&mut self, agent_id: &AgentId) -> Result<&mut Agent, SwarmError> {
        let position = *self
            .index
            .get(agent_id)
            .ok_or_else(|| SwarmError::AgentNotFound(agent_id.clone()))?;
        Ok(&mut self.agents[position])
    }
}

/// Registry of worker agents with health tracking.
pub struct AgentSwarm {
    config: SwarmConfig,
    emitter: Arc<EventEmitter>,
    registry: Mutex<Registry>,
    health: watch::Sender<SwarmHealth>,
}

impl AgentSwarm {
    /// Create an empty swarm; call [`AgentSwarm::initialize`] before use.
    pub fn new(config: SwarmConfig, emitter: Arc<EventEmitter>) -> Self {
        let (health, _) = watch::channel(SwarmHealth::default());
        Self {
            config,
            emitter,
            registry: Mutex::new(Registry::default()),
            health,
        }
    }

    /// Populate the registry from the agent catalog. All agents start idle.
    pub fn initialize(&self, definitions: &[AgentDefinition]) -> Result<(), SwarmError> {
        let mut registry = self.registry.lock();
        if registry.initialized {
            return Err(SwarmError::AlreadyInitialized);
        }

        let mut index = HashMap::new();
        let mut agents = Vec::new();
        let now = Utc::now();
        for definition in definitions {
            for replica in 1..=definition.replicas {
                let id = AgentId::new(format!("{}-{}", definition.name, replica));
                let ordinal = agents.len();
                if index.insert(id.clone(), ordinal).is_some() {
                    return Err(SwarmError::DuplicateAgent(id));
                }
                agents.push(Agent::new(
                    id,
                    definition.tier,
                    definition.capability.clone(),
                    ordinal,
                    now,
                ));
            }
        }
        registry.index = index;
        registry.agents = agents;
        registry.initialized = true;

        let health = SwarmHealth::from_agents(&registry.agents, &self.config);
        registry.level = Some(health.level);
        self.health.send_replace(health);

        tracing::info!(
            "Swarm initialized with {} agents from {} definitions",
            registry.agents.len(),
            definitions.len()
        );
        Ok(())
    }

    /// Whether any agent in the catalog carries `capability`, whatever its status.
    pub fn supports(&self, capability: &str) -> bool {
        self.registry
            .lock()
            .agents
            .iter()
            .any(|agent| agent.capability == capability)
    }

    /// Claim an agent for `capability`, or `None` if none is eligible.
    pub fn acquire(&self, capability: &str) -> Option<AgentId> {
        let mut registry = self.registry.lock();
        self.acquire_locked(&mut registry, capability, None)
    }

    /// Claim an agent for `task` and record the task on it.
    pub fn acquire_for(&self, task: &Task) -> Option<AgentId> {
        let mut registry = self.registry.lock();
        self.acquire_locked(&mut registry, &task.capability, Some(task))
    }

    fn acquire_locked(
        &self,
        registry: &mut Registry,
        capability: &str,
        task: Option<&Task>,
    ) -> Option<AgentId> {
        if !registry.initialized {
            return None;
        }
        self.recover_locked(registry, Utc::now());

        let selection = select_agent(
            capability,
            registry.agents.iter().map(Candidate::from),
            FallbackPolicy::from_toggle(self.config.fallback_to_degraded),
        )?;
        if let Selection::DegradedFallback(agent_id) = &selection {
            tracing::warn!(
                "No idle agent for '{}', falling back to degraded {}",
                capability,
                agent_id
            );
        }

        let agent_id = selection.into_agent_id();
        let agent = registry.get_mut(&agent_id).ok()?;
        let old_status = agent.status;
        agent.status = AgentStatus::Busy;
        agent.current_task = task.map(|t| t.job_id);
        registry.claimed.insert(agent_id.clone());

        self.status_changed(&agent_id, old_status, AgentStatus::Busy);
        self.refresh_health(registry);
        Some(agent_id)
    }

    /// Return an agent after its task ended and record the outcome.
    ///
    /// The agent goes back to idle, or to degraded once its failure streak
    /// reaches the configured threshold. An agent taken offline while busy
    /// stays offline. Only a claimed agent can be released. Returns the
    /// agent's new status.
    pub fn release(
        &self,
        agent_id: &AgentId,
        outcome: TaskOutcome,
    ) -> Result<AgentStatus, SwarmError> {
        let mut registry = self.registry.lock();
        let threshold = self.config.failure_threshold;
        let status = registry.get_mut(agent_id)?.status;
        if !registry.claimed.remove(agent_id) {
            return Err(SwarmError::InvalidState {
                agent_id: agent_id.clone(),
                status,
                operation: "release",
            });
        }
        let agent = registry.get_mut(agent_id)?;

        match outcome {
            TaskOutcome::Succeeded { duration_ms } => {
                agent.metrics.tasks_completed += 1;
                agent.metrics.total_duration_ms += duration_ms;
                agent.failure_streak = 0;
            }
            TaskOutcome::Failed { duration_ms } => {
                agent.metrics.tasks_failed += 1;
                agent.metrics.total_duration_ms += duration_ms;
                agent.failure_streak += 1;
            }
            TaskOutcome::Cancelled => agent.metrics.tasks_cancelled += 1,
        }
        agent.current_task = None;

        let old_status = agent.status;
        if old_status == AgentStatus::Busy {
            if agent.failure_streak >= threshold {
                // A fresh failure restarts the cooldown; a cancellation keeps it.
                let now = Utc::now();
                match outcome {
                    TaskOutcome::Failed { .. } => agent.degraded_since = Some(now),
                    _ => {
                        agent.degraded_since.get_or_insert(now);
                    }
                }
                agent.status = AgentStatus::Degraded;
            } else {
                agent.degraded_since = None;
                agent.status = AgentStatus::Idle;
            }
        }
        let new_status = agent.status;

        if new_status == AgentStatus::Degraded && old_status != new_status {
            tracing::warn!(
                "Agent {} degraded after {} consecutive failures",
                agent_id,
                threshold
            );
        }
        if old_status != new_status {
            self.status_changed(agent_id, old_status, new_status);
        }
        self.refresh_health(&mut registry);
        Ok(new_status)
    }

    /// Take an agent out of rotation.
    pub fn mark_offline(&self, agent_id: &AgentId) -> Result<(), SwarmError> {
        let mut registry = self.registry.lock();
        let agent = registry.get_mut(agent_id)?;
        if agent.status == AgentStatus::Offline {
            return Err(SwarmError::InvalidState {
                agent_id: agent_id.clone(),
                status: agent.status,
                operation: "go offline",
            });
        }
        let old_status = agent.status;
        agent.status = AgentStatus::Offline;
        tracing::info!("Agent {} marked offline", agent_id);

        self.status_changed(agent_id, old_status, AgentStatus::Offline);
        self.refresh_health(&mut registry);
        Ok(())
    }

    /// Bring an offline agent back. Its failure streak starts over.
    pub fn mark_online(&self, agent_id: &AgentId) -> Result<(), SwarmError> {
        let mut registry = self.registry.lock();
        let claimed = registry.claimed.contains(agent_id);
        let agent = registry.get_mut(agent_id)?;
        if agent.status != AgentStatus::Offline {
            return Err(SwarmError::InvalidState {
                agent_id: agent_id.clone(),
                status: agent.status,
                operation: "come online",
            });
        }
        // Still held by whoever acquired it before it went offline.
        let new_status = if claimed {
            AgentStatus::Busy
        } else {
            AgentStatus::Idle
        };
        agent.status = new_status;
        agent.failure_streak = 0;
        agent.degraded_since = None;
        agent.metrics.online_since = Utc::now();
        tracing::info!("Agent {} back online", agent_id);

        self.status_changed(agent_id, AgentStatus::Offline, new_status);
        self.refresh_health(&mut registry);
        Ok(())
    }

    /// Manually return a degraded agent to idle.
    pub fn reset(&self, agent_id: &AgentId) -> Result<(), SwarmError> {
        let mut registry = self.registry.lock();
        let agent = registry.get_mut(agent_id)?;
        if agent.status != AgentStatus::Degraded {
            return Err(SwarmError::InvalidState {
                agent_id: agent_id.clone(),
                status: agent.status,
                operation: "reset",
            });
        }
        agent.status = AgentStatus::Idle;
        agent.failure_streak = 0;
        agent.degraded_since = None;

        self.status_changed(agent_id, AgentStatus::Degraded, AgentStatus::Idle);
        self.refresh_health(&mut registry);
        Ok(())
    }

    /// Return degraded agents whose cooldown has elapsed by `now` to idle.
    pub fn recover_degraded(&self, now: DateTime<Utc>) -> Vec<AgentId> {
        let mut registry = self.registry.lock();
        self.recover_locked(&mut registry, now)
    }

    fn recover_locked(&self, registry: &mut Registry, now: DateTime<Utc>) -> Vec<AgentId> {
        let cooldown = chrono::Duration::from_std(self.config.degraded_cooldown())
            .unwrap_or(chrono::Duration::MAX);
        let mut recovered = Vec::new();
        for agent in registry.agents.iter_mut() {
            if agent.status != AgentStatus::Degraded {
                continue;
            }
            let rested = agent
                .degraded_since
                .is_none_or(|since| now.signed_duration_since(since) >= cooldown);
            if rested {
                agent.status = AgentStatus::Idle;
                agent.failure_streak = 0;
                agent.degraded_since = None;
                recovered.push(agent.id.clone());
            }
        }
        for agent_id in &recovered {
            tracing::info!("Agent {} recovered after cooldown", agent_id);
            self.status_changed(agent_id, AgentStatus::Degraded, AgentStatus::Idle);
        }
        if !recovered.is_empty() {
            self.refresh_health(registry);
        }
        recovered
    }

    /// Latest aggregate snapshot. Does not take the registry lock.
    pub fn swarm_health(&self) -> SwarmHealth {
        self.health.borrow().clone()
    }

    /// Receiver that observes every health snapshot.
    pub fn watch_health(&self) -> watch::Receiver<SwarmHealth> {
        self.health.subscribe()
    }

    pub fn agent(&self, agent_id: &AgentId) -> Option<Agent> {
        let registry = self.registry.lock();
        registry
            .index
            .get(agent_id)
            .map(|&position| registry.agents[position].clone())
    }

    /// All agents in catalog order.
    pub fn agents(&self) -> Vec<Agent> {
        self.registry.lock().agents.clone()
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    fn status_changed(&self, agent_id: &AgentId, old_status: AgentStatus, new_status: AgentStatus) {
        self.emitter.publish(EventKind::AgentStatusChanged {
            agent_id: agent_id.clone(),
            old_status,
            new_status,
        });
    }

    /// Publish a new snapshot; emit an event only when the level changes.
    fn refresh_health(&self, registry: &mut Registry) {
        let health = SwarmHealth::from_agents(&registry.agents, &self.config);
        let level = health.level;
        let crossed = registry.level.is_some_and(|previous| previous != level);
        registry.level = Some(level);
        self.health.send_replace(health.clone());

        if crossed {
            tracing::info!("Swarm health is now {}", level);
            self.emitter
                .publish(EventKind::SwarmHealthChanged { health });
        }
    }
}

#[cfg(test)]
mod tests {
    use compactor_core::{EventFilter, EventType, JobId, Tier};

    use super::*;

    fn catalog() -> Vec<AgentDefinition> {
        vec![
            AgentDefinition::new("swift", Tier::Fast, "compress"),
            AgentDefinition::new("zstd", Tier::Balanced, "compress").with_replicas(2),
            AgentDefinition::new("check", Tier::Fast, "verify"),
        ]
    }

    fn swarm_with(config: SwarmConfig) -> (AgentSwarm, Arc<EventEmitter>) {
        let emitter = Arc::new(EventEmitter::new(64));
        let swarm = AgentSwarm::new(config, emitter.clone());
        swarm.initialize(&catalog()).unwrap();
        (swarm, emitter)
    }

    fn swarm() -> (AgentSwarm, Arc<EventEmitter>) {
        swarm_with(SwarmConfig::default())
    }

    fn id(s: &str) -> AgentId {
        AgentId::new(s)
    }

    const FAILED: TaskOutcome = TaskOutcome::Failed { duration_ms: 10 };
    const SUCCEEDED: TaskOutcome = TaskOutcome::Succeeded { duration_ms: 10 };

    #[test]
    fn initialize_expands_replicas_once() {
        let (swarm, _) = swarm();
        let ids: Vec<String> = swarm.agents().into_iter().map(|a| a.id.0).collect();
        assert_eq!(ids, vec!["swift-1", "zstd-1", "zstd-2", "check-1"]);
        assert!(swarm.agents().iter().all(|a| a.status == AgentStatus::Idle));
        assert_eq!(swarm.initialize(&catalog()), Err(SwarmError::AlreadyInitialized));
        assert_eq!(swarm.swarm_health().idle, 4);
    }

    #[test]
    fn acquire_prefers_fast_tier_then_spreads_load() {
        let (swarm, _) = swarm();
        assert_eq!(swarm.acquire("compress"), Some(id("swift-1")));
        assert_eq!(swarm.acquire("compress"), Some(id("zstd-1")));
        swarm.release(&id("zstd-1"), SUCCEEDED).unwrap();
        // zstd-1 completed a task, so its idle sibling goes first.
        assert_eq!(swarm.acquire("compress"), Some(id("zstd-2")));
        assert_eq!(swarm.acquire("compress"), Some(id("zstd-1")));
        assert_eq!(swarm.acquire("compress"), None);
        assert_eq!(swarm.acquire("encrypt"), None);
    }

    #[test]
    fn acquire_for_records_current_task() {
        let (swarm, _) = swarm();
        let task = Task::new(JobId::new(), "verify", std::time::Duration::from_secs(5));
        let agent_id = swarm.acquire_for(&task).unwrap();
        let agent = swarm.agent(&agent_id).unwrap();
        assert_eq!(agent.status, AgentStatus::Busy);
        assert_eq!(agent.current_task, Some(task.job_id));

        swarm.release(&agent_id, SUCCEEDED).unwrap();
        let agent = swarm.agent(&agent_id).unwrap();
        assert_eq!(agent.current_task, None);
        assert_eq!(agent.metrics.tasks_completed, 1);
    }

    #[test]
    fn failure_streak_degrades_and_success_resets() {
        let mut config = SwarmConfig::default();
        config.failure_threshold = 2;
        config.fallback_to_degraded = false;
        let (swarm, _) = swarm_with(config);
        let check = id("check-1");

        assert_eq!(swarm.acquire("verify"), Some(check.clone()));
        assert_eq!(swarm.release(&check, FAILED), Ok(AgentStatus::Idle));
        assert_eq!(swarm.acquire("verify"), Some(check.clone()));
        assert_eq!(swarm.release(&check, SUCCEEDED), Ok(AgentStatus::Idle));
        assert_eq!(swarm.agent(&check).unwrap().failure_streak, 0);

        swarm.acquire("verify");
        swarm.release(&check, FAILED).unwrap();
        swarm.acquire("verify");
        assert_eq!(swarm.release(&check, FAILED), Ok(AgentStatus::Degraded));
        assert_eq!(swarm.acquire("verify"), None);
    }

    #[test]
    fn degraded_agent_is_fallback_when_enabled() {
        let mut config = SwarmConfig::default();
        config.failure_threshold = 1;
        let (swarm, _) = swarm_with(config);
        let check = id("check-1");

        swarm.acquire("verify");
        assert_eq!(swarm.release(&check, FAILED), Ok(AgentStatus::Degraded));
        assert_eq!(swarm.acquire("verify"), Some(check.clone()));
        assert_eq!(swarm.agent(&check).unwrap().status, AgentStatus::Busy);
        assert_eq!(swarm.release(&check, SUCCEEDED), Ok(AgentStatus::Idle));
    }

    #[test]
    fn offline_agents_are_never_acquired() {
        let (swarm, _) = swarm();
        swarm.mark_offline(&id("check-1")).unwrap();
        assert_eq!(swarm.acquire("verify"), None);
        assert!(matches!(
            swarm.mark_offline(&id("check-1")),
            Err(SwarmError::InvalidState { .. })
        ));

        swarm.mark_online(&id("check-1")).unwrap();
        assert_eq!(swarm.acquire("verify"), Some(id("check-1")));
        assert!(matches!(
            swarm.mark_online(&id("check-1")),
            Err(SwarmError::InvalidState { .. })
        ));
    }

    #[test]
    fn busy_agent_taken_offline_stays_offline_on_release() {
        let (swarm, _) = swarm();
        let check = id("check-1");
        swarm.acquire("verify");
        swarm.mark_offline(&check).unwrap();
        assert_eq!(swarm.release(&check, SUCCEEDED), Ok(AgentStatus::Offline));
        assert_eq!(swarm.agent(&check).unwrap().metrics.tasks_completed, 1);
    }

    #[test]
    fn claimed_agent_comes_back_busy_and_is_not_handed_out_twice() {
        let (swarm, _) = swarm();
        let check = id("check-1");
        assert_eq!(swarm.acquire("verify"), Some(check.clone()));
        swarm.mark_offline(&check).unwrap();
        swarm.mark_online(&check).unwrap();
        assert_eq!(swarm.agent(&check).unwrap().status, AgentStatus::Busy);
        assert_eq!(swarm.acquire("verify"), None);

        assert_eq!(swarm.release(&check, SUCCEEDED), Ok(AgentStatus::Idle));
        assert!(matches!(
            swarm.release(&check, SUCCEEDED),
            Err(SwarmError::InvalidState { .. })
        ));
        assert_eq!(swarm.acquire("verify"), Some(check));
    }

    #[test]
    fn unclaimed_offline_agent_cannot_be_released() {
        let (swarm, _) = swarm();
        let check = id("check-1");
        swarm.mark_offline(&check).unwrap();
        assert!(matches!(
            swarm.release(&check, SUCCEEDED),
            Err(SwarmError::InvalidState { .. })
        ));
        swarm.mark_online(&check).unwrap();
        assert_eq!(swarm.agent(&check).unwrap().status, AgentStatus::Idle);
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        let swarm = AgentSwarm::new(SwarmConfig::default(), Arc::new(EventEmitter::new(16)));
        let definitions = vec![
            AgentDefinition::new("zstd", Tier::Balanced, "compress").with_replicas(2),
            AgentDefinition::new("zstd", Tier::Deep, "compress"),
        ];
        assert_eq!(
            swarm.initialize(&definitions),
            Err(SwarmError::DuplicateAgent(id("zstd-1")))
        );
        assert!(swarm.agents().is_empty());

        // The failed attempt leaves the swarm uninitialized.
        swarm.initialize(&catalog()).unwrap();
        assert_eq!(swarm.agents().len(), 4);
    }

    #[test]
    fn release_requires_a_claimed_agent() {
        let (swarm, _) = swarm();
        assert!(matches!(
            swarm.release(&id("check-1"), SUCCEEDED),
            Err(SwarmError::InvalidState { .. })
        ));
        assert_eq!(
            swarm.release(&id("ghost"), SUCCEEDED),
            Err(SwarmError::AgentNotFound(id("ghost")))
        );
    }

    #[test]
    fn cooldown_and_manual_reset_recover_degraded_agents() {
        let mut config = SwarmConfig::default();
        config.failure_threshold = 1;
        config.degraded_cooldown_ms = 60_000;
        let (swarm, _) = swarm_with(config);

        swarm.acquire("verify");
        swarm.release(&id("check-1"), FAILED).unwrap();
        assert!(swarm.recover_degraded(Utc::now()).is_empty());
        let later = Utc::now() + chrono::Duration::seconds(61);
        assert_eq!(swarm.recover_degraded(later), vec![id("check-1")]);
        assert_eq!(swarm.agent(&id("check-1")).unwrap().status, AgentStatus::Idle);

        swarm.acquire("verify");
        swarm.release(&id("check-1"), FAILED).unwrap();
        swarm.reset(&id("check-1")).unwrap();
        assert_eq!(swarm.agent(&id("check-1")).unwrap().failure_streak, 0);
        assert!(swarm.reset(&id("check-1")).is_err());
    }

    #[test]
    fn health_event_only_on_level_change() {
        let (swarm, emitter) = swarm();
        let (_, mut rx) = emitter.subscribe_channel(EventFilter::types([
            EventType::SwarmHealthChanged,
        ]));

        // 4 agents: one offline leaves 75% operational, still healthy.
        swarm.mark_offline(&id("swift-1")).unwrap();
        assert!(rx.try_recv().is_err());

        swarm.mark_offline(&id("zstd-1")).unwrap();
        let event = rx.try_recv().unwrap();
        match event.kind {
            EventKind::SwarmHealthChanged { health } => {
                assert_eq!(health.level, HealthLevel::Strained);
                assert_eq!(health.offline, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Acquiring and releasing does not change the operational fraction.
        swarm.acquire("verify");
        swarm.release(&id("check-1"), SUCCEEDED).unwrap();
        assert!(rx.try_recv().is_err());

        assert_eq!(swarm.swarm_health().level, HealthLevel::Strained);
        assert_eq!(swarm.watch_health().borrow().offline, 2);
    }

    #[test]
    fn status_changes_are_published() {
        let (swarm, emitter) = swarm();
        let (_, mut rx) = emitter.subscribe_channel(
            EventFilter::types([EventType::AgentStatusChanged]).for_agent(id("check-1")),
        );
        swarm.acquire("verify");
        swarm.release(&id("check-1"), SUCCEEDED).unwrap();

        let statuses: Vec<(AgentStatus, AgentStatus)> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| match event.kind {
                EventKind::AgentStatusChanged {
                    old_status,
                    new_status,
                    ..
                } => Some((old_status, new_status)),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                (AgentStatus::Idle, AgentStatus::Busy),
                (AgentStatus::Busy, AgentStatus::Idle)
            ]
        );
    }
}
