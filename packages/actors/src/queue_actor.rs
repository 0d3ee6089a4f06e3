//! Queue actor that owns jobs and drives them through the engine.
//!
//! One actor per queue is the single scheduler for its jobs. Engine polling
//! runs in a task per active job that only forwards what it reads as
//! messages, so every job mutation happens inside `handle`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use compactor_core::{
    AgentId, AgentStatus, CompressionEvent, EventFilter, EventKind, EventType, Job, JobConfig,
    JobId, JobProgress, JobStatus, Priority, QueueConfig, QueueStats, Task, TaskOutcome,
    ValidationError,
};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tokio::task::JoinHandle;

use crate::emitter::{EventEmitter, SubscriberError, SubscriptionId};
use crate::engine::{EngineAdapter, EngineHandle, EngineOutcome, EnginePoll, ProgressSnapshot};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::messages::QueueMessage;
use crate::swarm::AgentSwarm;

/// Linear projection of the finish time from elapsed time and percent done.
///
/// `None` outside (0, 100) percent or when the projection leaves the
/// representable date range.
fn estimate_completion(
    started: DateTime<Utc>,
    now: DateTime<Utc>,
    percent: f64,
) -> Option<DateTime<Utc>> {
    if !(percent > 0.0 && percent < 100.0) {
        return None;
    }
    let elapsed = now.signed_duration_since(started).num_milliseconds() as f64;
    let remaining = elapsed * (100.0 - percent) / percent;
    if !remaining.is_finite() || remaining >= i64::MAX as f64 {
        return None;
    }
    let remaining = chrono::TimeDelta::try_milliseconds(remaining.max(0.0) as i64)?;
    now.checked_add_signed(remaining)
}

/// Heap entry for a queued job (higher priority first, earlier submission first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingJob {
    id: JobId,
    priority: Priority,
    sequence: u64,
}

impl PartialOrd for PendingJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first
        match self.priority.cmp(&other.priority) {
            // Earlier submissions first
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other => other,
        }
    }
}

/// A job holding an agent and an engine run (running or paused).
struct ActiveJob {
    task: Task,
    agent_id: AgentId,
    handle: EngineHandle,
    timeout: Duration,
    poller: JoinHandle<()>,
    last_progress_event: Option<Instant>,
    /// Outcome that arrived while the job was paused.
    held_outcome: Option<EngineOutcome>,
    paused_at: Option<Instant>,
}

/// Arguments for spawning a [`QueueActor`].
pub struct QueueArgs {
    pub config: QueueConfig,
    pub swarm: Arc<AgentSwarm>,
    pub engine: Arc<dyn EngineAdapter>,
    pub emitter: Arc<EventEmitter>,
}

/// State for the queue actor.
pub struct QueueActorState {
    config: QueueConfig,
    swarm: Arc<AgentSwarm>,
    engine: Arc<dyn EngineAdapter>,
    emitter: Arc<EventEmitter>,
    /// Queued jobs (priority queue).
    pending: BinaryHeap<PendingJob>,
    /// Running and paused jobs by ID.
    active: HashMap<JobId, ActiveJob>,
    /// All jobs by ID for quick lookup.
    jobs: HashMap<JobId, Job>,
    next_sequence: u64,
    completed_duration_ms: u64,
    completed_count: u64,
    subscription: Option<SubscriptionId>,
    ticker: Option<JoinHandle<()>>,
}

impl QueueActorState {
    fn new(args: QueueArgs) -> Self {
        Self {
            config: args.config,
            swarm: args.swarm,
            engine: args.engine,
            emitter: args.emitter,
            pending: BinaryHeap::new(),
            active: HashMap::new(),
            jobs: HashMap::new(),
            next_sequence: 0,
            completed_duration_ms: 0,
            completed_count: 0,
            subscription: None,
            ticker: None,
        }
    }

    fn submit(&mut self, config: JobConfig, priority: Priority) -> CoordinatorResult<JobId> {
        config.validate()?;
        let capability = config.required_capability();
        if !self.swarm.supports(capability) {
            return Err(ValidationError::UnsupportedCapability(capability.to_string()).into());
        }

        self.next_sequence += 1;
        let job = Job::new(config, priority, self.next_sequence);
        let job_id = job.id;
        self.pending.push(PendingJob {
            id: job_id,
            priority,
            sequence: job.sequence,
        });
        self.emitter.publish(EventKind::JobQueued {
            job: Box::new(job.clone()),
        });
        tracing::info!(
            "Queued {} job {} ({} priority) for {}",
            job.kind(),
            job_id,
            priority,
            job.config.target_path.display()
        );
        self.jobs.insert(job_id, job);
        Ok(job_id)
    }

    /// Start queued jobs while slots and agents are available.
    ///
    /// A job whose capability has no free agent stays queued; later jobs
    /// needing the same capability wait behind it, other capabilities
    /// continue.
    fn schedule(&mut self, myself: &ActorRef<QueueMessage>) {
        self.expire_overdue();
        self.swarm.recover_degraded(Utc::now());

        let mut deferred = Vec::new();
        let mut blocked: HashSet<String> = HashSet::new();
        while self.active.len() < self.config.concurrency as usize {
            let Some(next) = self.pending.pop() else {
                break;
            };
            let Some(job) = self.jobs.get(&next.id) else {
                continue;
            };
            let capability = job.config.required_capability().to_string();
            if blocked.contains(&capability) {
                deferred.push(next);
                continue;
            }

            let timeout = job
                .config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| self.config.default_timeout());
            let task = Task::new(next.id, capability, timeout);
            match self.swarm.acquire_for(&task) {
                Some(agent_id) => self.start_job(myself, task, timeout, agent_id),
                None => {
                    tracing::debug!("No agent for '{}', job {} waits", task.capability, next.id);
                    blocked.insert(task.capability);
                    deferred.push(next);
                }
            }
        }
        self.pending.extend(deferred);
    }

    fn start_job(
        &mut self,
        myself: &ActorRef<QueueMessage>,
        task: Task,
        timeout: Duration,
        agent_id: AgentId,
    ) {
        let job_id = task.job_id;
        let Some(job) = self.jobs.get_mut(&job_id) else {
            let _ = self.swarm.release(&agent_id, TaskOutcome::Cancelled);
            return;
        };
        if let Err(e) = job.transition(JobStatus::Running) {
            tracing::error!("Cannot start job {}: {}", job_id, e);
            let _ = self.swarm.release(&agent_id, TaskOutcome::Cancelled);
            return;
        }
        job.agent_id = Some(agent_id.clone());
        self.emitter.publish(EventKind::JobStarted {
            job_id,
            agent_id: agent_id.clone(),
        });

        match self.engine.start(&job.config) {
            Ok(handle) => {
                tracing::info!(
                    "Started job {} on {} ({} {})",
                    job_id,
                    agent_id,
                    self.engine.name(),
                    handle
                );
                let poller = spawn_poller(
                    myself.clone(),
                    self.engine.clone(),
                    job_id,
                    handle,
                    self.config.poll_interval(),
                );
                self.active.insert(
                    job_id,
                    ActiveJob {
                        task,
                        agent_id,
                        handle,
                        timeout,
                        poller,
                        last_progress_event: None,
                        held_outcome: None,
                        paused_at: None,
                    },
                );
            }
            Err(e) => {
                let error = e.to_string();
                tracing::warn!("Engine refused job {}: {}", job_id, error);
                job.error = Some(error.clone());
                if let Err(e) = job.transition(JobStatus::Failed) {
                    tracing::error!("Cannot fail job {}: {}", job_id, e);
                }
                release_agent(&self.swarm, &agent_id, TaskOutcome::Failed { duration_ms: 0 });
                self.emitter
                    .publish(EventKind::JobFailed { job_id, error });
            }
        }
    }

    fn on_progress(&mut self, job_id: JobId, snapshot: ProgressSnapshot) {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return;
        };
        if job.status.is_terminal() {
            tracing::warn!("Ignoring progress for {} job {}", job.status, job_id);
            return;
        }
        if job.status != JobStatus::Running {
            return;
        }
        let Some(active) = self.active.get_mut(&job_id) else {
            return;
        };
        if snapshot.bytes_processed < job.progress.bytes_processed {
            tracing::debug!("Dropping stale progress for job {}", job_id);
            return;
        }

        let now = Utc::now();
        let percent = snapshot
            .percent()
            .unwrap_or(job.progress.percent)
            .max(job.progress.percent);
        job.progress.bytes_processed = snapshot.bytes_processed;
        job.progress.total_bytes = snapshot.total_bytes;
        job.progress.percent = percent;
        job.progress.estimated_completion = job
            .started_at
            .and_then(|started| estimate_completion(started, now, percent));
        job.updated_at = now;

        let interval = self.config.progress_interval();
        let due = active
            .last_progress_event
            .is_none_or(|at| at.elapsed() >= interval);
        if !due {
            tracing::debug!("Coalesced progress for job {} at {:.1}%", job_id, percent);
            return;
        }
        active.last_progress_event = Some(Instant::now());
        self.emitter.publish(EventKind::ProgressUpdated {
            job_id,
            progress: job.progress.clone(),
        });
    }

    fn on_finished(&mut self, job_id: JobId, outcome: EngineOutcome) {
        let paused = self
            .jobs
            .get(&job_id)
            .is_some_and(|job| job.status == JobStatus::Paused);
        let Some(active) = self.active.get_mut(&job_id) else {
            tracing::debug!("Ignoring engine outcome for inactive job {}", job_id);
            return;
        };
        if paused {
            tracing::info!("Job {} finished while paused; holding outcome", job_id);
            active.held_outcome = Some(outcome);
            return;
        }
        self.settle(job_id, outcome);
    }

    /// Apply a terminal engine outcome to a running job.
    fn settle(&mut self, job_id: JobId, outcome: EngineOutcome) {
        let Some(active) = self.active.remove(&job_id) else {
            return;
        };
        active.poller.abort();
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return;
        };

        match outcome {
            EngineOutcome::Completed { bytes_processed } => {
                let bytes_processed = bytes_processed.max(job.progress.bytes_processed);
                job.progress = JobProgress::complete(bytes_processed);
                if let Err(e) = job.transition(JobStatus::Completed) {
                    tracing::error!("Cannot complete job {}: {}", job_id, e);
                    return;
                }
                let duration_ms = job.duration_ms().unwrap_or(0);
                self.completed_duration_ms += duration_ms;
                self.completed_count += 1;
                tracing::info!(
                    "Job {} completed in {}ms ({} bytes)",
                    job_id,
                    duration_ms,
                    bytes_processed
                );

                release_agent(
                    &self.swarm,
                    &active.agent_id,
                    TaskOutcome::Succeeded { duration_ms },
                );
                self.emitter.publish(EventKind::JobCompleted {
                    job_id,
                    duration_ms,
                    bytes_processed,
                });
            }
            EngineOutcome::Failed { error } => {
                job.error = Some(error.clone());
                if let Err(e) = job.transition(JobStatus::Failed) {
                    tracing::error!("Cannot fail job {}: {}", job_id, e);
                    return;
                }
                let duration_ms = job.duration_ms().unwrap_or(0);
                tracing::warn!("Job {} failed: {}", job_id, error);

                release_agent(
                    &self.swarm,
                    &active.agent_id,
                    TaskOutcome::Failed { duration_ms },
                );
                self.emitter
                    .publish(EventKind::JobFailed { job_id, error });
            }
        }
    }

    fn cancel(&mut self, job_id: JobId) -> CoordinatorResult<()> {
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(CoordinatorError::JobNotFound(job_id))?;
        if job.status.is_terminal() {
            return Err(CoordinatorError::InvalidState {
                job_id,
                status: job.status,
                operation: "cancel",
            });
        }
        let previous = job.status;
        job.transition(JobStatus::Cancelled)?;

        if previous == JobStatus::Queued {
            self.pending.retain(|pending| pending.id != job_id);
        } else if let Some(active) = self.active.remove(&job_id) {
            active.poller.abort();
            if let Err(e) = self.engine.cancel(active.handle) {
                tracing::warn!("Engine cancel failed for job {}: {}", job_id, e);
            }
            release_agent(&self.swarm, &active.agent_id, TaskOutcome::Cancelled);
        }

        tracing::info!("Cancelled {} job {}", previous, job_id);
        self.emitter.publish(EventKind::JobCancelled { job_id });
        Ok(())
    }

    fn pause(&mut self, job_id: JobId) -> CoordinatorResult<()> {
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(CoordinatorError::JobNotFound(job_id))?;
        let active = match self.active.get_mut(&job_id) {
            Some(active) if job.status == JobStatus::Running => active,
            _ => {
                return Err(CoordinatorError::InvalidState {
                    job_id,
                    status: job.status,
                    operation: "pause",
                });
            }
        };

        self.engine.suspend(active.handle)?;
        job.transition(JobStatus::Paused)?;
        active.paused_at = Some(Instant::now());

        tracing::info!("Paused job {}", job_id);
        self.emitter.publish(EventKind::JobPaused { job_id });
        Ok(())
    }

    fn resume(&mut self, job_id: JobId) -> CoordinatorResult<()> {
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(CoordinatorError::JobNotFound(job_id))?;
        let active = match self.active.get_mut(&job_id) {
            Some(active) if job.status == JobStatus::Paused => active,
            _ => {
                return Err(CoordinatorError::InvalidState {
                    job_id,
                    status: job.status,
                    operation: "resume",
                });
            }
        };

        let held = active.held_outcome.take();
        if held.is_none() {
            self.engine.resume(active.handle)?;
        }
        job.transition(JobStatus::Running)?;
        // Time spent paused does not count against the deadline.
        if let Some(paused_at) = active.paused_at.take()
            && let Ok(paused) = chrono::Duration::from_std(paused_at.elapsed())
            && let Some(deadline) = active.task.deadline.checked_add_signed(paused)
        {
            active.task.deadline = deadline;
        }

        tracing::info!("Resumed job {}", job_id);
        self.emitter.publish(EventKind::JobResumed { job_id });
        if let Some(outcome) = held {
            self.settle(job_id, outcome);
        }
        Ok(())
    }

    /// Fail running jobs that are past their deadline.
    fn expire_overdue(&mut self) {
        let now = Utc::now();
        let overdue: Vec<(JobId, EngineHandle, Duration)> = self
            .active
            .iter()
            .filter(|(_, active)| active.paused_at.is_none() && active.task.is_overdue(now))
            .map(|(id, active)| (*id, active.handle, active.timeout))
            .collect();

        for (job_id, handle, timeout) in overdue {
            if let Err(e) = self.engine.cancel(handle) {
                tracing::warn!("Engine cancel failed for job {}: {}", job_id, e);
            }
            self.settle(
                job_id,
                EngineOutcome::Failed {
                    error: format!("timed out after {}s", timeout.as_secs_f64()),
                },
            );
        }
    }

    fn list(&self, status: Option<JobStatus>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.sequence);
        jobs
    }

    fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Paused => stats.paused += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        if self.completed_count > 0 {
            stats.avg_duration_ms =
                Some(self.completed_duration_ms as f64 / self.completed_count as f64);
        }
        stats
    }

    /// Cancel everything still in flight.
    fn drain(&mut self) {
        let unfinished: Vec<JobId> = self
            .list(None)
            .into_iter()
            .filter(|job| !job.status.is_terminal())
            .map(|job| job.id)
            .collect();
        for job_id in unfinished {
            if let Err(e) = self.cancel(job_id) {
                tracing::warn!("Could not cancel job {} on shutdown: {}", job_id, e);
            }
        }
    }
}

fn release_agent(swarm: &AgentSwarm, agent_id: &AgentId, outcome: TaskOutcome) {
    if let Err(e) = swarm.release(agent_id, outcome) {
        tracing::warn!("Failed to release agent {}: {}", agent_id, e);
    }
}

/// Poll one engine run and forward what it reports until it finishes.
fn spawn_poller(
    queue: ActorRef<QueueMessage>,
    engine: Arc<dyn EngineAdapter>,
    job_id: JobId,
    handle: EngineHandle,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let polled = catch_unwind(AssertUnwindSafe(|| engine.poll(handle)));
            let message = match polled {
                Ok(Ok(EnginePoll::Running(snapshot))) => {
                    QueueMessage::EngineProgress { job_id, snapshot }
                }
                Ok(Ok(EnginePoll::Finished(outcome))) => {
                    QueueMessage::EngineFinished { job_id, outcome }
                }
                Ok(Err(e)) => QueueMessage::EngineFinished {
                    job_id,
                    outcome: EngineOutcome::Failed {
                        error: e.to_string(),
                    },
                },
                Err(_) => {
                    tracing::error!("Engine {} panicked polling {}", engine.name(), handle);
                    QueueMessage::EngineFinished {
                        job_id,
                        outcome: EngineOutcome::Failed {
                            error: format!("engine {} panicked", engine.name()),
                        },
                    }
                }
            };
            let finished = matches!(message, QueueMessage::EngineFinished { .. });
            if queue.send_message(message).is_err() || finished {
                break;
            }
        }
    })
}

/// Queue actor that schedules jobs onto swarm agents.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting queue actor (concurrency {}, engine {})",
            args.config.concurrency,
            args.engine.name()
        );
        let mut state = QueueActorState::new(args);

        // Any agent becoming idle may unblock a queued job.
        let wake = myself.clone();
        let subscription = state.emitter.subscribe(
            EventFilter::types([EventType::AgentStatusChanged]),
            move |event: &CompressionEvent| -> Result<(), SubscriberError> {
                if let EventKind::AgentStatusChanged {
                    new_status: AgentStatus::Idle,
                    ..
                } = &event.kind
                {
                    wake.send_message(QueueMessage::Schedule)
                        .map_err(|e| SubscriberError::new(e.to_string()))?;
                }
                Ok(())
            },
        )?;
        state.subscription = Some(subscription);

        // Start periodic scheduling tick
        let myself_clone = myself.clone();
        let period = state.config.schedule_interval();
        state.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if myself_clone.send_message(QueueMessage::Schedule).is_err() {
                    break;
                }
            }
        }));

        Ok(state)
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(subscription) = state.subscription.take() {
            state.emitter.unsubscribe(subscription);
        }
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        state.drain();
        tracing::info!("Queue actor stopped");
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Submit {
                config,
                priority,
                reply,
            } => {
                let result = state.submit(*config, priority);
                let accepted = result.is_ok();
                let _ = reply.send(result);
                if accepted {
                    state.schedule(&myself);
                }
            }

            QueueMessage::Cancel { job_id, reply } => {
                let result = state.cancel(job_id);
                let freed = result.is_ok();
                let _ = reply.send(result);
                if freed {
                    state.schedule(&myself);
                }
            }

            QueueMessage::Pause { job_id, reply } => {
                let _ = reply.send(state.pause(job_id));
            }

            QueueMessage::Resume { job_id, reply } => {
                let _ = reply.send(state.resume(job_id));
            }

            QueueMessage::GetJob { job_id, reply } => {
                let _ = reply.send(state.jobs.get(&job_id).cloned());
            }

            QueueMessage::ListJobs { status, reply } => {
                let _ = reply.send(state.list(status));
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            QueueMessage::EngineProgress { job_id, snapshot } => {
                state.on_progress(job_id, snapshot);
            }

            QueueMessage::EngineFinished { job_id, outcome } => {
                state.on_finished(job_id, outcome);
                state.schedule(&myself);
            }

            QueueMessage::Schedule => {
                state.schedule(&myself);
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue actor");
                myself.stop(None);
            }
        }

        Ok(())
    }
}

/// Caller-facing handle to a running [`QueueActor`].
pub struct JobQueue {
    actor: ActorRef<QueueMessage>,
    handle: JoinHandle<()>,
}

impl JobQueue {
    /// Spawn a queue actor over `swarm` and `engine`.
    pub async fn spawn(args: QueueArgs) -> CoordinatorResult<Self> {
        let (actor, handle) = Actor::spawn(None, QueueActor, args)
            .await
            .map_err(|e| CoordinatorError::Actor(format!("failed to spawn queue: {e}")))?;
        Ok(Self { actor, handle })
    }

    pub fn actor(&self) -> &ActorRef<QueueMessage> {
        &self.actor
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(RpcReplyPort<T>) -> QueueMessage,
    ) -> CoordinatorResult<T>
    where
        T: Send + 'static,
    {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(build(tx.into()))
            .map_err(|e| CoordinatorError::Actor(e.to_string()))?;
        rx.await
            .map_err(|_| CoordinatorError::Actor("queue actor dropped the request".into()))
    }

    /// Submit a job. Fails on malformed configuration or a capability no
    /// agent provides; in both cases no job is created.
    pub async fn submit(&self, config: JobConfig, priority: Priority) -> CoordinatorResult<JobId> {
        self.request(|reply| QueueMessage::Submit {
            config: Box::new(config),
            priority,
            reply,
        })
        .await?
    }

    pub async fn cancel(&self, job_id: JobId) -> CoordinatorResult<()> {
        self.request(|reply| QueueMessage::Cancel { job_id, reply })
            .await?
    }

    pub async fn pause(&self, job_id: JobId) -> CoordinatorResult<()> {
        self.request(|reply| QueueMessage::Pause { job_id, reply })
            .await?
    }

    pub async fn resume(&self, job_id: JobId) -> CoordinatorResult<()> {
        self.request(|reply| QueueMessage::Resume { job_id, reply })
            .await?
    }

    pub async fn job(&self, job_id: JobId) -> CoordinatorResult<Option<Job>> {
        self.request(|reply| QueueMessage::GetJob { job_id, reply })
            .await
    }

    /// Jobs in submission order, optionally only those in `status`.
    pub async fn jobs(&self, status: Option<JobStatus>) -> CoordinatorResult<Vec<Job>> {
        self.request(|reply| QueueMessage::ListJobs { status, reply })
            .await
    }

    pub async fn stats(&self) -> CoordinatorResult<QueueStats> {
        self.request(|reply| QueueMessage::GetStats { reply }).await
    }

    /// Number of jobs waiting for an agent.
    pub async fn queue_len(&self) -> CoordinatorResult<u64> {
        Ok(self.stats().await?.queued)
    }

    /// Stop the actor, cancelling unfinished jobs, and wait for it to exit.
    pub async fn shutdown(self) -> CoordinatorResult<()> {
        self.actor
            .send_message(QueueMessage::Shutdown)
            .map_err(|e| CoordinatorError::Actor(e.to_string()))?;
        self.handle
            .await
            .map_err(|e| CoordinatorError::Actor(format!("queue actor panicked: {e}")))
    }
}
