//! Composition of emitter, swarm and queue.

use std::sync::Arc;

use compactor_core::{CoordinatorConfig, QueueConfig};

use crate::emitter::{EventEmitter, default_emitter_or_else};
use crate::engine::EngineAdapter;
use crate::error::CoordinatorResult;
use crate::queue_actor::{JobQueue, QueueArgs};
use crate::swarm::AgentSwarm;

/// A running coordinator: one swarm, one primary queue, one emitter.
pub struct Coordinator {
    emitter: Arc<EventEmitter>,
    swarm: Arc<AgentSwarm>,
    engine: Arc<dyn EngineAdapter>,
    queue: JobQueue,
}

impl Coordinator {
    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    pub fn swarm(&self) -> &Arc<AgentSwarm> {
        &self.swarm
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Spawn another queue that shares this coordinator's swarm and engine.
    ///
    /// The caller owns the returned queue and shuts it down.
    pub async fn spawn_queue(&self, config: QueueConfig) -> CoordinatorResult<JobQueue> {
        JobQueue::spawn(QueueArgs {
            config,
            swarm: self.swarm.clone(),
            engine: self.engine.clone(),
            emitter: self.emitter.clone(),
        })
        .await
    }

    /// Stop the primary queue, cancelling its unfinished jobs.
    pub async fn shutdown(self) -> CoordinatorResult<()> {
        self.queue.shutdown().await
    }
}

/// Start a coordinator that publishes on the process-wide emitter.
///
/// An emitter installed earlier is used as is. Otherwise one is built from
/// `config.events` and installed.
pub async fn start_coordinator(
    config: CoordinatorConfig,
    engine: Arc<dyn EngineAdapter>,
) -> CoordinatorResult<Coordinator> {
    let emitter = default_emitter_or_else(|| EventEmitter::from_config(&config.events));
    start_coordinator_with(config, engine, emitter).await
}

/// Start a coordinator on an explicit emitter.
pub async fn start_coordinator_with(
    config: CoordinatorConfig,
    engine: Arc<dyn EngineAdapter>,
    emitter: Arc<EventEmitter>,
) -> CoordinatorResult<Coordinator> {
    config.validate()?;

    let swarm = Arc::new(AgentSwarm::new(config.swarm.clone(), emitter.clone()));
    swarm.initialize(&config.swarm.agents)?;

    let queue = JobQueue::spawn(QueueArgs {
        config: config.queue,
        swarm: swarm.clone(),
        engine: engine.clone(),
        emitter: emitter.clone(),
    })
    .await?;

    tracing::info!(
        "Coordinator started with {} agents on engine {}",
        swarm.swarm_health().total,
        engine.name()
    );
    Ok(Coordinator {
        emitter,
        swarm,
        engine,
        queue,
    })
}
