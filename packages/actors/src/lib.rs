//! Runtime for the compression coordinator.
//!
//! This crate provides the event emitter, the agent swarm and the
//! Ractor-based job queue that drives compression engines.
//!
//! # Architecture
//!
//! - `EventEmitter` - Sequenced pub/sub hub with a bounded replay history
//! - `AgentSwarm` - Registry of tiered agents, selection and health
//! - `QueueActor` - Schedules one queue's jobs onto agents and engine runs
//! - `EngineAdapter` - Boundary to the compression backend (`StubEngine`,
//!   `BlockingEngine`)
//!
//! # Usage
//!
//! ```ignore
//! use actors::{StubEngine, start_coordinator};
//! use compactor_core::{CoordinatorConfig, JobConfig, Priority};
//!
//! let coordinator = start_coordinator(CoordinatorConfig::default(), Arc::new(StubEngine::default())).await?;
//! let job_id = coordinator
//!     .queue()
//!     .submit(JobConfig::compress("/srv/logs/app.log"), Priority::High)
//!     .await?;
//! ```

mod codec;
mod coordinator;
mod emitter;
mod engine;
mod error;
mod messages;
mod queue_actor;
mod selection;
mod swarm;

pub use codec::{BlockingEngine, Codec, CodecControl, CodecError, StoreCodec};
pub use coordinator::{Coordinator, start_coordinator, start_coordinator_with};
pub use emitter::{
    EmitterError, EventEmitter, EventSubscriber, SubscriberError, SubscriptionId,
    default_emitter, default_emitter_or_else, set_default_emitter, take_default_emitter,
};
pub use engine::{
    EngineAdapter, EngineError, EngineHandle, EngineOutcome, EnginePoll, ProgressSnapshot,
    SIZE_OPTION, StubEngine,
};
pub use error::{CoordinatorError, CoordinatorResult, SwarmError};
pub use messages::QueueMessage;
pub use queue_actor::{JobQueue, QueueActor, QueueArgs};
pub use selection::{Candidate, FallbackPolicy, Selection, select_agent};
pub use swarm::AgentSwarm;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};
