//! Event emitter: sequences compression events and fans them out.
//!
//! Every subscriber gets its own delivery task fed by an unbounded channel,
//! so a slow or failing subscriber never holds up the publisher or its
//! siblings. A bounded history lets late joiners replay recent events.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use compactor_core::{CompressionEvent, EventConfig, EventFilter, EventKind};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Error reported by a subscriber callback. Logged, never propagated.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct SubscriberError(String);

impl SubscriberError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors from emitter operations.
#[derive(Debug, thiserror::Error)]
pub enum EmitterError {
    #[error("callback subscriptions require a running Tokio runtime")]
    NoRuntime,
}

/// Receives events from an [`EventEmitter`].
pub trait EventSubscriber: Send + Sync + 'static {
    fn on_event(&self, event: &CompressionEvent) -> Result<(), SubscriberError>;
}

impl<F> EventSubscriber for F
where
    F: Fn(&CompressionEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
{
    fn on_event(&self, event: &CompressionEvent) -> Result<(), SubscriberError> {
        self(event)
    }
}

struct Slot {
    id: SubscriptionId,
    filter: EventFilter,
    tx: mpsc::UnboundedSender<CompressionEvent>,
}

struct EmitterState {
    next_sequence: u64,
    next_subscription: u64,
    history: VecDeque<CompressionEvent>,
    slots: Vec<Slot>,
}

/// Pub/sub hub for compression events.
pub struct EventEmitter {
    state: Mutex<EmitterState>,
    capacity: usize,
}

impl EventEmitter {
    /// Create an emitter that keeps `history_capacity` recent events.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: Mutex::new(EmitterState {
                next_sequence: 0,
                next_subscription: 0,
                history: VecDeque::with_capacity(history_capacity),
                slots: Vec::new(),
            }),
            capacity: history_capacity.max(1),
        }
    }

    pub fn from_config(config: &EventConfig) -> Self {
        Self::new(config.history_capacity)
    }

    /// Register a callback for events matching `filter`.
    ///
    /// Must be called inside a Tokio runtime; the callback runs on a task of
    /// its own. Errors and panics raised by the callback are logged.
    pub fn subscribe(
        &self,
        filter: EventFilter,
        subscriber: impl EventSubscriber,
    ) -> Result<SubscriptionId, EmitterError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EmitterError::NoRuntime)?;
        let (id, mut rx) = self.subscribe_channel(filter);

        runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                match catch_unwind(AssertUnwindSafe(|| subscriber.on_event(&event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(
                            "Subscriber {} failed on event #{}: {}",
                            id,
                            event.sequence,
                            e
                        );
                    }
                    Err(_) => {
                        tracing::error!("Subscriber {} panicked on event #{}", id, event.sequence);
                    }
                }
            }
            tracing::debug!("Subscriber {} delivery stopped", id);
        });

        Ok(id)
    }

    /// Register a channel that receives events matching `filter`.
    ///
    /// Dropping the receiver ends the subscription on the next publish.
    pub fn subscribe_channel(
        &self,
        filter: EventFilter,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<CompressionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        state.slots.push(Slot { id, filter, tx });
        (id, rx)
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        let before = state.slots.len();
        state.slots.retain(|slot| slot.id != id);
        state.slots.len() != before
    }

    /// Stamp `kind` with the next sequence number and deliver it.
    pub fn publish(&self, kind: EventKind) -> CompressionEvent {
        let mut state = self.state.lock();
        state.next_sequence += 1;
        let event = CompressionEvent {
            sequence: state.next_sequence,
            timestamp: Utc::now(),
            kind,
        };
        tracing::debug!("Event #{}: {}", event.sequence, event.kind.description());

        if state.history.len() >= self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(event.clone());

        state.slots.retain(|slot| {
            if !slot.filter.matches(&event) {
                return true;
            }
            let delivered = slot.tx.send(event.clone()).is_ok();
            if !delivered {
                tracing::debug!("Dropping closed subscriber {}", slot.id);
            }
            delivered
        });

        event
    }

    /// The last `n` events, oldest first.
    pub fn get_recent(&self, n: usize) -> Vec<CompressionEvent> {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(n);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Sequence number of the most recent event (0 if none).
    pub fn last_sequence(&self) -> u64 {
        self.state.lock().next_sequence
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().slots.len()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::from_config(&EventConfig::default())
    }
}

/// Process-wide emitter used when a component is not handed one.
static DEFAULT_EMITTER: LazyLock<RwLock<Option<Arc<EventEmitter>>>> =
    LazyLock::new(|| RwLock::new(None));

/// Get the process-wide emitter, installing a default one on first use.
pub fn default_emitter() -> Arc<EventEmitter> {
    default_emitter_or_else(EventEmitter::default)
}

/// Get the process-wide emitter, installing the one built by `make` if none
/// is set yet.
pub fn default_emitter_or_else(make: impl FnOnce() -> EventEmitter) -> Arc<EventEmitter> {
    if let Some(emitter) = DEFAULT_EMITTER.read().as_ref() {
        return emitter.clone();
    }
    DEFAULT_EMITTER
        .write()
        .get_or_insert_with(|| Arc::new(make()))
        .clone()
}

/// Replace the process-wide emitter, returning the previous one.
///
/// Call once at startup. Test harnesses that swap it must put the previous
/// instance back when they finish.
pub fn set_default_emitter(emitter: Arc<EventEmitter>) -> Option<Arc<EventEmitter>> {
    DEFAULT_EMITTER.write().replace(emitter)
}

/// Remove the process-wide emitter so the next caller installs a fresh one.
pub fn take_default_emitter() -> Option<Arc<EventEmitter>> {
    DEFAULT_EMITTER.write().take()
}
