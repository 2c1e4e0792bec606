//! Message bus for evaluation events
//!
//! The orchestrator publishes state transitions, provider failures and
//! fallbacks here so observers (the CLI progress output, tests) can follow an
//! evaluation without being coupled to it. Subscribers get bounded channels;
//! an event for a full or closed channel is dropped instead of stalling the
//! evaluation.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::orchestrator::EvaluationState;
use sdk::types::{Capability, CefrLevel};

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be subscribed to
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    StateChanged,
    ProviderFailed,
    LocalFallback,
    EvaluationCompleted,
    EvaluationFailed,
    /// Subscribe to all event types
    All,
}

/// Events published during an evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StateChanged {
        conversation_id: String,
        from: EvaluationState,
        to: EvaluationState,
    },
    /// A provider call failed; the next provider in the chain is tried
    ProviderFailed {
        conversation_id: String,
        capability: Capability,
        provider: String,
        error: String,
    },
    /// The chain was exhausted and the local heuristic was used
    LocalFallback {
        conversation_id: String,
        capability: Capability,
    },
    EvaluationCompleted {
        conversation_id: String,
        overall_score: f64,
        level: CefrLevel,
    },
    /// Failed or cancelled
    EvaluationFailed {
        conversation_id: String,
        error: String,
    },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::StateChanged { .. } => EventType::StateChanged,
            Event::ProviderFailed { .. } => EventType::ProviderFailed,
            Event::LocalFallback { .. } => EventType::LocalFallback,
            Event::EvaluationCompleted { .. } => EventType::EvaluationCompleted,
            Event::EvaluationFailed { .. } => EventType::EvaluationFailed,
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            Event::StateChanged { conversation_id, .. }
            | Event::ProviderFailed { conversation_id, .. }
            | Event::LocalFallback { conversation_id, .. }
            | Event::EvaluationCompleted { conversation_id, .. }
            | Event::EvaluationFailed { conversation_id, .. } => conversation_id,
        }
    }
}

/// Pub/sub bus with bounded per-subscriber channels
pub struct MessageBus {
    /// Map of event types to lists of subscribers
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or [`EventType::All`]
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers of its type and of `All`.
    ///
    /// Closed subscribers are removed.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!("Subscriber channel full, dropping {:?} event", event_type);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    /// Number of live subscribers across all event types
    pub async fn subscriber_count(&self) -> usize {
        let channels = self.channels.lock().await;
        channels
            .values()
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .sum()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
