//! Envelope store contract and in-memory implementation

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::envelope::{Envelope, EnvelopeId};

/// Events published by [`MemoryStore`]
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A completed envelope was recorded
    Added(Arc<Envelope>),
    /// An envelope was dropped from the store
    Removed(EnvelopeId),
}

/// Where sessions hand off completed envelopes.
///
/// `add` is called exactly once per completed envelope, before the client
/// sees the final DATA reply. Implementations shared between connections
/// serialize their own mutations.
pub trait EnvelopeStore: Send + Sync {
    /// Record a completed envelope and make it retrievable by id
    fn add(&self, envelope: Envelope) -> EnvelopeId;

    /// Look up a previously added envelope
    fn get(&self, id: &EnvelopeId) -> Option<Arc<Envelope>>;

    /// Drop an envelope, returning it if it was present
    fn remove(&self, id: &EnvelopeId) -> Option<Arc<Envelope>>;
}

/// Default capacity of the event channel; slow subscribers lag, never block
const EVENT_CAPACITY: usize = 256;

/// In-memory store backed by a `HashMap` behind an `RwLock`
#[derive(Debug, Clone)]
pub struct MemoryStore {
    envelopes: Arc<RwLock<HashMap<EnvelopeId, Arc<Envelope>>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            envelopes: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Receive an event for every add and remove from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.envelopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored ids, oldest first
    pub fn ids(&self) -> Vec<EnvelopeId> {
        let mut ids: Vec<_> = self
            .envelopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine
        if self.events.send(event).is_err() {
            trace!("No store event subscribers");
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeStore for MemoryStore {
    fn add(&self, envelope: Envelope) -> EnvelopeId {
        let id = envelope.id();
        let envelope = Arc::new(envelope);

        self.envelopes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&envelope));
        debug!(%id, "Envelope added to store");

        self.publish(StoreEvent::Added(envelope));
        id
    }

    fn get(&self, id: &EnvelopeId) -> Option<Arc<Envelope>> {
        self.envelopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn remove(&self, id: &EnvelopeId) -> Option<Arc<Envelope>> {
        let removed = self
            .envelopes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);

        if removed.is_some() {
            debug!(%id, "Envelope removed from store");
            self.publish(StoreEvent::Removed(*id));
        }
        removed
    }
}
