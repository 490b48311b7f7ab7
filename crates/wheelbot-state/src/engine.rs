use std::collections::VecDeque;

use tracing::debug;

use crate::error::PropertyError;
use crate::observers::{ChangeEvent, Effects, Observer, ObserverBus};
use crate::store::{PropertyStore, Proposal};
use crate::value::PropertyValue;

/// Where a write came from.
///
/// Remote-originated changes are applied locally but never pushed back up,
/// otherwise the two writers echo each other's changes indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// Local API caller.
    Local,
    /// Output of a script iteration.
    Script,
    /// A key from a remote document snapshot.
    Remote,
}

/// One accepted change out of [`StateEngine::apply`], with the push
/// decision already made.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub name: String,
    pub value: PropertyValue,
    /// Whether this change must be merge-written to the remote document.
    pub push: bool,
}

/// The single entry point for mutating properties.
///
/// `apply` validates the write, mutates the store, dispatches observers and
/// then drains any follow-up writes the observers queued, each of which
/// passes through the same validation. Dispatch is iterative, so a
/// cross-linked pair that converges on the same value terminates on the
/// validator's equality guard rather than recursing.
pub struct StateEngine {
    store: PropertyStore,
    bus: ObserverBus,
}

impl StateEngine {
    pub fn new(store: PropertyStore) -> Self {
        Self {
            store,
            bus: ObserverBus::new(),
        }
    }

    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    pub fn subscribe(&mut self, name: &str, observer: Observer) -> Result<(), PropertyError> {
        self.bus.subscribe(&self.store, name, observer)
    }

    /// Validated write plus everything it ripples into.
    ///
    /// Returns the accepted changes in application order: the direct write
    /// first (when accepted), observer ripples after. A suppressed no-op
    /// yields an empty list. Validation failures abort the call; changes
    /// already applied at that point stay applied.
    pub fn apply(
        &mut self,
        name: &str,
        value: PropertyValue,
        origin: WriteOrigin,
    ) -> Result<Vec<AppliedChange>, PropertyError> {
        let mut applied = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back((name.to_string(), value, false));

        while let Some((name, value, ripple)) = queue.pop_front() {
            let new = value.clone();
            let old = match self.store.propose(&name, value)? {
                Proposal::Unchanged => continue,
                Proposal::Accepted { old } => old,
            };
            debug!(target: "state", "{:?} write {}: {} -> {}", origin, name, old, new);

            let event = ChangeEvent {
                name: name.clone(),
                old,
                new: new.clone(),
            };
            let mut effects = Effects::default();
            self.bus.notify(&event, &self.store, &mut effects);
            for (next_name, next_value) in effects.into_writes() {
                queue.push_back((next_name, next_value, true));
            }

            // Ripples are locally computed even when the trigger was remote;
            // they still have to reach the document.
            let push = ripple || origin != WriteOrigin::Remote;
            applied.push(AppliedChange { name, value: new, push });
        }

        Ok(applied)
    }
}
