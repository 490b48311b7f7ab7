use std::collections::HashMap;

use tracing::debug;

use crate::error::PropertyError;
use crate::store::PropertyStore;
use crate::value::PropertyValue;

/// An accepted change, as observers see it.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub name: String,
    pub old: PropertyValue,
    pub new: PropertyValue,
}

/// Follow-up work requested by observers.
///
/// Observers never mutate the store directly; writes queued here re-enter
/// the validated write path after the triggering dispatch returns, never
/// inside it.
#[derive(Debug, Default)]
pub struct Effects {
    writes: Vec<(String, PropertyValue)>,
}

impl Effects {
    pub fn set(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.writes.push((name.into(), value));
    }

    pub(crate) fn into_writes(self) -> Vec<(String, PropertyValue)> {
        self.writes
    }
}

pub type Observer = Box<dyn FnMut(&ChangeEvent, &PropertyStore, &mut Effects) + Send + 'static>;

/// Per-property callback lists, invoked synchronously in registration order
/// after a change is accepted.
#[derive(Default)]
pub struct ObserverBus {
    observers: HashMap<String, Vec<Observer>>,
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer to a property. Fails for names that were never
    /// registered in the store.
    pub fn subscribe(
        &mut self,
        store: &PropertyStore,
        name: &str,
        observer: Observer,
    ) -> Result<(), PropertyError> {
        if !store.contains(name) {
            return Err(PropertyError::UnknownProperty(name.to_string()));
        }
        self.observers.entry(name.to_string()).or_default().push(observer);
        Ok(())
    }

    pub fn count(&self, name: &str) -> usize {
        self.observers.get(name).map_or(0, Vec::len)
    }

    pub(crate) fn notify(&mut self, event: &ChangeEvent, store: &PropertyStore, effects: &mut Effects) {
        let Some(list) = self.observers.get_mut(&event.name) else {
            return;
        };
        if !list.is_empty() {
            debug!(target: "state", "running {} observer(s) on '{}'", list.len(), event.name);
        }
        for observer in list.iter_mut() {
            observer(event, store, effects);
        }
    }
}
