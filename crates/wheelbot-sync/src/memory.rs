use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use crate::path::DocPath;
use crate::store::{DocFields, DocSnapshot, DocumentStore, SyncError};

#[derive(Default)]
struct MemoryInner {
    docs: HashMap<String, DocFields>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<DocSnapshot>>>,
    offline: bool,
}

/// In-process document store for tests and the demo runner.
///
/// Mirrors the behavior the engine relies on from the real store: merge
/// semantics per key, and subscriptions that fire immediately with the
/// current snapshot and again after every merge. A second local writer
/// (test, dashboard stand-in) shares it through `set_merge`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, path: &DocPath) -> Result<DocSnapshot, SyncError> {
        let inner = self.inner.lock().map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(DocSnapshot::new(
            inner.docs.get(&path.to_string()).cloned().unwrap_or_default(),
        ))
    }

    fn set_merge(&self, path: &DocPath, fields: DocFields) -> Result<(), SyncError> {
        let mut guard = self.inner.lock().map_err(|e| SyncError::Store(e.to_string()))?;
        let inner = &mut *guard;
        if inner.offline {
            debug!(target: "sync", "offline, dropping merge write to {}", path);
            return Ok(());
        }
        let key = path.to_string();
        let doc = inner.docs.entry(key.clone()).or_default();
        for (name, value) in fields {
            doc.insert(name, value);
        }
        let snapshot = DocSnapshot::new(doc.clone());
        if let Some(senders) = inner.subscribers.get_mut(&key) {
            senders.retain(|tx| tx.send(snapshot.clone()).is_ok());
        }
        Ok(())
    }

    fn subscribe(&self, path: &DocPath) -> Result<mpsc::UnboundedReceiver<DocSnapshot>, SyncError> {
        let mut inner = self.inner.lock().map_err(|e| SyncError::Store(e.to_string()))?;
        let key = path.to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        // Snapshot listeners fire once with current state on attach.
        let current = DocSnapshot::new(inner.docs.get(&key).cloned().unwrap_or_default());
        let _ = tx.send(current);
        inner.subscribers.entry(key).or_default().push(tx);
        Ok(rx)
    }

    fn go_offline(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.offline = true;
            inner.subscribers.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelbot_state::PropertyValue;

    fn fields(entries: &[(&str, PropertyValue)]) -> DocFields {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn merge_keeps_unrelated_keys() {
        let store = MemoryStore::new();
        let path = DocPath::device("u", "d");
        store
            .set_merge(&path, fields(&[("motor0", PropertyValue::Double(0.5))]))
            .unwrap();
        store
            .set_merge(&path, fields(&[("running", PropertyValue::Bool(true))]))
            .unwrap();
        let snapshot = store.get(&path).unwrap();
        assert_eq!(snapshot.fields.len(), 2);
        assert_eq!(snapshot.fields["motor0"], PropertyValue::Double(0.5));
    }

    #[tokio::test]
    async fn subscribe_fires_with_current_state_then_on_changes() {
        let store = MemoryStore::new();
        let path = DocPath::device("u", "d");
        store
            .set_merge(&path, fields(&[("motor0", PropertyValue::Double(0.1))]))
            .unwrap();

        let mut rx = store.subscribe(&path).unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.fields["motor0"], PropertyValue::Double(0.1));

        store
            .set_merge(&path, fields(&[("motor0", PropertyValue::Double(0.2))]))
            .unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.fields["motor0"], PropertyValue::Double(0.2));
    }

    #[test]
    fn offline_drops_writes_and_subscriptions() {
        let store = MemoryStore::new();
        let path = DocPath::device("u", "d");
        store.go_offline();
        store
            .set_merge(&path, fields(&[("motor0", PropertyValue::Double(0.5))]))
            .unwrap();
        assert!(store.get(&path).unwrap().fields.is_empty());
    }
}
