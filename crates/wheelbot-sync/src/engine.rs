use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use wheelbot_state::{AppliedChange, PropertyError, PropertyValue, StateEngine, WriteOrigin};

use crate::path::DocPath;
use crate::store::{DocFields, DocSnapshot, DocumentStore, SyncError};

/// Bridges one [`StateEngine`] to one remote document.
///
/// Locally accepted changes are pushed as single-key merge writes; remote
/// snapshots are filtered through the change validator and applied without
/// pushing back (no echo between the two writers). The engine never
/// reconnects on its own; once the subscription fails it stays degraded and
/// reconnection policy is the document store client's business.
pub struct SyncEngine {
    store: Arc<dyn DocumentStore>,
    path: DocPath,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn DocumentStore>, path: DocPath) -> Self {
        Self { store, path }
    }

    pub fn path(&self) -> &DocPath {
        &self.path
    }

    /// Upload defaults the document is missing, then open the snapshot
    /// subscription.
    pub fn start(&self, local: &DocFields) -> Result<mpsc::UnboundedReceiver<DocSnapshot>, SyncError> {
        info!(target: "sync", "attaching to {}", self.path);
        let remote = self.store.get(&self.path)?;
        let missing: DocFields = local
            .iter()
            .filter(|(name, _)| !remote.fields.contains_key(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if !missing.is_empty() {
            warn!(
                target: "sync",
                "setting missing defaults: {:?}",
                missing.keys().collect::<Vec<_>>()
            );
            self.store.set_merge(&self.path, missing)?;
        }
        self.store.subscribe(&self.path)
    }

    /// Fire-and-forget single-key merge write. Delivery failures are
    /// logged; per-key writes are idempotent so the next accepted change
    /// repairs the document.
    pub fn push(&self, name: &str, value: &PropertyValue) {
        debug!(target: "sync", "push {}={}", name, value);
        let mut fields = DocFields::new();
        fields.insert(name.to_string(), value.clone());
        if let Err(e) = self.store.set_merge(&self.path, fields) {
            error!(target: "sync", "push of {} failed: {}", name, e);
        }
    }

    /// Apply one remote snapshot through the validated write path.
    ///
    /// Every key goes through the validator against the current local
    /// value; suppressed no-ops vanish silently, which is what makes
    /// re-delivered snapshots idempotent. A validation failure is fatal to
    /// the subscription and propagates to the caller.
    pub fn apply_snapshot(
        &self,
        state: &mut StateEngine,
        snapshot: &DocSnapshot,
    ) -> Result<Vec<AppliedChange>, PropertyError> {
        let mut applied = Vec::new();
        for (name, value) in &snapshot.fields {
            let changes = state.apply(name, value.clone(), WriteOrigin::Remote)?;
            applied.extend(changes);
        }
        if !applied.is_empty() {
            debug!(
                target: "sync",
                "remote snapshot applied {} change(s)",
                applied.len()
            );
        }
        Ok(applied)
    }

    /// Release the connection. The running-flag teardown happens upstream,
    /// before this is called, so shutdown values still reach the document.
    pub fn close(&self) {
        info!(target: "sync", "detaching from {}", self.path);
        self.store.go_offline();
    }
}
