use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use wheelbot_state::PropertyValue;

use crate::path::DocPath;

/// Flat key → scalar content of a document. No nesting.
pub type DocFields = BTreeMap<String, PropertyValue>;

/// One point-in-time view of a remote document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocSnapshot {
    pub fields: DocFields,
}

impl DocSnapshot {
    pub fn new(fields: DocFields) -> Self {
        Self { fields }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("document store: {0}")]
    Store(String),
}

/// Remote document store collaborator.
///
/// The engine depends only on this contract, not on any particular store's
/// wire protocol. Merge writes are fire-and-forget at this boundary:
/// implementations queue and deliver on their own schedule, last write wins
/// per key. Subscriptions are push-driven; the receiver gets a snapshot on
/// every remote change, starting with the current one.
pub trait DocumentStore: Send + Sync {
    /// Point read of the current document.
    fn get(&self, path: &DocPath) -> Result<DocSnapshot, SyncError>;

    /// Partial update: merge `fields` into the document, leaving other keys
    /// alone.
    fn set_merge(&self, path: &DocPath, fields: DocFields) -> Result<(), SyncError>;

    /// Open a standing snapshot subscription.
    fn subscribe(&self, path: &DocPath) -> Result<mpsc::UnboundedReceiver<DocSnapshot>, SyncError>;

    /// Drop the connection; outstanding writes are flushed or abandoned
    /// best-effort.
    fn go_offline(&self);
}
