/// Remote document synchronization
///
/// Keeps a [`wheelbot_state::StateEngine`] eventually consistent with one
/// remote key-value document. The document store itself is a collaborator
/// behind the [`DocumentStore`] trait; this crate only knows its contract
/// (point read, merge write, push-style snapshot subscription, offline).
pub mod engine;
pub mod memory;
pub mod path;
pub mod store;

pub use engine::SyncEngine;
pub use memory::MemoryStore;
pub use path::DocPath;
pub use store::{DocFields, DocSnapshot, DocumentStore, SyncError};
