/// Core state handling for wheelbot
///
/// Everything that mutates a bot property funnels through this crate: the
/// property registry, the change validator, observer dispatch and the
/// cross-link bindings between logical speeds and physical motors. No I/O
/// happens here; synchronization and scripting live in their own crates and
/// drive this one through `StateEngine::apply`.
pub mod engine;
pub mod error;
pub mod links;
pub mod observers;
pub mod shutdown;
pub mod store;
pub mod value;

pub use engine::{AppliedChange, StateEngine, WriteOrigin};
pub use error::PropertyError;
pub use links::{install_drive_links, DriveLinkNames};
pub use observers::{ChangeEvent, Effects, Observer, ObserverBus};
pub use shutdown::install_shutdown_values;
pub use store::{PropertyStore, Proposal};
pub use value::{PropertyKind, PropertyValue};
