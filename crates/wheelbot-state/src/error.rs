use thiserror::Error;

use crate::value::PropertyKind;

/// Contract violations on the validated write path.
///
/// These indicate a programming error in the caller (or a degraded remote
/// peer) and abort the call loudly. A change suppressed by the
/// equality/epsilon guard is not an error and never shows up here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PropertyError {
    #[error("unknown property '{0}'")]
    UnknownProperty(String),

    #[error("property '{name}' holds {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: PropertyKind,
        got: PropertyKind,
    },

    #[error("property '{name}' out of range: {value}")]
    OutOfRange { name: String, value: f64 },
}
