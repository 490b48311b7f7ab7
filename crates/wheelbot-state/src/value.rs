use serde::{Deserialize, Serialize};
use std::fmt;

/// A synchronized property value.
///
/// The remote document stores a flat map of scalars, so serialization is
/// untagged: a `Bool` is a JSON boolean, a `Double` a number, a `Text` a
/// string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Double(f64),
    Text(String),
}

/// The fixed kind of a registered property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Bool,
    Double,
    Text,
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Double(_) => PropertyKind::Double,
            PropertyValue::Text(_) => PropertyKind::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Double(d) => write!(f, "{}", d),
            PropertyValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::Bool => write!(f, "Bool"),
            PropertyKind::Double => write!(f, "Double"),
            PropertyKind::Text => write!(f, "Text"),
        }
    }
}

/// Distance from `x` to the next representable f64 of larger magnitude.
///
/// The validator treats doubles closer than 5 ulp as the same value; a
/// round-trip through the wire perturbs the last bit or two and must not
/// read back as a fresh change.
pub(crate) fn ulp(x: f64) -> f64 {
    let x = x.abs();
    if !x.is_finite() {
        return f64::NAN;
    }
    f64::from_bits(x.to_bits() + 1) - x
}
