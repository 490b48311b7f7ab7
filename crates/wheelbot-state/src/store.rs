use std::collections::BTreeMap;

use tracing::debug;

use crate::error::PropertyError;
use crate::value::{ulp, PropertyKind, PropertyValue};

#[derive(Debug, Clone)]
struct Property {
    value: PropertyValue,
    shutdown: Option<PropertyValue>,
}

/// Name-keyed registry of typed property values.
///
/// Registration is explicit and happens once, while the owning bot is being
/// constructed and before synchronization starts. The kind of an entry is
/// fixed by its initial value and never changes afterwards.
#[derive(Debug, Default)]
pub struct PropertyStore {
    entries: BTreeMap<String, Property>,
}

/// Outcome of a validated write.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    /// The value was different enough to store; `old` is what it replaced.
    Accepted { old: PropertyValue },
    /// Same (or negligibly different) value; nothing was stored.
    Unchanged,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a property. Panics on duplicate names: the registry is
    /// built once during construction and a duplicate is a wiring bug.
    pub fn register(&mut self, name: impl Into<String>, initial: PropertyValue) {
        self.register_entry(name.into(), initial, None);
    }

    /// Register a property that gets forced to `shutdown` when the running
    /// flag transitions to false.
    pub fn register_with_shutdown(
        &mut self,
        name: impl Into<String>,
        initial: PropertyValue,
        shutdown: PropertyValue,
    ) {
        self.register_entry(name.into(), initial, Some(shutdown));
    }

    fn register_entry(&mut self, name: String, initial: PropertyValue, shutdown: Option<PropertyValue>) {
        if let Some(shutdown) = &shutdown {
            assert_eq!(
                shutdown.kind(),
                initial.kind(),
                "shutdown value for '{}' must match the property kind",
                name
            );
        }
        let previous = self.entries.insert(
            name.clone(),
            Property {
                value: initial,
                shutdown,
            },
        );
        assert!(previous.is_none(), "property '{}' registered twice", name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries.get(name).map(|p| &p.value)
    }

    pub fn kind(&self, name: &str) -> Option<PropertyKind> {
        self.entries.get(name).map(|p| p.value.kind())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Current value of every property, in name order.
    pub fn snapshot(&self) -> BTreeMap<String, PropertyValue> {
        self.entries
            .iter()
            .map(|(name, p)| (name.clone(), p.value.clone()))
            .collect()
    }

    /// Every property with a configured shutdown value, in name order.
    pub fn shutdown_entries(&self) -> Vec<(String, PropertyValue)> {
        self.entries
            .iter()
            .filter_map(|(name, p)| p.shutdown.clone().map(|v| (name.clone(), v)))
            .collect()
    }

    /// The only sanctioned mutation path. Validates, then stores in place on
    /// acceptance; rejected and suppressed proposals leave the entry alone.
    pub fn propose(&mut self, name: &str, value: PropertyValue) -> Result<Proposal, PropertyError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| PropertyError::UnknownProperty(name.to_string()))?;
        if !validate_change(name, &entry.value, &value)? {
            debug!(target: "state", "ignoring no-op write {}={}", name, value);
            return Ok(Proposal::Unchanged);
        }
        let old = std::mem::replace(&mut entry.value, value);
        Ok(Proposal::Accepted { old })
    }
}

/// Decide whether a proposed change is legal and non-trivial.
///
/// Rules, first match wins: unknown kinds never reach here (the store
/// resolves the entry first); a kind mismatch is an error; booleans change
/// when different; doubles must sit in [-1.0, 1.0] and differ by at least
/// 5 ulp; strings change when their trimmed forms differ.
pub fn validate_change(
    name: &str,
    old: &PropertyValue,
    new: &PropertyValue,
) -> Result<bool, PropertyError> {
    match (old, new) {
        (PropertyValue::Bool(o), PropertyValue::Bool(n)) => Ok(n != o),
        (PropertyValue::Double(o), PropertyValue::Double(n)) => {
            if !(-1.0..=1.0).contains(n) {
                return Err(PropertyError::OutOfRange {
                    name: name.to_string(),
                    value: *n,
                });
            }
            if (n - o).abs() < ulp(*n) * 5.0 {
                debug!(target: "state", "ignoring too-close doubles {}=({} to {})", name, o, n);
                return Ok(false);
            }
            Ok(true)
        }
        (PropertyValue::Text(o), PropertyValue::Text(n)) => Ok(n.trim() != o.trim()),
        (old, new) => Err(PropertyError::TypeMismatch {
            name: name.to_string(),
            expected: old.kind(),
            got: new.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PropertyStore {
        let mut store = PropertyStore::new();
        store.register("running", PropertyValue::Bool(true));
        store.register_with_shutdown("motor0", PropertyValue::Double(0.0), PropertyValue::Double(0.0));
        store.register("script", PropertyValue::Text(String::new()));
        store
    }

    #[test]
    fn unknown_property_fails() {
        let mut store = store();
        let err = store.propose("nope", PropertyValue::Bool(true)).unwrap_err();
        assert_eq!(err, PropertyError::UnknownProperty("nope".into()));
    }

    #[test]
    fn type_mismatch_fails() {
        let mut store = store();
        let err = store.propose("motor0", PropertyValue::Bool(true)).unwrap_err();
        assert_eq!(
            err,
            PropertyError::TypeMismatch {
                name: "motor0".into(),
                expected: PropertyKind::Double,
                got: PropertyKind::Bool,
            }
        );
    }

    #[test]
    fn out_of_range_rejects_and_keeps_old_value() {
        let mut store = store();
        store.propose("motor0", PropertyValue::Double(0.5)).unwrap();
        let err = store.propose("motor0", PropertyValue::Double(1.5)).unwrap_err();
        assert!(matches!(err, PropertyError::OutOfRange { .. }));
        assert_eq!(store.get("motor0"), Some(&PropertyValue::Double(0.5)));
    }

    #[test]
    fn nan_is_out_of_range() {
        let mut store = store();
        let err = store.propose("motor0", PropertyValue::Double(f64::NAN)).unwrap_err();
        assert!(matches!(err, PropertyError::OutOfRange { .. }));
    }

    #[test]
    fn boundary_values_are_in_range() {
        let mut store = store();
        assert!(matches!(
            store.propose("motor0", PropertyValue::Double(1.0)).unwrap(),
            Proposal::Accepted { .. }
        ));
        assert!(matches!(
            store.propose("motor0", PropertyValue::Double(-1.0)).unwrap(),
            Proposal::Accepted { .. }
        ));
    }

    #[test]
    fn equal_bool_is_a_no_op() {
        let mut store = store();
        assert_eq!(
            store.propose("running", PropertyValue::Bool(true)).unwrap(),
            Proposal::Unchanged
        );
        assert!(matches!(
            store.propose("running", PropertyValue::Bool(false)).unwrap(),
            Proposal::Accepted { .. }
        ));
    }

    #[test]
    fn too_close_doubles_are_suppressed() {
        let mut store = store();
        store.propose("motor0", PropertyValue::Double(0.5)).unwrap();
        // One ulp of drift, the kind a wire round-trip introduces.
        let nearly = f64::from_bits(0.5_f64.to_bits() + 1);
        assert_eq!(
            store.propose("motor0", PropertyValue::Double(nearly)).unwrap(),
            Proposal::Unchanged
        );
        assert_eq!(store.get("motor0"), Some(&PropertyValue::Double(0.5)));
        // A real change still lands.
        assert!(matches!(
            store.propose("motor0", PropertyValue::Double(0.6)).unwrap(),
            Proposal::Accepted { .. }
        ));
    }

    #[test]
    fn trimmed_equal_strings_are_suppressed() {
        let mut store = store();
        store
            .propose("script", PropertyValue::Text("result.motor0 = 0".into()))
            .unwrap();
        assert_eq!(
            store
                .propose("script", PropertyValue::Text("  result.motor0 = 0  ".into()))
                .unwrap(),
            Proposal::Unchanged
        );
        // The stored value keeps whatever whitespace it was accepted with.
        assert_eq!(
            store.get("script"),
            Some(&PropertyValue::Text("result.motor0 = 0".into()))
        );
    }

    #[test]
    fn shutdown_entries_lists_configured_properties() {
        let store = store();
        assert_eq!(
            store.shutdown_entries(),
            vec![("motor0".into(), PropertyValue::Double(0.0))]
        );
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        let mut store = store();
        store.register("motor0", PropertyValue::Double(0.0));
    }
}
