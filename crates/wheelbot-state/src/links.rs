use tracing::debug;

use crate::engine::StateEngine;
use crate::error::PropertyError;
use crate::observers::Effects;
use crate::store::PropertyStore;
use crate::value::{PropertyKind, PropertyValue};

/// Property names wired into one differential-drive cross-link set.
///
/// `left_speed`/`right_speed` are logical, orientation-independent sliders;
/// `motor0`/`motor1` are the physical channels. Which physical motor is
/// "right" and whether each side runs inverted are themselves synchronized
/// boolean properties, so the mapping is re-derived on every change.
#[derive(Debug, Clone)]
pub struct DriveLinkNames {
    pub left_speed: String,
    pub right_speed: String,
    pub motor0: String,
    pub motor1: String,
    pub motor0_is_right: String,
    pub left_forward: String,
    pub right_forward: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl DriveLinkNames {
    fn sliders(&self) -> [&str; 4] {
        [
            &self.left_speed,
            &self.right_speed,
            &self.motor0,
            &self.motor1,
        ]
    }

    /// Logical side a property currently belongs to.
    fn side_of(&self, name: &str, motor0_is_right: bool) -> Side {
        if name == self.right_speed {
            Side::Right
        } else if name == self.left_speed {
            Side::Left
        } else if name == self.motor0 {
            if motor0_is_right {
                Side::Right
            } else {
                Side::Left
            }
        } else if motor0_is_right {
            Side::Left
        } else {
            Side::Right
        }
    }

    /// The property kept consistent with `name`.
    fn paired(&self, name: &str, motor0_is_right: bool) -> String {
        let paired = if name == self.right_speed {
            if motor0_is_right { &self.motor0 } else { &self.motor1 }
        } else if name == self.left_speed {
            if motor0_is_right { &self.motor1 } else { &self.motor0 }
        } else if name == self.motor0 {
            if motor0_is_right { &self.right_speed } else { &self.left_speed }
        } else if motor0_is_right {
            &self.left_speed
        } else {
            &self.right_speed
        };
        paired.clone()
    }

    /// Sign applied when copying `name` over to its pair.
    fn flip(&self, name: &str, store: &PropertyStore) -> f64 {
        let motor0_is_right = flag(store, &self.motor0_is_right);
        let forward = match self.side_of(name, motor0_is_right) {
            Side::Right => flag(store, &self.right_forward),
            Side::Left => flag(store, &self.left_forward),
        };
        if forward { 1.0 } else { -1.0 }
    }
}

fn flag(store: &PropertyStore, name: &str) -> bool {
    matches!(store.get(name), Some(PropertyValue::Bool(true)))
}

/// Wire the four slider properties together.
///
/// Each gets one observer writing `paired = value * flip` back through the
/// validated path. The paired property's own observer re-derives the
/// original value, which the validator suppresses, so every user-initiated
/// write settles in at most two accepted writes.
pub fn install_drive_links(engine: &mut StateEngine, names: DriveLinkNames) -> Result<(), PropertyError> {
    for slider in names.sliders() {
        expect_kind(engine.store(), slider, PropertyKind::Double)?;
    }
    for toggle in [&names.motor0_is_right, &names.left_forward, &names.right_forward] {
        expect_kind(engine.store(), toggle, PropertyKind::Bool)?;
    }

    for slider in names.sliders().map(str::to_string) {
        let names = names.clone();
        engine.subscribe(
            &slider,
            Box::new(move |event, store, effects: &mut Effects| {
                let Some(value) = event.new.as_double() else {
                    return;
                };
                let motor0_is_right = flag(store, &names.motor0_is_right);
                let paired = names.paired(&event.name, motor0_is_right);
                let flip = names.flip(&event.name, store);
                debug!(
                    target: "state",
                    "cross-link: {}={}, so {}={}",
                    event.name, value, paired, value * flip
                );
                effects.set(paired, PropertyValue::Double(value * flip));
            }),
        )?;
    }
    Ok(())
}

fn expect_kind(store: &PropertyStore, name: &str, expected: PropertyKind) -> Result<(), PropertyError> {
    match store.kind(name) {
        None => Err(PropertyError::UnknownProperty(name.to_string())),
        Some(kind) if kind != expected => Err(PropertyError::TypeMismatch {
            name: name.to_string(),
            expected,
            got: kind,
        }),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WriteOrigin;

    fn names() -> DriveLinkNames {
        DriveLinkNames {
            left_speed: "leftSpeed".into(),
            right_speed: "rightSpeed".into(),
            motor0: "motor0".into(),
            motor1: "motor1".into(),
            motor0_is_right: "isMotor0Right".into(),
            left_forward: "isLeftForward".into(),
            right_forward: "isRightForward".into(),
        }
    }

    fn engine(motor0_is_right: bool, left_forward: bool, right_forward: bool) -> StateEngine {
        let mut store = PropertyStore::new();
        for slider in ["leftSpeed", "rightSpeed", "motor0", "motor1"] {
            store.register(slider, PropertyValue::Double(0.0));
        }
        store.register("isMotor0Right", PropertyValue::Bool(motor0_is_right));
        store.register("isLeftForward", PropertyValue::Bool(left_forward));
        store.register("isRightForward", PropertyValue::Bool(right_forward));
        let mut engine = StateEngine::new(store);
        install_drive_links(&mut engine, names()).unwrap();
        engine
    }

    #[test]
    fn left_speed_drives_motor1_when_motor0_is_right() {
        let mut engine = engine(true, true, true);
        let changes = engine
            .apply("leftSpeed", PropertyValue::Double(0.6), WriteOrigin::Local)
            .unwrap();
        assert_eq!(engine.store().get("motor1"), Some(&PropertyValue::Double(0.6)));
        assert_eq!(engine.store().get("motor0"), Some(&PropertyValue::Double(0.0)));
        // Bounded settling: the slider, its pair, and nothing else.
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].name, "leftSpeed");
        assert_eq!(changes[1].name, "motor1");
    }

    #[test]
    fn right_speed_drives_motor0_when_motor0_is_right() {
        let mut engine = engine(true, true, true);
        engine
            .apply("rightSpeed", PropertyValue::Double(-0.3), WriteOrigin::Local)
            .unwrap();
        assert_eq!(engine.store().get("motor0"), Some(&PropertyValue::Double(-0.3)));
    }

    #[test]
    fn swapped_orientation_swaps_the_pairing() {
        let mut engine = engine(false, true, true);
        engine
            .apply("leftSpeed", PropertyValue::Double(0.5), WriteOrigin::Local)
            .unwrap();
        assert_eq!(engine.store().get("motor0"), Some(&PropertyValue::Double(0.5)));
        assert_eq!(engine.store().get("motor1"), Some(&PropertyValue::Double(0.0)));
    }

    #[test]
    fn inverted_side_flips_the_sign_and_still_converges() {
        let mut engine = engine(true, false, true);
        let changes = engine
            .apply("leftSpeed", PropertyValue::Double(0.6), WriteOrigin::Local)
            .unwrap();
        assert_eq!(engine.store().get("motor1"), Some(&PropertyValue::Double(-0.6)));
        // The back-write re-derives leftSpeed = -0.6 * -1 and is suppressed.
        assert_eq!(changes.len(), 2);
        assert_eq!(engine.store().get("leftSpeed"), Some(&PropertyValue::Double(0.6)));
    }

    #[test]
    fn writing_the_physical_motor_updates_the_logical_slider() {
        let mut engine = engine(true, true, true);
        let changes = engine
            .apply("motor0", PropertyValue::Double(0.8), WriteOrigin::Local)
            .unwrap();
        assert_eq!(engine.store().get("rightSpeed"), Some(&PropertyValue::Double(0.8)));
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn install_rejects_missing_or_mistyped_properties() {
        let mut store = PropertyStore::new();
        store.register("leftSpeed", PropertyValue::Double(0.0));
        let mut engine = StateEngine::new(store);
        let err = install_drive_links(&mut engine, names()).unwrap_err();
        assert!(matches!(err, PropertyError::UnknownProperty(_)));
    }
}
