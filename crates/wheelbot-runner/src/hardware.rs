use std::sync::Mutex;

use tracing::{info, warn};

/// Physical motor slots on the drive shield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motor {
    Motor0,
    Motor1,
}

impl Motor {
    pub fn index(self) -> usize {
        match self {
            Motor::Motor0 => 0,
            Motor::Motor1 => 1,
        }
    }
}

/// Boundary to the differential-drive motor controller.
///
/// Implementations log their own failures; a bad speed write is a hardware
/// problem, never a synchronization error. Values arrive pre-validated in
/// [-1.0, 1.0].
pub trait MotorDriver: Send + Sync {
    fn set_speed(&self, motor: Motor, speed: f64);
}

/// Stand-in for the I2C shield: logs commands and remembers the last speed
/// commanded per motor.
#[derive(Debug, Default)]
pub struct FakeMotorDriver {
    speeds: Mutex<[Option<f64>; 2]>,
}

impl FakeMotorDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last commanded speed, if any.
    pub fn last(&self, motor: Motor) -> Option<f64> {
        self.speeds.lock().ok().and_then(|s| s[motor.index()])
    }
}

impl MotorDriver for FakeMotorDriver {
    fn set_speed(&self, motor: Motor, speed: f64) {
        info!(target: "hardware", "fake motor {:?} set to {}", motor, speed);
        match self.speeds.lock() {
            Ok(mut speeds) => speeds[motor.index()] = Some(speed),
            Err(e) => warn!(target: "hardware", "fake driver state poisoned: {}", e),
        }
    }
}
