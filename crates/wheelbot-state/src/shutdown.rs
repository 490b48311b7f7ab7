use tracing::info;

use crate::engine::StateEngine;
use crate::error::PropertyError;
use crate::value::PropertyValue;

/// Wire the running flag to the store's shutdown values.
///
/// When `running` transitions to false, every property registered with a
/// shutdown value is written to that value through the validated path, in
/// name order, before the caller proceeds with connection teardown. The
/// flag is never forced back to true by this hook.
pub fn install_shutdown_values(engine: &mut StateEngine, running: &str) -> Result<(), PropertyError> {
    engine.subscribe(
        running,
        Box::new(|event, store, effects| {
            if !matches!(event.new, PropertyValue::Bool(false)) {
                return;
            }
            for (name, value) in store.shutdown_entries() {
                info!(target: "state", "shutdown: {}={}", name, value);
                effects.set(name, value);
            }
        }),
    )
}
