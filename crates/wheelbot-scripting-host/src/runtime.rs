use std::collections::BTreeMap;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use wheelbot_state::PropertyValue;

use crate::harness::{CompiledScript, ScriptEngine};
use crate::ScriptingConfig;

/// What the script sees: the current value of every scalar property.
pub type Snapshot = BTreeMap<String, PropertyValue>;

/// Output of the runtime, consumed by the bot task.
#[derive(Debug)]
pub enum ScriptEvent {
    /// One key of a script iteration's result map; goes through the
    /// validated write path like any other writer.
    Write { name: String, value: PropertyValue },
    /// Compile or execution failure; lands in the script error property so
    /// the dashboard can show it.
    Failed { message: String },
}

enum RunState {
    Idle,
    Running {
        engine: ScriptEngine,
        chunk: CompiledScript,
    },
    Error,
}

/// Owns the script lifecycle: recompiles when the source property changes,
/// ticks the compiled chunk on a fixed cadence, and routes its output map
/// out as [`ScriptEvent`]s.
///
/// The loop runs independently of the remote connection's state and
/// survives failing iterations; only a blank source (or the owner dropping
/// the source channel) stops it. Cancellation is cooperative: it is checked
/// between iterations, never mid-invoke.
pub struct ScriptRuntime {
    config: ScriptingConfig,
    state: RunState,
}

impl ScriptRuntime {
    pub fn new(config: ScriptingConfig) -> Self {
        Self {
            config,
            state: RunState::Idle,
        }
    }

    /// Drive the runtime until the script source channel closes.
    pub async fn run(
        mut self,
        mut script_rx: watch::Receiver<String>,
        snapshot_rx: watch::Receiver<Snapshot>,
        events_tx: mpsc::UnboundedSender<ScriptEvent>,
    ) {
        let mut ticker = interval(Duration::from_millis(self.config.tick_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Pick up whatever source was set before we started.
        let initial = script_rx.borrow_and_update().clone();
        self.apply_source(&initial, &events_tx);

        loop {
            tokio::select! {
                changed = script_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let source = script_rx.borrow_and_update().clone();
                    self.apply_source(&source, &events_tx);
                }
                _ = ticker.tick(), if matches!(self.state, RunState::Running { .. }) => {
                    self.run_iteration(&snapshot_rx, &events_tx);
                }
            }
        }
        debug!(target: "scripting", "script runtime loop exiting");
    }

    fn apply_source(&mut self, source: &str, events_tx: &mpsc::UnboundedSender<ScriptEvent>) {
        if source.trim().is_empty() {
            if !matches!(self.state, RunState::Idle) {
                info!(target: "scripting", "blank script, going idle");
            }
            self.state = RunState::Idle;
            return;
        }

        // Fresh VM per script revision so nothing leaks between scripts.
        let engine = match ScriptEngine::new(self.config.timeout_ms) {
            Ok(engine) => engine,
            Err(e) => {
                error!(target: "scripting", "could not build script VM: {}", e);
                self.state = RunState::Error;
                let _ = events_tx.send(ScriptEvent::Failed { message: e.to_string() });
                return;
            }
        };
        match engine.compile(source) {
            Ok(chunk) => {
                info!(
                    target: "scripting",
                    "script compiled, ticking every {} ms",
                    self.config.tick_interval_ms
                );
                self.state = RunState::Running { engine, chunk };
            }
            Err(e) => {
                warn!(target: "scripting", "{}", e);
                self.state = RunState::Error;
                let _ = events_tx.send(ScriptEvent::Failed { message: e.to_string() });
            }
        }
    }

    fn run_iteration(
        &mut self,
        snapshot_rx: &watch::Receiver<Snapshot>,
        events_tx: &mpsc::UnboundedSender<ScriptEvent>,
    ) {
        let RunState::Running { engine, chunk } = &self.state else {
            return;
        };
        let snapshot = snapshot_rx.borrow().clone();
        let json = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                error!(target: "scripting", "snapshot did not serialize: {}", e);
                return;
            }
        };

        match engine.invoke(chunk, &json) {
            Ok(result) => {
                for (name, value) in result {
                    match scalar(value) {
                        Some(value) => {
                            debug!(target: "scripting", "script set {}={}", name, value);
                            let _ = events_tx.send(ScriptEvent::Write { name, value });
                        }
                        None => {
                            warn!(
                                target: "scripting",
                                "script produced a non-scalar for '{}', ignoring",
                                name
                            );
                        }
                    }
                }
            }
            Err(e) => {
                // Maybe the error is temporary; keep ticking.
                warn!(target: "scripting", "iteration failed: {}", e);
                let _ = events_tx.send(ScriptEvent::Failed { message: e.to_string() });
            }
        }
    }
}

fn scalar(value: serde_json::Value) -> Option<PropertyValue> {
    match value {
        serde_json::Value::Bool(b) => Some(PropertyValue::Bool(b)),
        serde_json::Value::Number(n) => n.as_f64().map(PropertyValue::Double),
        serde_json::Value::String(s) => Some(PropertyValue::Text(s)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn config() -> ScriptingConfig {
        ScriptingConfig {
            tick_interval_ms: 10,
            timeout_ms: 500,
        }
    }

    fn snapshot(motor0: f64) -> Snapshot {
        let mut map = Snapshot::new();
        map.insert("motor0".into(), PropertyValue::Double(motor0));
        map
    }

    #[tokio::test(start_paused = true)]
    async fn iteration_routes_result_keys_as_writes() {
        let (script_tx, script_rx) = watch::channel("result.motor0 = bot.motor0 * 0.9".to_string());
        let (_snapshot_tx, snapshot_rx) = watch::channel(snapshot(1.0));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let runtime = ScriptRuntime::new(config());
        let task = tokio::spawn(runtime.run(script_rx, snapshot_rx, events_tx));

        let event = timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .expect("no event in time")
            .expect("channel closed");
        match event {
            ScriptEvent::Write { name, value } => {
                assert_eq!(name, "motor0");
                assert_eq!(value, PropertyValue::Double(0.9));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        drop(script_tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn compile_error_reports_failure_and_never_ticks() {
        let (script_tx, script_rx) = watch::channel("this is not luau ===".to_string());
        let (_snapshot_tx, snapshot_rx) = watch::channel(Snapshot::new());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let runtime = ScriptRuntime::new(config());
        let task = tokio::spawn(runtime.run(script_rx, snapshot_rx, events_tx));

        let event = timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .expect("no event in time")
            .expect("channel closed");
        assert!(matches!(event, ScriptEvent::Failed { ref message } if !message.is_empty()));

        // No iterations follow a failed compile.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events_rx.try_recv().is_err());

        drop(script_tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn blank_script_goes_idle() {
        let (script_tx, script_rx) = watch::channel("result.motor0 = 0.5".to_string());
        let (_snapshot_tx, snapshot_rx) = watch::channel(snapshot(0.0));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let runtime = ScriptRuntime::new(config());
        let task = tokio::spawn(runtime.run(script_rx, snapshot_rx, events_tx));

        // Let it produce at least one write, then blank the script.
        let _ = timeout(Duration::from_secs(5), events_rx.recv()).await.unwrap();
        script_tx.send("   ".to_string()).unwrap();

        // Drain anything in flight, then confirm silence.
        tokio::time::sleep(Duration::from_millis(50)).await;
        while events_rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events_rx.try_recv().is_err());

        drop(script_tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_iteration_reports_and_keeps_going() {
        let (script_tx, script_rx) =
            watch::channel("if history.count == 1 then error('once') end\nresult.ok = true".to_string());
        let (_snapshot_tx, snapshot_rx) = watch::channel(Snapshot::new());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let runtime = ScriptRuntime::new(config());
        let task = tokio::spawn(runtime.run(script_rx, snapshot_rx, events_tx));

        let first = timeout(Duration::from_secs(5), events_rx.recv()).await.unwrap().unwrap();
        assert!(matches!(first, ScriptEvent::Failed { .. }));
        let second = timeout(Duration::from_secs(5), events_rx.recv()).await.unwrap().unwrap();
        assert!(matches!(
            second,
            ScriptEvent::Write { ref name, value: PropertyValue::Bool(true) } if name == "ok"
        ));

        drop(script_tx);
        task.await.unwrap();
    }
}
