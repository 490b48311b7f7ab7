use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mlua::{Function, Lua, LuaSerdeExt, VmState};
use tracing::debug;

use crate::ScriptError;

/// Opening half of the fixed harness. The user source runs with three names
/// in scope: `bot` (decoded snapshot, read-only by convention), `result`
/// (the map of writes to request) and `history` (persists across calls).
const HARNESS_PREFIX: &str = r#"
local history = { count = 0, previous_ts = os.clock() }
return function(json_str)
    history.count += 1
    history.duration_ms = (os.clock() - history.previous_ts) * 1000.0
    local bot = json.decode(json_str)
    local result = {}
"#;

const HARNESS_SUFFIX: &str = r#"
    history.previous_ts = os.clock()
    return result
end
"#;

/// The stock script: ease motor0 back toward zero a little each pass.
pub const DEFAULT_SCRIPT: &str = r#"local reduce = math.min(0.1 * (history.duration_ms / 1000.0), math.abs(bot.motor0))
result.motor0 = bot.motor0 - math.sign(bot.motor0) * reduce
"#;

/// A compiled script: the harness function with its private `history`
/// upvalue. Keep it next to the [`ScriptEngine`] that produced it.
#[derive(Debug)]
pub struct CompiledScript {
    function: Function,
}

/// One sandboxed Luau VM.
///
/// Created fresh for every script change so no state leaks between
/// scripts. The sandbox leaves the VM with no filesystem, process or
/// threading access; the only host function is `json.decode`, installed
/// before the sandbox locks the globals down. A deadline checked from the
/// interrupt callback cuts off iterations that run away.
pub struct ScriptEngine {
    lua: Lua,
    deadline: Arc<Mutex<Option<Instant>>>,
    timeout: Duration,
    timeout_ms: u64,
}

impl ScriptEngine {
    pub fn new(timeout_ms: u64) -> Result<Self, ScriptError> {
        let lua = Lua::new();

        let json = lua.create_table().map_err(engine_error)?;
        let decode = lua
            .create_function(|lua, text: String| {
                let value: serde_json::Value =
                    serde_json::from_str(&text).map_err(mlua::Error::external)?;
                lua.to_value(&value)
            })
            .map_err(engine_error)?;
        json.set("decode", decode).map_err(engine_error)?;
        lua.globals().set("json", json).map_err(engine_error)?;

        lua.sandbox(true).map_err(engine_error)?;

        let deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let armed = deadline.clone();
        lua.set_interrupt(move |_| {
            let expired = armed
                .lock()
                .ok()
                .and_then(|slot| *slot)
                .is_some_and(|at| Instant::now() >= at);
            if expired {
                return Err(mlua::Error::RuntimeError("deadline exceeded".into()));
            }
            Ok(VmState::Continue)
        });

        Ok(Self {
            lua,
            deadline,
            timeout: Duration::from_millis(timeout_ms),
            timeout_ms,
        })
    }

    /// Splice the user source into the harness and compile it. The harness
    /// chunk evaluates to the per-tick function.
    pub fn compile(&self, source: &str) -> Result<CompiledScript, ScriptError> {
        let wrapped = format!("{}\n{}\n{}", HARNESS_PREFIX, source, HARNESS_SUFFIX);
        debug!(target: "scripting", "compiling {} byte script", source.len());
        let function = self
            .lua
            .load(&wrapped)
            .set_name("bot-script")
            .eval::<Function>()
            .map_err(|e| ScriptError::Compile(e.to_string()))?;
        Ok(CompiledScript { function })
    }

    /// One iteration: JSON snapshot in, result map out.
    pub fn invoke(
        &self,
        script: &CompiledScript,
        snapshot_json: &str,
    ) -> Result<BTreeMap<String, serde_json::Value>, ScriptError> {
        let started = Instant::now();
        self.arm(Some(started + self.timeout));
        let called = script.function.call::<mlua::Value>(snapshot_json);
        self.arm(None);

        let value = called.map_err(|e| {
            if started.elapsed() >= self.timeout {
                ScriptError::Timeout(self.timeout_ms)
            } else {
                ScriptError::Runtime(e.to_string())
            }
        })?;
        self.lua
            .from_value(value)
            .map_err(|e| ScriptError::Runtime(e.to_string()))
    }

    fn arm(&self, at: Option<Instant>) {
        if let Ok(mut slot) = self.deadline.lock() {
            *slot = at;
        }
    }
}

fn engine_error(e: mlua::Error) -> ScriptError {
    ScriptError::Runtime(e.to_string())
}
