/// Sandboxed periodic script runtime
///
/// User-supplied Luau source arrives through the synchronized `script`
/// property, gets compiled into a fixed harness inside a sandboxed VM, and
/// runs on a fixed cadence against snapshots of the property store. Script
/// output re-enters the bot through the same validated write path as every
/// other writer; scripts never touch the store, the filesystem, the
/// process or host threads.
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod harness;
pub mod runtime;

pub use harness::{CompiledScript, ScriptEngine, DEFAULT_SCRIPT};
pub use runtime::{ScriptEvent, ScriptRuntime};

/// Scripting knobs, a `[scripting]` table in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Milliseconds between script iterations.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Per-iteration execution deadline. A script that blows it gets cut
    /// off and the failure lands in the script error property.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    250
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("compile error: {0}")]
    Compile(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("script exceeded its {0} ms deadline")]
    Timeout(u64),
}
