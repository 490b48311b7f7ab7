use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use wheelbot_scripting_host::{ScriptEvent, ScriptRuntime, ScriptingConfig};
use wheelbot_state::{
    install_drive_links, install_shutdown_values, AppliedChange, DriveLinkNames, PropertyError,
    PropertyStore, PropertyValue, StateEngine, WriteOrigin,
};
use wheelbot_sync::{DocPath, DocSnapshot, DocumentStore, SyncEngine, SyncError};

use crate::hardware::{Motor, MotorDriver};

/// Wire names of the stock bot's synchronized properties. These are the
/// keys of the remote device document, shared with the dashboard.
pub const RUNNING: &str = "running";
pub const MOTOR0: &str = "motor0";
pub const MOTOR1: &str = "motor1";
pub const LEFT_SPEED: &str = "leftSpeed";
pub const RIGHT_SPEED: &str = "rightSpeed";
pub const IS_MOTOR0_RIGHT: &str = "isMotor0Right";
pub const IS_LEFT_FORWARD: &str = "isLeftForward";
pub const IS_RIGHT_FORWARD: &str = "isRightForward";
pub const SCRIPT: &str = "script";
pub const SCRIPT_ERROR: &str = "scriptError";

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("bot task is gone")]
    Closed,
}

/// Identity and scripting knobs for one bot.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub user_id: String,
    pub device_id: String,
    pub scripting: ScriptingConfig,
}

enum BotCommand {
    Set {
        name: String,
        value: PropertyValue,
        reply: oneshot::Sender<Result<bool, PropertyError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running bot task.
#[derive(Clone)]
pub struct BotHandle {
    commands: mpsc::UnboundedSender<BotCommand>,
    snapshot: watch::Receiver<BTreeMap<String, PropertyValue>>,
}

impl BotHandle {
    /// Validated write of one property. `Ok(true)` means the value changed
    /// (and was pushed, and observers ran); `Ok(false)` means the change
    /// was suppressed as a no-op.
    pub async fn set(&self, name: &str, value: impl Into<PropertyValue>) -> Result<bool, BotError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(BotCommand::Set {
                name: name.to_string(),
                value: value.into(),
                reply: reply_tx,
            })
            .map_err(|_| BotError::Closed)?;
        let result = reply_rx.await.map_err(|_| BotError::Closed)?;
        Ok(result?)
    }

    /// Latest value of one property, from the bot task's snapshot feed.
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.snapshot.borrow().get(name).cloned()
    }

    /// Latest value of every property.
    pub fn snapshot(&self) -> BTreeMap<String, PropertyValue> {
        self.snapshot.borrow().clone()
    }

    /// Stop the bot: the running flag goes false (shutdown values reach the
    /// motors and the document), then the connection is released. Safe to
    /// call more than once; later calls are no-ops.
    pub async fn close(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(BotCommand::Close { reply: reply_tx })
            .is_err()
        {
            return;
        }
        let _ = reply_rx.await;
    }
}

/// Build and start a two-wheel bot.
///
/// Two-phase construction: declare the property registry first, then wire
/// observers against it (shutdown hook, drive cross-links, motor driver
/// bindings), then attach to the remote document and spawn the bot task and
/// the script runtime. Must be called from within a tokio runtime.
pub fn spawn_bot(
    documents: Arc<dyn DocumentStore>,
    driver: Arc<dyn MotorDriver>,
    config: BotConfig,
) -> Result<BotHandle, BotError> {
    let mut properties = PropertyStore::new();
    properties.register(RUNNING, PropertyValue::Bool(true));
    properties.register_with_shutdown(MOTOR0, PropertyValue::Double(0.0), PropertyValue::Double(0.0));
    properties.register_with_shutdown(MOTOR1, PropertyValue::Double(0.0), PropertyValue::Double(0.0));
    properties.register(LEFT_SPEED, PropertyValue::Double(0.0));
    properties.register(RIGHT_SPEED, PropertyValue::Double(0.0));
    properties.register(IS_MOTOR0_RIGHT, PropertyValue::Bool(true));
    properties.register(IS_LEFT_FORWARD, PropertyValue::Bool(true));
    properties.register(IS_RIGHT_FORWARD, PropertyValue::Bool(true));
    properties.register(SCRIPT, PropertyValue::Text(String::new()));
    properties.register(SCRIPT_ERROR, PropertyValue::Text(String::new()));

    let mut state = StateEngine::new(properties);
    install_shutdown_values(&mut state, RUNNING)?;
    install_drive_links(
        &mut state,
        DriveLinkNames {
            left_speed: LEFT_SPEED.into(),
            right_speed: RIGHT_SPEED.into(),
            motor0: MOTOR0.into(),
            motor1: MOTOR1.into(),
            motor0_is_right: IS_MOTOR0_RIGHT.into(),
            left_forward: IS_LEFT_FORWARD.into(),
            right_forward: IS_RIGHT_FORWARD.into(),
        },
    )?;
    for (name, motor) in [(MOTOR0, Motor::Motor0), (MOTOR1, Motor::Motor1)] {
        let driver = driver.clone();
        state.subscribe(
            name,
            Box::new(move |event, _, _| {
                if let Some(speed) = event.new.as_double() {
                    driver.set_speed(motor, speed);
                }
            }),
        )?;
    }

    let sync = SyncEngine::new(
        documents,
        DocPath::device(&config.user_id, &config.device_id),
    );
    let remote_rx = sync.start(&state.store().snapshot())?;

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(state.store().snapshot());
    let (script_tx, script_rx) = watch::channel(String::new());
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let runtime = ScriptRuntime::new(config.scripting.clone());
    tokio::spawn(runtime.run(script_rx, snapshot_rx.clone(), events_tx));

    let task = BotTask {
        state,
        sync,
        snapshot_tx,
        script_tx,
        closed: false,
    };
    tokio::spawn(bot_task(task, commands_rx, remote_rx, events_rx));

    info!(target: "bot", "bot up as {}/{}", config.user_id, config.device_id);
    Ok(BotHandle {
        commands: commands_tx,
        snapshot: snapshot_rx,
    })
}

/// Exclusive owner of the state and sync engines; every write in the
/// process funnels through this task, which is what serializes them.
struct BotTask {
    state: StateEngine,
    sync: SyncEngine,
    snapshot_tx: watch::Sender<BTreeMap<String, PropertyValue>>,
    script_tx: watch::Sender<String>,
    closed: bool,
}

impl BotTask {
    fn handle_write(
        &mut self,
        name: &str,
        value: PropertyValue,
        origin: WriteOrigin,
    ) -> Result<Vec<AppliedChange>, PropertyError> {
        let changes = self.state.apply(name, value, origin)?;
        self.after_changes(&changes);
        Ok(changes)
    }

    fn after_changes(&mut self, changes: &[AppliedChange]) {
        if changes.is_empty() {
            return;
        }
        for change in changes.iter().filter(|c| c.push) {
            self.sync.push(&change.name, &change.value);
        }
        self.snapshot_tx.send_replace(self.state.store().snapshot());
        // A script change restarts the runtime with the new source.
        if let Some(change) = changes.iter().rev().find(|c| c.name == SCRIPT) {
            if let Some(source) = change.value.as_text() {
                self.script_tx.send_replace(source.to_string());
            }
        }
    }

    fn handle_script_event(&mut self, event: ScriptEvent) {
        match event {
            ScriptEvent::Write { name, value } => {
                if name == SCRIPT {
                    warn!(
                        target: "bot",
                        "script tried to set '{}' to a new value, no self-modification",
                        SCRIPT
                    );
                    return;
                }
                if let Err(e) = self.handle_write(&name, value, WriteOrigin::Script) {
                    warn!(target: "bot", "script write rejected: {}", e);
                    self.record_script_error(e.to_string());
                }
            }
            ScriptEvent::Failed { message } => self.record_script_error(message),
        }
    }

    fn record_script_error(&mut self, message: String) {
        if let Err(e) = self.handle_write(SCRIPT_ERROR, PropertyValue::Text(message), WriteOrigin::Script)
        {
            error!(target: "bot", "could not record script error: {}", e);
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!(target: "bot", "closing");
        // Shutdown values ride on the running flag and still get pushed;
        // only after that does the connection go away.
        if let Err(e) = self.handle_write(RUNNING, PropertyValue::Bool(false), WriteOrigin::Local) {
            error!(target: "bot", "shutdown write failed: {}", e);
        }
        self.sync.close();
    }
}

async fn bot_task(
    mut task: BotTask,
    mut commands: mpsc::UnboundedReceiver<BotCommand>,
    mut remote: mpsc::UnboundedReceiver<DocSnapshot>,
    mut events: mpsc::UnboundedReceiver<ScriptEvent>,
) {
    let mut remote_live = true;
    loop {
        tokio::select! {
            maybe = commands.recv() => match maybe {
                Some(BotCommand::Set { name, value, reply }) => {
                    let result = task
                        .handle_write(&name, value, WriteOrigin::Local)
                        .map(|changes| !changes.is_empty());
                    let _ = reply.send(result);
                }
                Some(BotCommand::Close { reply }) => {
                    task.close();
                    let _ = reply.send(());
                    break;
                }
                None => {
                    // Every handle is gone; treat it as a close.
                    task.close();
                    break;
                }
            },
            maybe = remote.recv(), if remote_live => match maybe {
                Some(snapshot) => {
                    let result = task.sync.apply_snapshot(&mut task.state, &snapshot);
                    match result {
                        Ok(changes) => task.after_changes(&changes),
                        Err(e) => {
                            error!(
                                target: "sync",
                                "remote snapshot rejected ({}), subscription degraded",
                                e
                            );
                            remote_live = false;
                        }
                    }
                }
                None => {
                    info!(target: "sync", "remote subscription ended");
                    remote_live = false;
                }
            },
            Some(event) = events.recv() => task.handle_script_event(event),
        }
    }
}
