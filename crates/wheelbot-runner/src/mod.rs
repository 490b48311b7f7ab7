mod bot;
mod hardware;
pub mod logging;

pub use bot::{
    spawn_bot, BotConfig, BotError, BotHandle, IS_LEFT_FORWARD, IS_MOTOR0_RIGHT, IS_RIGHT_FORWARD,
    LEFT_SPEED, MOTOR0, MOTOR1, RIGHT_SPEED, RUNNING, SCRIPT, SCRIPT_ERROR,
};
pub use hardware::{FakeMotorDriver, Motor, MotorDriver};
