use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use wheelbot_runner::{logging, spawn_bot, BotConfig, FakeMotorDriver, SCRIPT};
use wheelbot_scripting_host::DEFAULT_SCRIPT;
use wheelbot_sync::MemoryStore;

mod config;

use config::{create_example_config, ConfigError, WheelbotConfig};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mirror logs into a file under the data directory
    #[arg(long)]
    log_file: bool,

    /// Load the stock demo script after startup
    #[arg(long)]
    demo_script: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _guard = logging::init_logging("cli", cli.log_file)?;

    let config_path = cli.config.unwrap_or_else(WheelbotConfig::config_path);
    let config = match WheelbotConfig::load(&config_path) {
        Ok(config) => config,
        Err(ConfigError::NotFound) => {
            create_example_config(&config_path)?;
            eprintln!("Config file created at: {}", config_path.display());
            eprintln!("Edit it with your user and device ids, then run wheelbot again.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    info!("Starting wheelbot...");

    // Demo collaborators: the in-memory document store stands in for the
    // cloud client, the fake driver for the I2C motor shield.
    let documents = Arc::new(MemoryStore::new());
    let driver = Arc::new(FakeMotorDriver::new());

    let handle = spawn_bot(
        documents,
        driver,
        BotConfig {
            user_id: config.user_id.clone(),
            device_id: config.device_id.clone(),
            scripting: config.scripting.clone(),
        },
    )?;

    if cli.demo_script {
        handle.set(SCRIPT, DEFAULT_SCRIPT).await?;
        info!("Demo script loaded");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    handle.close().await;

    Ok(())
}
