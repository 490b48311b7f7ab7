use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// A log file that grows past this gets truncated on the next start.
const MAX_LOG_BYTES: u64 = 1024 * 1024;

/// Set up tracing for one binary.
///
/// Verbosity comes from the environment filter (`RUST_LOG`), defaulting to
/// "info". With `to_file` the console output is mirrored into
/// `<data dir>/logs/<component>.log` through a non-blocking writer; the
/// returned guard must stay alive until exit or the tail of the log is lost.
pub fn init_logging(component: &str, to_file: bool) -> io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_writer(io::stdout).with_ansi(true);

    if !to_file {
        tracing_subscriber::registry().with(filter).with(console).init();
        return Ok(None);
    }

    let dirs = directories::ProjectDirs::from("", "", "wheelbot").ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no home directory for the log path")
    })?;
    let log_dir = dirs.data_dir().join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("{}.log", component));

    let (writer, guard) = tracing_appender::non_blocking(BufWriter::new(open_capped(&log_path)?));
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
        .init();

    tracing::info!("Logging to file: {}", log_path.display());
    Ok(Some(guard))
}

/// Open the log for appending, starting over when it has grown too large.
fn open_capped(path: &Path) -> io::Result<File> {
    if fs::metadata(path).map(|m| m.len() > MAX_LOG_BYTES).unwrap_or(false) {
        File::create(path)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
