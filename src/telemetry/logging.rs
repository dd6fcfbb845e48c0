use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::WorldConfig;

pub const LOG_FILE_NAME: &str = "world.log";

const HEADER_LINE: &str = "-------------------------------------------------------------------------------";
const HEADER_TITLE: &str = "World server - movement and aura core";

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Installs the global `tracing` subscriber: an `EnvFilter` (`RUST_LOG`
/// wins over the configured filter), stderr output and an appending
/// `<log_dir>/world.log`. Calling it again is a no-op.
pub fn init(config: &WorldConfig) -> Result<(), String> {
    if LOG_PATH.get().is_some() {
        return Ok(());
    }
    std::fs::create_dir_all(&config.log_dir)
        .map_err(|err| format!("log directory create failed: {}", err))?;
    let path = config.log_dir.join(LOG_FILE_NAME);
    let file = open_log_file(&path)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|err| format!("invalid log filter '{}': {}", config.log_filter, err))?;
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file));
    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|err| format!("log system init failed: {}", err))?;
    let _ = LOG_PATH.set(path);
    Ok(())
}

/// File the subscriber writes to, once [`init`] succeeded.
pub fn log_path() -> Option<&'static Path> {
    LOG_PATH.get().map(PathBuf::as_path)
}

/// Opens `path` for appending and writes the header into a new file.
fn open_log_file(path: &Path) -> Result<File, String> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| format!("open log {} failed: {}", path.display(), err))?;
    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| LOG_FILE_NAME.to_string());
        write_header(&mut file, &name)?;
    }
    Ok(file)
}

fn write_header(file: &mut File, name: &str) -> Result<(), String> {
    let started = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    writeln!(file, "{HEADER_LINE}").map_err(|err| format!("header write failed: {}", err))?;
    writeln!(file, "{HEADER_TITLE}").map_err(|err| format!("header write failed: {}", err))?;
    writeln!(file, "{name} - started at unix time {started}")
        .map_err(|err| format!("header write failed: {}", err))?;
    Ok(())
}
