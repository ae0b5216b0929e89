use crate::config;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

static LOG_FILE: OnceLock<Mutex<std::fs::File>> = OnceLock::new();

pub fn init() -> anyhow::Result<()> {
    let log_dir = config::get_config_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join("eno.log");
    rotate(&log_path, &log_dir.join("eno.log.old"));

    let mut options = OpenOptions::new();
    options.create(true).append(true);

    #[cfg(unix)]
    {
        options.mode(0o600);
    }

    let file = options.open(&log_path)?;

    let _ = LOG_FILE.set(Mutex::new(file));
    Ok(())
}

/// The previous run's log replaces `eno.log.old`. Failures are ignored.
fn rotate(current: &Path, previous: &Path) {
    if !current.exists() {
        return;
    }
    let _ = fs::remove_file(previous);
    let _ = fs::rename(current, previous);
}

/// Appends a timestamped line. A no-op until `init` succeeded.
pub fn log(msg: &str) {
    if let Some(mutex) = LOG_FILE.get() {
        if let Ok(mut file) = mutex.lock() {
            let _ = writeln!(file, "[{}] {}", chrono::Local::now(), msg);
        }
    }
}
