//! Logging setup for the `marketsweep` binary.
//!
//! Events go to stderr and, for the sweep process, to `marketsweep.log` in
//! the log directory. Stdout is never written to; worker processes use it
//! for their outcome record.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Name of the log file inside the log directory
pub const LOG_FILE: &str = "marketsweep.log";
/// Log size above which older entries are dropped (5 MB)
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
/// Bytes of recent entries kept when trimming (1 MB)
const KEPT_LOG_BYTES: u64 = 1024 * 1024;

const TRIM_MARKER: &[u8] = b"--- older entries removed ---\n";

/// Cut `path` down to roughly its last `keep` bytes once it grows past
/// `limit`. The kept tail starts at a line boundary.
///
/// Returns whether the file was trimmed.
fn trim_log(path: &Path, limit: u64, keep: u64) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size <= limit {
        return Ok(false);
    }

    let mut tail = Vec::with_capacity(keep as usize);
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(size - keep.min(size)))?;
    file.read_to_end(&mut tail)?;

    let first_line = match tail.iter().position(|&b| b == b'\n') {
        Some(newline) => newline + 1,
        None => tail.len(),
    };

    let mut file = File::create(path)?;
    file.write_all(TRIM_MARKER)?;
    file.write_all(&tail[first_line..])?;
    Ok(true)
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("marketsweep={level},marketsweep_core={level}"))
    })
}

/// Initialize logging.
///
/// The filter comes from `RUST_LOG` when set, otherwise `level` applies to
/// both crates. With a `log_dir`, events are also appended to
/// `{log_dir}/marketsweep.log`, which is trimmed to its last 1MB when it
/// exceeds 5MB.
pub fn init_logging(log_dir: Option<&Path>, level: &str) -> color_eyre::Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(LOG_FILE);
            if let Err(e) = trim_log(&path, MAX_LOG_BYTES, KEPT_LOG_BYTES) {
                eprintln!("warning: could not trim {}: {e}", path.display());
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_thread_names(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(dir) = log_dir {
        tracing::info!("logging to {}", dir.join(LOG_FILE).display());
    }
    Ok(())
}
