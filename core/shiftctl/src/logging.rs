//! Logging setup: stderr plus a daily log file under the storage root.
//!
//! `SHIFTKEEPER_DEBUG_LOG=1` forces debug output; otherwise `RUST_LOG` is
//! honored and the default level is `info`.

use std::env;
use std::path::Path;

use fs_err as fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEBUG_ENV: &str = "SHIFTKEEPER_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "shiftctl.log";

fn debug_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

fn filter() -> EnvFilter {
    if debug_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init(logs_dir: &Path) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    if let Err(err) = fs::create_dir_all(logs_dir) {
        tracing_subscriber::registry()
            .with(filter())
            .with(stderr_layer)
            .init();
        tracing::warn!(error = %err, "File logging disabled");
        return None;
    }

    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(filter())
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Some(guard)
}
