//! shiftctl: command-line driver for the shiftkeeper session core.
//!
//! Runs the same reconciliation the terminal application runs, against the
//! files under `~/.shiftkeeper` (or `--root`). Results are printed as JSON on
//! stdout; logs go to stderr and the daily log file.
//!
//! ## Subcommands
//!
//! - `status`: Print the cached session without contacting the authority
//! - `restore`: Run the startup sequence (terminal check, then restore)
//! - `refresh`: Re-query the authority for a staff member's shift
//! - `clear`: Drop staff and shift
//! - `watch`: Start the session with its listeners and read commands from stdin

mod logging;
mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use shift_core::{
    load_session_config, ShiftError, ShiftSession, SessionPhase, StorageConfig,
};
use shiftkeeper_protocol::{ActiveShift, Staff};

#[derive(Parser)]
#[command(name = "shiftctl")]
#[command(about = "Terminal shift session tool")]
#[command(version)]
struct Cli {
    /// Storage root (defaults to ~/.shiftkeeper)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cached session
    Status,

    /// Validate the cached session against the shift authority
    Restore,

    /// Re-query the active shift for a staff member
    Refresh {
        /// Staff id to query (defaults to the current staff)
        #[arg(long)]
        staff_id: Option<String>,
    },

    /// Clear staff and shift
    Clear,

    /// Keep the session running and accept commands on stdin
    Watch,
}

/// Printed by every subcommand.
#[derive(Debug, Serialize)]
pub(crate) struct StatusReport {
    phase: SessionPhase,
    shift_active: bool,
    staff: Option<Staff>,
    active_shift: Option<ActiveShift>,
    last_known_terminal_id: Option<String>,
}

impl StatusReport {
    pub(crate) fn of(session: &ShiftSession) -> Self {
        let snapshot = session.snapshot();
        Self {
            phase: session.phase(),
            shift_active: session.is_shift_active(),
            staff: snapshot.staff,
            active_shift: snapshot.active_shift,
            last_known_terminal_id: snapshot.last_known_terminal_id,
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(err) => tracing::error!(error = %err, "Failed to serialize output"),
    }
}

fn storage_for(root: Option<PathBuf>) -> Result<StorageConfig, ShiftError> {
    match root {
        Some(root) => Ok(StorageConfig::with_root(root)),
        None => StorageConfig::from_home(),
    }
}

async fn run(command: Commands, session: Arc<ShiftSession>) {
    match command {
        Commands::Status => {}
        Commands::Restore => print_json(&session.start().await),
        Commands::Refresh { staff_id } => {
            print_json(&session.refresh_active_shift(staff_id.as_deref()).await)
        }
        Commands::Clear => session.clear_shift(),
        Commands::Watch => {
            if let Err(err) = watch::run(Arc::clone(&session)).await {
                tracing::error!(error = %err, "shiftctl watch failed");
                std::process::exit(1);
            }
        }
    }
    print_json(&StatusReport::of(&session));
}

fn main() {
    let cli = Cli::parse();

    let storage = match storage_for(cli.root) {
        Ok(storage) => storage,
        Err(err) => {
            eprintln!("shiftctl: {}", err);
            std::process::exit(1);
        }
    };
    let _logging_guard = logging::init(&storage.logs_dir());

    let config = load_session_config(&storage);
    let session = match ShiftSession::open(&storage, config) {
        Ok(session) => Arc::new(session),
        Err(err) => {
            tracing::error!(error = %err, "Failed to open session");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "Failed to start async runtime");
            std::process::exit(1);
        }
    };

    runtime.block_on(run(cli.command, session));
}
