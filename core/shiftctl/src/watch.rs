//! `shiftctl watch`: a long-running session driven by stdin.
//!
//! One command per line:
//!
//! - `settings-updated` (or `terminal-settings-updated`): publish the signal
//! - `refresh [STAFF_ID]`: re-query the active shift
//! - `login STAFF_ID [NAME]`: set staff, which triggers reconciliation
//! - `logout`: clear staff, keeping the shift
//! - `clear`: drop staff and shift
//! - `status`: print the session
//! - `quit`: stop
//!
//! EOF on stdin also stops the session.

use std::io;
use std::sync::Arc;

use shift_core::{spawn_event_tasks, SessionSignal, ShiftSession};
use shiftkeeper_protocol::Staff;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::{print_json, StatusReport};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Signal(SessionSignal),
    Refresh(Option<String>),
    Login { staff_id: String, name: String },
    Logout,
    Clear,
    Status,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "settings-updated" => Command::Signal(SessionSignal::TerminalSettingsUpdated),
        "refresh" => Command::Refresh(words.next().map(str::to_string)),
        "login" => {
            let staff_id = words.next()?.to_string();
            let name = words.collect::<Vec<_>>().join(" ");
            Command::Login { staff_id, name }
        }
        "logout" => Command::Logout,
        "clear" => Command::Clear,
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        other => Command::Signal(SessionSignal::from_name(other)?),
    };
    Some(command)
}

pub async fn run(session: Arc<ShiftSession>) -> io::Result<()> {
    print_json(&session.start().await);
    let tasks = spawn_event_tasks(&session);
    info!("Watching session; type `quit` to stop");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = parse_command(&line) else {
            warn!(input = %line.trim(), "Unknown command");
            continue;
        };

        match command {
            Command::Signal(signal) => {
                if !session.publish(signal) {
                    warn!(signal = signal.name(), "No listener for signal");
                }
            }
            Command::Refresh(staff_id) => {
                print_json(&session.refresh_active_shift(staff_id.as_deref()).await)
            }
            Command::Login { staff_id, name } => {
                let current = session.staff();
                session.set_staff(Some(Staff {
                    staff_id,
                    name,
                    role: current.as_ref().map(|s| s.role.clone()).unwrap_or_default(),
                    branch_id: current.as_ref().map(|s| s.branch_id.clone()).unwrap_or_default(),
                    terminal_id: current.map(|s| s.terminal_id).unwrap_or_default(),
                    organization_id: None,
                }));
            }
            Command::Logout => session.set_staff(None),
            Command::Clear => session.clear_shift(),
            Command::Status => print_json(&StatusReport::of(&session)),
            Command::Quit => break,
        }
    }

    tasks.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("settings-updated"),
            Some(Command::Signal(SessionSignal::TerminalSettingsUpdated))
        );
        assert_eq!(
            parse_command("terminal-settings-updated"),
            Some(Command::Signal(SessionSignal::TerminalSettingsUpdated))
        );
        assert_eq!(parse_command("refresh"), Some(Command::Refresh(None)));
        assert_eq!(
            parse_command("refresh S1"),
            Some(Command::Refresh(Some("S1".into())))
        );
        assert_eq!(
            parse_command("login S2 Ana Maria"),
            Some(Command::Login {
                staff_id: "S2".into(),
                name: "Ana Maria".into(),
            })
        );
        assert_eq!(parse_command("login"), None);
        assert_eq!(parse_command("  quit "), Some(Command::Quit));
        assert_eq!(parse_command("dance"), None);
    }
}
