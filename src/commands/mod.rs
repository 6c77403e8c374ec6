//! Command-line command handlers.
//!
//! `run` starts the daemon, `simulate` works offline from the configuration,
//! and everything else is a thin client of the daemon's control socket.

pub mod control;
pub mod run;
pub mod simulate;

use anyhow::Result;

use crate::args::Command;

/// Execute a parsed subcommand.
pub fn dispatch(command: &Command, debug_enabled: bool) -> Result<()> {
    match command {
        Command::Run => run::run_daemon(debug_enabled),
        Command::Simulate {
            date,
            step_minutes,
            group,
        } => simulate::handle_simulate_command(
            *date,
            *step_minutes,
            group.as_deref(),
            debug_enabled,
        ),
        other => control::handle_control_command(other, debug_enabled),
    }
}
