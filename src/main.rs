//! Main application entry point.
//!
//! Parses the command line, handles help and version early, and hands every
//! other subcommand to `commands::dispatch`. Errors are reported through the
//! logger and turn into a non-zero exit status.

use lumaflow::args::{self, CliAction, ParsedArgs};
use lumaflow::constants::EXIT_FAILURE;
use lumaflow::{commands, config, log_error_exit};

fn main() {
    let parsed_args = ParsedArgs::parse(std::env::args());

    match parsed_args.action {
        CliAction::ShowVersion => args::display_version_info(),
        CliAction::ShowHelp => args::display_help(),
        CliAction::ShowHelpDueToError => {
            args::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::Execute {
            command,
            debug_enabled,
            config_path,
        } => {
            let result = config::set_config_path(config_path)
                .and_then(|()| commands::dispatch(&command, debug_enabled));

            if let Err(e) = result {
                log_error_exit!("{:#}", e);
                std::process::exit(EXIT_FAILURE);
            }
        }
    }
}
