//! Command-line argument parsing and processing.
//!
//! Global flags (`--debug`, `--config`, `--help`, `--version`) may appear
//! anywhere. The first positional argument selects the subcommand; without
//! one the daemon runs.

use chrono::NaiveDate;

/// Subcommand and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the daemon in the foreground
    Run,
    Status {
        json: bool,
    },
    Enable {
        group: Option<String>,
    },
    Disable {
        group: Option<String>,
    },
    Override {
        lights: Vec<String>,
        brightness: Option<i64>,
        color_temp: Option<i64>,
        rgb_color: Option<Vec<i64>>,
    },
    Restore {
        lights: Option<Vec<String>>,
    },
    TurnOn {
        group: String,
    },
    TurnOff {
        group: String,
    },
    /// Toggle a light's participation switch
    Light {
        light: String,
        enabled: bool,
    },
    Reload,
    Simulate {
        date: Option<NaiveDate>,
        step_minutes: u32,
        group: Option<String>,
    },
}

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    Execute {
        command: Command,
        debug_enabled: bool,
        config_path: Option<String>,
    },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to invalid arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

const DEFAULT_SIMULATION_STEP_MINUTES: u32 = 30;

impl ParsedArgs {
    /// Parse command-line arguments (including the program name) into an action.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut debug_enabled = false;
        let mut config_path: Option<String> = None;
        let mut rest = Vec::new();

        let mut idx = 0;
        while idx < args_vec.len() {
            let arg = args_vec[idx].as_str();
            match arg {
                "--help" | "-h" => {
                    return ParsedArgs {
                        action: CliAction::ShowHelp,
                    };
                }
                "--version" | "-V" | "-v" => {
                    return ParsedArgs {
                        action: CliAction::ShowVersion,
                    };
                }
                "--debug" | "-d" => debug_enabled = true,
                "--config" | "-c" => {
                    idx += 1;
                    match args_vec.get(idx) {
                        Some(path) => config_path = Some(path.clone()),
                        None => return Self::error("Missing path after --config"),
                    }
                }
                _ => rest.push(args_vec[idx].clone()),
            }
            idx += 1;
        }

        match parse_command(&rest) {
            Ok(command) => ParsedArgs {
                action: CliAction::Execute {
                    command,
                    debug_enabled,
                    config_path,
                },
            },
            Err(message) => Self::error(&message),
        }
    }

    fn error(message: &str) -> ParsedArgs {
        log_warning!("{}", message);
        ParsedArgs {
            action: CliAction::ShowHelpDueToError,
        }
    }
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Run);
    };

    match command.as_str() {
        "run" => {
            no_extra_args(command, rest)?;
            Ok(Command::Run)
        }
        "status" => {
            let json = match rest {
                [] => false,
                [flag] if flag == "--json" => true,
                _ => return Err("Usage: lumaflow status [--json]".to_string()),
            };
            Ok(Command::Status { json })
        }
        "enable" => Ok(Command::Enable {
            group: optional_single(command, rest)?,
        }),
        "disable" => Ok(Command::Disable {
            group: optional_single(command, rest)?,
        }),
        "override" => parse_override(rest),
        "restore" => {
            if rest.iter().any(|arg| arg.starts_with('-')) {
                return Err("Usage: lumaflow restore [light...]".to_string());
            }
            Ok(Command::Restore {
                lights: (!rest.is_empty()).then(|| rest.to_vec()),
            })
        }
        "turn-on" => Ok(Command::TurnOn {
            group: required_single(command, rest)?,
        }),
        "turn-off" => Ok(Command::TurnOff {
            group: required_single(command, rest)?,
        }),
        "light" => match rest {
            [light, state] => {
                let enabled = match state.as_str() {
                    "on" | "enable" => true,
                    "off" | "disable" => false,
                    other => return Err(format!("Expected 'on' or 'off', got '{other}'")),
                };
                Ok(Command::Light {
                    light: light.clone(),
                    enabled,
                })
            }
            _ => Err("Usage: lumaflow light <light_id> on|off".to_string()),
        },
        "reload" => {
            no_extra_args(command, rest)?;
            Ok(Command::Reload)
        }
        "simulate" => parse_simulate(rest),
        other => Err(format!("Unknown command '{other}'")),
    }
}

fn no_extra_args(command: &str, rest: &[String]) -> Result<(), String> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(format!("'{command}' takes no arguments"))
    }
}

fn optional_single(command: &str, rest: &[String]) -> Result<Option<String>, String> {
    match rest {
        [] => Ok(None),
        [value] if !value.starts_with('-') => Ok(Some(value.clone())),
        _ => Err(format!("Usage: lumaflow {command} [group]")),
    }
}

fn required_single(command: &str, rest: &[String]) -> Result<String, String> {
    match rest {
        [value] if !value.starts_with('-') => Ok(value.clone()),
        _ => Err(format!("Usage: lumaflow {command} <group>")),
    }
}

fn flag_value<'a>(rest: &'a [String], idx: usize, flag: &str) -> Result<&'a str, String> {
    rest.get(idx + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value after {flag}"))
}

fn parse_number(value: &str, flag: &str) -> Result<i64, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid number for {flag}: '{value}'"))
}

fn parse_override(rest: &[String]) -> Result<Command, String> {
    let mut lights = Vec::new();
    let mut brightness = None;
    let mut color_temp = None;
    let mut rgb_color = None;

    let mut idx = 0;
    while idx < rest.len() {
        let arg = rest[idx].as_str();
        match arg {
            "--brightness" | "-b" => {
                brightness = Some(parse_number(flag_value(rest, idx, arg)?, arg)?);
                idx += 1;
            }
            "--color-temp" | "-k" => {
                color_temp = Some(parse_number(flag_value(rest, idx, arg)?, arg)?);
                idx += 1;
            }
            "--rgb" => {
                let components = flag_value(rest, idx, arg)?
                    .split(',')
                    .map(|part| parse_number(part.trim(), arg))
                    .collect::<Result<Vec<_>, _>>()?;
                rgb_color = Some(components);
                idx += 1;
            }
            flag if flag.starts_with('-') => {
                return Err(format!("Unknown option for override: '{flag}'"));
            }
            light => lights.push(light.to_string()),
        }
        idx += 1;
    }

    if lights.is_empty() {
        return Err(
            "Usage: lumaflow override <light>... [--brightness N] [--color-temp K] [--rgb R,G,B]"
                .to_string(),
        );
    }

    Ok(Command::Override {
        lights,
        brightness,
        color_temp,
        rgb_color,
    })
}

fn parse_simulate(rest: &[String]) -> Result<Command, String> {
    let mut date = None;
    let mut step_minutes = DEFAULT_SIMULATION_STEP_MINUTES;
    let mut group = None;

    let mut idx = 0;
    while idx < rest.len() {
        let arg = rest[idx].as_str();
        match arg {
            "--date" => {
                let value = flag_value(rest, idx, arg)?;
                date = Some(
                    NaiveDate::parse_from_str(value, "%Y-%m-%d")
                        .map_err(|_| format!("Invalid date '{value}', expected YYYY-MM-DD"))?,
                );
            }
            "--step" => {
                let value = flag_value(rest, idx, arg)?;
                step_minutes = match value.parse::<u32>() {
                    Ok(minutes) if (1..=720).contains(&minutes) => minutes,
                    _ => return Err(format!("--step must be 1-720 minutes (got '{value}')")),
                };
            }
            "--group" => {
                group = Some(flag_value(rest, idx, arg)?.to_string());
            }
            other => return Err(format!("Unknown option for simulate: '{other}'")),
        }
        idx += 2;
    }

    Ok(Command::Simulate {
        date,
        step_minutes,
        group,
    })
}

/// Displays version information using logger methods.
pub fn display_version_info() {
    log_version!();
    log_pipe!();
    println!("┗ {}", env!("CARGO_PKG_DESCRIPTION"));
}

/// Displays custom help message using logger methods.
pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("lumaflow [OPTIONS] [COMMAND]");
    log_block_start!("Options:");
    log_indented!("-c, --config <file>    Use a custom configuration file");
    log_indented!("-d, --debug            Enable detailed debug output");
    log_indented!("-h, --help             Print help information");
    log_indented!("-V, --version          Print version information");
    log_block_start!("Commands:");
    log_indented!("run                    Run the daemon (default)");
    log_indented!("status [--json]        Show the state of every group");
    log_indented!("enable [group]         Resume circadian control");
    log_indented!("disable [group]        Pause circadian control");
    log_indented!("override <light>...    Set lights by hand and stop adjusting them");
    log_indented!("    [--brightness N] [--color-temp K] [--rgb R,G,B]");
    log_indented!("restore [light...]     Hand overridden lights back to the schedule");
    log_indented!("turn-on <group>        Switch a group on at the current target");
    log_indented!("turn-off <group>       Switch every light of a group off");
    log_indented!("light <id> on|off      Include or exclude a light from its group");
    log_indented!("reload                 Reload the configuration file");
    log_indented!("simulate               Print a day's schedule without touching lights");
    log_indented!("    [--date YYYY-MM-DD] [--step MINUTES] [--group NAME]");
    log_end!();
}
