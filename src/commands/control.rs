//! One-shot commands that talk to the running daemon over the control socket.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use crate::args::Command;
use crate::control::{ControlClient, ControlRequest, ControlResponse};
use crate::core::{GroupSnapshot, LightOutcome};

/// Map a CLI command to its control request.
///
/// Returns `None` for commands that do not go through the socket.
pub fn request_for(command: &Command) -> Option<ControlRequest> {
    let request = match command {
        Command::Status { .. } => ControlRequest::Status,
        Command::Enable { group } => ControlRequest::Enable {
            group: group.clone(),
        },
        Command::Disable { group } => ControlRequest::Disable {
            group: group.clone(),
        },
        Command::Override {
            lights,
            brightness,
            color_temp,
            rgb_color,
        } => ControlRequest::OverrideLights {
            lights: lights.clone(),
            brightness: *brightness,
            color_temp: *color_temp,
            rgb_color: rgb_color.clone(),
        },
        Command::Restore { lights } => ControlRequest::RestoreLights {
            lights: lights.clone(),
        },
        Command::TurnOn { group } => ControlRequest::TurnOn {
            group: group.clone(),
        },
        Command::TurnOff { group } => ControlRequest::TurnOff {
            group: group.clone(),
        },
        Command::Light { light, enabled } => ControlRequest::SetLightEnabled {
            light: light.clone(),
            enabled: *enabled,
        },
        Command::Reload => ControlRequest::Reload,
        Command::Run | Command::Simulate { .. } => return None,
    };
    Some(request)
}

/// Send `command` to the daemon and print the answer.
pub fn handle_control_command(command: &Command, debug_enabled: bool) -> Result<()> {
    let request = request_for(command)
        .ok_or_else(|| anyhow::anyhow!("This command does not use the control socket"))?;

    // Catch bad values before bothering the daemon
    request.validate()?;

    let mut client = ControlClient::connect_default()?;
    if debug_enabled {
        log_debug!("Sending {} request", request.name());
    }
    let response = client.send(&request)?.into_result()?;

    match command {
        Command::Status { json: true } => {
            let data = response.data.unwrap_or_default();
            println!(
                "{}",
                serde_json::to_string_pretty(&data).context("Failed to format status")?
            );
        }
        Command::Status { json: false } => {
            let snapshots: Vec<GroupSnapshot> = serde_json::from_value(
                response.data.unwrap_or_default(),
            )
            .context("Daemon sent an unreadable status")?;
            display_status(&snapshots);
        }
        _ => display_response(&response),
    }

    Ok(())
}

fn local(instant: Option<DateTime<Utc>>) -> String {
    instant
        .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn display_status(snapshots: &[GroupSnapshot]) {
    log_version!();
    for snapshot in snapshots {
        log_block_start!(
            "{} ({})",
            snapshot.name,
            if snapshot.enabled { "enabled" } else { "disabled" }
        );
        match (snapshot.phase, snapshot.target) {
            (Some(phase), Some(target)) => {
                log_indented!(
                    "Phase: {}, {}% at {}K",
                    phase,
                    target.brightness_pct,
                    target.color_temp_kelvin
                );
            }
            _ => log_indented!("No target computed yet"),
        }
        log_indented!(
            "Sunrise {}, sunset {} (adjusted {}), next transition {}",
            local(snapshot.sunrise),
            local(snapshot.sunset),
            local(snapshot.sunset_adjusted),
            local(snapshot.next_transition)
        );
        log_indented!("Lights: {}", snapshot.lights.join(", "));
        for info in &snapshot.overrides {
            log_indented!("Overridden: {}", info.light);
        }
        if !snapshot.disabled_lights.is_empty() {
            log_indented!("Switched off: {}", snapshot.disabled_lights.join(", "));
        }
        let counts = snapshot.last_counts;
        log_indented!(
            "Last update {}: {} updated, {} skipped, {} failed",
            local(snapshot.last_tick),
            counts.updated,
            counts.skipped,
            counts.failed
        );
        if let Some(error) = &snapshot.last_error {
            log_warning!("{}: {}", snapshot.name, error);
        }
    }
    log_end!();
}

fn display_response(response: &ControlResponse) {
    log_block_start!("{}", response.message.as_deref().unwrap_or("Done"));

    // Per-light outcomes for override/turn-on/turn-off
    if let Some(data) = &response.data
        && let Ok(outcomes) = serde_json::from_value::<Vec<(String, LightOutcome)>>(data.clone())
    {
        for (light, outcome) in outcomes {
            match outcome {
                LightOutcome::Updated => log_indented!("{light}: updated"),
                LightOutcome::Skipped(reason) => log_indented!("{light}: skipped ({reason})"),
                LightOutcome::Failed(error) => log_warning!("{light}: {error}"),
            }
        }
    }
    log_end!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_mapping() {
        assert_eq!(
            request_for(&Command::Light {
                light: "light.a".into(),
                enabled: true
            }),
            Some(ControlRequest::SetLightEnabled {
                light: "light.a".into(),
                enabled: true
            })
        );
        assert_eq!(
            request_for(&Command::Status { json: true }),
            Some(ControlRequest::Status)
        );
        assert_eq!(request_for(&Command::Run), None);
        assert_eq!(
            request_for(&Command::Simulate {
                date: None,
                step_minutes: 30,
                group: None
            }),
            None
        );
    }
}
