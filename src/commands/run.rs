//! The daemon: owns the configuration, the group directory and the main loop.
//!
//! Signals, the config watcher and the control socket all deliver
//! [`SignalMessage`]s to one channel. The main loop handles them one at a time,
//! so reloads and control requests never race each other.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::backend::{self, LightSink};
use crate::config::{self, Config, ReloadPlan, plan_reload};
use crate::control::{self, ControlRequest, ControlResponse, ControlServer};
use crate::core::GroupDirectory;
use crate::geo::{SolarCalculator, SunTimesProvider};
use crate::io::lock;
use crate::signals::{self, SignalMessage, SignalState};

/// Running daemon state.
pub struct Daemon {
    config: Config,
    config_path: PathBuf,
    directory: GroupDirectory,
    debug_enabled: bool,
}

impl Daemon {
    /// Start one worker per configured group.
    pub fn start(
        config: Config,
        config_path: PathBuf,
        sink: Arc<dyn LightSink>,
        provider: Arc<dyn SunTimesProvider>,
        debug_enabled: bool,
    ) -> Result<Self> {
        let location = config.location()?;
        let directory = GroupDirectory::spawn(
            config.group_settings(),
            location,
            provider,
            sink,
            Duration::from_secs(config.update_interval()),
            debug_enabled,
        )?;

        Ok(Self {
            config,
            config_path,
            directory,
            debug_enabled,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn directory(&self) -> &GroupDirectory {
        &self.directory
    }

    /// Handle one message. Returns false when the daemon should stop.
    pub fn handle_message(&mut self, message: SignalMessage) -> bool {
        match message {
            SignalMessage::Shutdown => return false,
            SignalMessage::Reload => {
                if let Err(e) = self.reload() {
                    log_pipe!();
                    log_warning!("Configuration reload failed, keeping current settings");
                    log_indented!("{:#}", e);
                }
            }
            SignalMessage::Control { request, reply } => {
                if self.debug_enabled {
                    log_pipe!();
                    log_debug!("Control request: {}", request.name());
                }
                let response = self.handle_request(&request);
                let _ = reply.send(response);
            }
        }
        true
    }

    pub fn handle_request(&mut self, request: &ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Reload => match self.reload() {
                Ok(plan) => {
                    ControlResponse::with_data("Configuration reloaded", &plan_summary(&plan))
                }
                Err(e) => ControlResponse::error(format!("{e:#}")),
            },
            other => control::execute(&self.directory, other),
        }
    }

    /// Reload the configuration file and apply what can change at runtime.
    ///
    /// An invalid file leaves everything untouched.
    pub fn reload(&mut self) -> Result<ReloadPlan> {
        let reloaded = config::load_from_path(&self.config_path)?;
        let plan = plan_reload(&self.config, &reloaded);

        log_block_start!("Configuration reloaded");
        if plan.is_empty() {
            log_indented!("No changes");
        }

        for (name, options) in &plan.option_updates {
            self.directory
                .update_options(name, *options)
                .with_context(|| format!("Failed to update group {name}"))?;
            if let (Some(running), Some(new)) =
                (self.config.groups.iter_mut().find(|g| &g.name == name), reloaded.group(name))
            {
                running.sunset_offset = new.sunset_offset;
                running.transition_speed = new.transition_speed.clone();
                running.enable_override_detection = new.enable_override_detection;
            }
            log_indented!(
                "{}: offset {} min, {} transitions, override detection {}",
                name,
                options.sunset_offset,
                options.transition_speed,
                if options.override_detection { "on" } else { "off" }
            );
        }

        for change in &plan.restart_required {
            log_warning!("Change to {} requires a restart, ignoring", change);
        }

        Ok(plan)
    }

    /// Process messages until a shutdown is requested.
    pub fn main_loop(&mut self, signal_state: &SignalState) {
        while signal_state.is_running() {
            let Ok(message) = signal_state.signal_receiver.recv() else {
                break;
            };
            if !self.handle_message(message) {
                break;
            }
        }
    }

    pub fn shutdown(self) {
        self.directory.shutdown();
    }
}

fn plan_summary(plan: &ReloadPlan) -> serde_json::Value {
    serde_json::json!({
        "updated_groups": plan.option_updates.iter().map(|(name, _)| name).collect::<Vec<_>>(),
        "restart_required": plan.restart_required,
    })
}

/// Run the daemon in the foreground until SIGINT/SIGTERM.
pub fn run_daemon(debug_enabled: bool) -> Result<()> {
    log_version!();

    let config = config::load()?;
    let config_path = config::get_config_path()?;
    let location = config.location()?;
    config.log_config(&location);

    let instance_lock = lock::acquire_lock(&lock::lock_path(), &config_path)?;
    let result = run_locked(config, config_path, debug_enabled);
    instance_lock.release();

    result?;
    log_end!();
    Ok(())
}

fn run_locked(config: Config, config_path: PathBuf, debug_enabled: bool) -> Result<()> {
    let signal_state = signals::setup_signal_handler(debug_enabled)?;

    let sink = backend::create_backend(&config)?;
    log_block_start!("Using {} backend", sink.backend_name());

    let provider: Arc<dyn SunTimesProvider> = Arc::new(SolarCalculator::new());
    let mut daemon = Daemon::start(config, config_path.clone(), sink, provider, debug_enabled)?;

    if let Err(e) = config::start_config_watcher(
        config_path,
        signal_state.signal_sender.clone(),
        debug_enabled,
    ) {
        log_warning!("Hot reload disabled: {}", e);
    }

    let server = ControlServer::bind(control::socket_path())?;
    log_decorated!("Control socket: {}", server.socket_path().display());
    let server_handle = server.start(
        signal_state.signal_sender.clone(),
        signal_state.running.clone(),
        debug_enabled,
    )?;

    daemon.main_loop(&signal_state);

    log_block_start!("Shutting down");
    signal_state.running.store(false, Ordering::SeqCst);
    daemon.shutdown();
    if server_handle.join().is_err() {
        log_warning!("Control server thread panicked");
    }

    Ok(())
}
