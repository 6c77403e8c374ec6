//! Signal handling for the daemon.
//!
//! SIGINT and SIGTERM request a shutdown, SIGHUP requests a configuration
//! reload. Signals, the config file watcher and the control socket all feed
//! the same channel, which the daemon's main loop drains.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM},
    iterator::Signals,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, mpsc};
use std::thread;

use crate::control::{ControlRequest, ControlResponse};

/// Unified message type for everything the main loop reacts to.
#[derive(Debug)]
pub enum SignalMessage {
    /// Reload the configuration file (SIGHUP or file change)
    Reload,
    /// Stop all groups and exit (SIGINT, SIGTERM)
    Shutdown,
    /// Request received on the control socket
    Control {
        request: ControlRequest,
        reply: Sender<ControlResponse>,
    },
}

/// Signal handling state shared between threads
pub struct SignalState {
    /// Cleared once a shutdown has been requested
    pub running: Arc<AtomicBool>,
    pub signal_receiver: Receiver<SignalMessage>,
    /// Handed to the config watcher and the control server
    pub signal_sender: Sender<SignalMessage>,
}

impl SignalState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Map a raw signal number to the message it triggers.
pub fn message_for_signal(sig: i32) -> Option<SignalMessage> {
    match sig {
        SIGINT | SIGTERM => Some(SignalMessage::Shutdown),
        SIGHUP => Some(SignalMessage::Reload),
        _ => None,
    }
}

/// Register signal handlers and spawn the thread that forwards them.
pub fn setup_signal_handler(debug_enabled: bool) -> Result<SignalState> {
    let running = Arc::new(AtomicBool::new(true));
    let (signal_sender, signal_receiver) = mpsc::channel::<SignalMessage>();

    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).context("failed to register signal handlers")?;

    let running_clone = running.clone();
    let sender = signal_sender.clone();

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                let Some(message) = message_for_signal(sig) else {
                    continue;
                };

                match &message {
                    SignalMessage::Shutdown => {
                        log_pipe!();
                        log_info!("Received shutdown signal");
                        running_clone.store(false, Ordering::SeqCst);
                    }
                    SignalMessage::Reload => {
                        if debug_enabled {
                            log_pipe!();
                            log_debug!("Received SIGHUP, reloading configuration");
                        }
                    }
                    SignalMessage::Control { .. } => {}
                }

                if sender.send(message).is_err() {
                    break;
                }
            }
        })
        .context("failed to spawn signal handler thread")?;

    Ok(SignalState {
        running,
        signal_receiver,
        signal_sender,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_mapping() {
        assert!(matches!(
            message_for_signal(SIGTERM),
            Some(SignalMessage::Shutdown)
        ));
        assert!(matches!(
            message_for_signal(SIGINT),
            Some(SignalMessage::Shutdown)
        ));
        assert!(matches!(
            message_for_signal(SIGHUP),
            Some(SignalMessage::Reload)
        ));
        assert!(message_for_signal(signal_hook::consts::signal::SIGUSR1).is_none());
    }
}
