//! Unix socket server for the control protocol.
//!
//! The listener is polled non-blocking so the thread notices shutdown. Each
//! accepted connection gets its own thread that reads request lines, forwards
//! them to the main loop and writes back the answers.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{ControlRequest, ControlResponse};
use crate::constants::{CONTROL_POLL_INTERVAL_MS, CONTROL_REPLY_TIMEOUT_SECS};
use crate::signals::SignalMessage;

pub struct ControlServer {
    socket_path: PathBuf,
    listener: UnixListener,
}

impl ControlServer {
    /// Bind the control socket, replacing a stale socket file.
    pub fn bind(socket_path: PathBuf) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(&socket_path).with_context(|| {
                format!("Failed to remove existing socket: {}", socket_path.display())
            })?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create socket directory: {}", parent.display())
            })?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {}", socket_path.display()))?;
        listener
            .set_nonblocking(true)
            .context("Failed to set socket to non-blocking mode")?;

        Ok(Self {
            socket_path,
            listener,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve requests on a background thread until `running` is cleared.
    pub fn start(
        self,
        sender: Sender<SignalMessage>,
        running: Arc<AtomicBool>,
        debug_enabled: bool,
    ) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("control-server".to_string())
            .spawn(move || {
                if let Err(e) = self.run(sender, running, debug_enabled) {
                    log_warning!("Control server stopped: {}", e);
                }
            })
            .context("Failed to spawn control server thread")
    }

    fn run(
        self,
        sender: Sender<SignalMessage>,
        running: Arc<AtomicBool>,
        debug_enabled: bool,
    ) -> Result<()> {
        if debug_enabled {
            log_debug!("Control socket listening on {}", self.socket_path.display());
        }

        while running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    let sender = sender.clone();
                    let spawned = thread::Builder::new()
                        .name("control-client".to_string())
                        .spawn(move || {
                            if let Err(e) = serve_client(stream, &sender)
                                && debug_enabled
                            {
                                log_debug!("Control client error: {}", e);
                            }
                        });
                    if let Err(e) = spawned {
                        log_warning!("Failed to spawn control client thread: {}", e);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(CONTROL_POLL_INTERVAL_MS));
                }
                Err(e) => {
                    if debug_enabled {
                        log_debug!("Error accepting control connection: {}", e);
                    }
                    thread::sleep(Duration::from_millis(CONTROL_POLL_INTERVAL_MS));
                }
            }
        }

        self.cleanup()
    }

    fn cleanup(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).with_context(|| {
                format!("Failed to remove socket file: {}", self.socket_path.display())
            })?;
        }
        Ok(())
    }
}

/// Answer every request line of one connection.
fn serve_client(stream: UnixStream, sender: &Sender<SignalMessage>) -> Result<()> {
    stream
        .set_nonblocking(false)
        .context("Failed to set client stream to blocking mode")?;
    let reader = BufReader::new(
        stream
            .try_clone()
            .context("Failed to clone stream for reader")?,
    );
    let mut writer = BufWriter::new(stream);

    for line in reader.lines() {
        let line = line.context("Failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }

        let response = respond(&line, sender);
        let json = serde_json::to_string(&response).context("Failed to serialize response")?;
        writeln!(writer, "{json}").context("Failed to write response")?;
        writer.flush().context("Failed to flush response")?;
    }

    Ok(())
}

/// Parse, validate and dispatch one request line.
pub(crate) fn respond(line: &str, sender: &Sender<SignalMessage>) -> ControlResponse {
    let request: ControlRequest = match serde_json::from_str(line.trim()) {
        Ok(request) => request,
        Err(e) => return ControlResponse::error(format!("Invalid request: {e}")),
    };
    if let Err(e) = request.validate() {
        return ControlResponse::error(e.to_string());
    }

    let (reply, answer) = mpsc::channel();
    if sender
        .send(SignalMessage::Control { request, reply })
        .is_err()
    {
        return ControlResponse::error("Daemon is shutting down");
    }

    answer
        .recv_timeout(Duration::from_secs(CONTROL_REPLY_TIMEOUT_SECS))
        .unwrap_or_else(|_| ControlResponse::error("Timed out waiting for the daemon"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stand-in for the main loop: answers every control message with its name.
    fn echo_loop() -> Sender<SignalMessage> {
        let (sender, receiver) = mpsc::channel::<SignalMessage>();
        thread::spawn(move || {
            for message in receiver {
                if let SignalMessage::Control { request, reply } = message {
                    let _ = reply.send(ControlResponse::success(request.name()));
                }
            }
        });
        sender
    }

    #[test]
    fn test_respond_rejects_invalid_requests() {
        let sender = echo_loop();

        let garbage = respond("not json", &sender);
        assert!(!garbage.ok);

        let invalid = respond(
            r#"{"command": "override_lights", "lights": ["light.a"], "brightness": 0}"#,
            &sender,
        );
        assert!(!invalid.ok);
        assert!(invalid.message.unwrap().contains("brightness"));
    }

    #[test]
    fn test_respond_forwards_valid_requests() {
        let sender = echo_loop();
        let response = respond(r#"{"command": "enable", "group": "kitchen"}"#, &sender);
        assert!(response.ok);
        assert_eq!(response.message.as_deref(), Some("enable"));
    }

    #[test]
    fn test_server_round_trip_and_cleanup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let socket_path = temp_dir.path().join("lumaflow-test.sock");
        let running = Arc::new(AtomicBool::new(true));

        let server = ControlServer::bind(socket_path.clone()).unwrap();
        assert!(socket_path.exists());
        let handle = server
            .start(echo_loop(), running.clone(), false)
            .unwrap();

        let mut client = super::super::ControlClient::connect(&socket_path).unwrap();
        let response = client.send(&ControlRequest::Status).unwrap();
        assert_eq!(response.message.as_deref(), Some("status"));
        let response = client
            .send(&ControlRequest::TurnOff {
                group: "hall".into(),
            })
            .unwrap();
        assert_eq!(response.message.as_deref(), Some("turn_off"));

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
        assert!(!socket_path.exists());
    }
}
