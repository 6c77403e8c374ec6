//! Client side of the control socket, used by the CLI subcommands.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use super::{ControlRequest, ControlResponse};
use crate::constants::CONTROL_REPLY_TIMEOUT_SECS;

pub struct ControlClient {
    stream: UnixStream,
    reader: BufReader<UnixStream>,
}

impl ControlClient {
    /// Connect to the running daemon's socket.
    pub fn connect_default() -> Result<Self> {
        Self::connect(&super::socket_path())
    }

    pub fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).with_context(|| {
            format!(
                "Failed to connect to lumaflow at {}. Is the daemon running?",
                socket_path.display()
            )
        })?;

        // A forced tick can take a while with many slow lights
        stream
            .set_read_timeout(Some(Duration::from_secs(CONTROL_REPLY_TIMEOUT_SECS + 5)))
            .context("Failed to set read timeout on control socket")?;

        let reader = BufReader::new(
            stream
                .try_clone()
                .context("Failed to clone stream for reader")?,
        );

        Ok(Self { stream, reader })
    }

    /// Send one request and wait for its response.
    pub fn send(&mut self, request: &ControlRequest) -> Result<ControlResponse> {
        let json = serde_json::to_string(request).context("Failed to serialize request")?;
        writeln!(self.stream, "{json}").context("Failed to send request")?;
        self.stream.flush().context("Failed to flush request")?;

        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .context("Failed to read response from control socket")?;
        if line.trim().is_empty() {
            anyhow::bail!("Connection closed by the daemon");
        }

        serde_json::from_str(line.trim())
            .with_context(|| format!("Failed to parse response: {}", line.trim()))
    }
}
