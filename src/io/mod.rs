//! Process-level I/O: runtime directory and the single-instance lock.

pub mod lock;

use nix::unistd::getuid;
use std::path::PathBuf;

/// Per-user runtime directory for the socket and lock file.
///
/// `$XDG_RUNTIME_DIR`, falling back to `/run/user/{uid}`.
pub fn runtime_dir() -> PathBuf {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(format!("/run/user/{}", getuid())),
    }
}
