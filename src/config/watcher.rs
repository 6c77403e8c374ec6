//! File watching for hot config reloading.
//!
//! The parent directory of the configuration file is watched non-recursively,
//! which also catches editors that save by writing a temp file and renaming it.
//! Bursts of events are debounced before a reload is requested.

use anyhow::{Context, Result};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use crate::constants::CONFIG_RELOAD_DEBOUNCE_MS;
use crate::signals::SignalMessage;

/// Whether a file system event touches the configuration file.
pub(crate) fn affects_config(event: &Event, config_path: &Path) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }

    let Some(config_name) = config_path.file_name() else {
        return false;
    };

    event.paths.iter().any(|path| {
        path == config_path
            || (path.parent() == config_path.parent()
                && path
                    .file_name()
                    .zip(config_name.to_str())
                    .and_then(|(name, config_name)| {
                        name.to_str().map(|name| name.starts_with(config_name))
                    })
                    .unwrap_or(false))
    })
}

/// Start watching `config_path`; changes send [`SignalMessage::Reload`].
pub fn start_config_watcher(
    config_path: PathBuf,
    signal_sender: Sender<SignalMessage>,
    debug_enabled: bool,
) -> Result<()> {
    // notify reports absolute paths
    let config_path = std::path::absolute(&config_path).unwrap_or(config_path);
    let Some(parent) = config_path.parent().map(Path::to_path_buf) else {
        anyhow::bail!(
            "Configuration path {} has no parent directory",
            config_path.display()
        );
    };

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        NotifyConfig::default(),
    )
    .context("Failed to create file watcher")?;

    watcher
        .watch(&parent, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch directory: {}", parent.display()))?;

    if debug_enabled {
        log_pipe!();
        log_debug!("Watching {} for changes", config_path.display());
    }

    thread::Builder::new()
        .name("config-watcher".to_string())
        .spawn(move || {
            // The watcher stops when dropped
            let _watcher = watcher;
            let debounce = Duration::from_millis(CONFIG_RELOAD_DEBOUNCE_MS);
            let mut last_reload: Option<Instant> = None;

            for event in rx.iter() {
                if !affects_config(&event, &config_path) {
                    continue;
                }
                if last_reload.is_some_and(|at| at.elapsed() < debounce) {
                    continue;
                }

                // Let the editor finish writing before the file is read
                thread::sleep(debounce);
                while rx.try_recv().is_ok() {}

                if debug_enabled {
                    log_pipe!();
                    log_debug!("Configuration file change detected");
                }
                if signal_sender.send(SignalMessage::Reload).is_err() {
                    break;
                }
                last_reload = Some(Instant::now());
            }
        })
        .context("Failed to spawn config watcher thread")?;

    Ok(())
}
