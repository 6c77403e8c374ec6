//! # Lumaflow Library
//!
//! Internal library for the `lumaflow` binary. It exists so the daemon's
//! internals can be tested directly, and keeps CLI dispatch (`main.rs`)
//! separate from application logic.
//!
//! ## Architecture
//!
//! - **Schedule**: `circadian` turns sun times and group bounds into a phase
//!   and a lighting target; `geo` supplies the sun times.
//! - **Groups**: `core` reconciles one light group per worker thread, with
//!   `overrides` tracking lights adjusted by hand.
//! - **Lights**: `backend` defines the `LightSink` seam with Home Assistant and
//!   in-memory implementations.
//! - **Configuration**: `config` for TOML settings with hot reload.
//! - **Control**: `control` serves the Unix socket the CLI subcommands talk to.
//! - **Infrastructure**: signal handling, the instance lock, logging and the
//!   process clock.

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod args;
pub mod backend;
pub mod circadian;
pub mod commands;
pub mod config;
pub mod constants;
pub mod control;
pub mod core;
pub mod geo;
pub mod io;
pub mod overrides;
pub mod signals;
pub mod time_source;
