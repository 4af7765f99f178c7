//! Trellis configuration.
//!
//! A single TOML file with `#[serde(default)]` sections; a bare section
//! header — or no file at all — produces a working production
//! configuration. Environment variables override the handful of knobs
//! that differ per deployment (bind address, store path, log level).

#![deny(missing_docs)]
#![warn(unreachable_pub)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod loader;
mod types;

pub use loader::{ConfigError, ConfigResult, load, load_from_str};
pub use types::{
    CacheSection, Config, EngineSection, GatewaySection, LoggingSection, StoreSection,
    SyncRetrySection,
};
