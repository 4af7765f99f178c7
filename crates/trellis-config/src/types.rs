//! Configuration types.
//!
//! Every section implements [`Default`] with production values, so a
//! bare `[section]` header in TOML yields a working configuration.
//! Durations are plain integer fields in the unit their name states;
//! accessors convert to [`Duration`] at the call site.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the Trellis server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Room engine timing and retry behaviour.
    pub engine: EngineSection,
    /// WebSocket gateway settings.
    pub gateway: GatewaySection,
    /// Warm cache TTLs.
    pub cache: CacheSection,
    /// Durable store location.
    pub store: StoreSection,
    /// Logging level and format.
    pub logging: LoggingSection,
}

/// Room engine timing knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Broadcast debounce window in milliseconds.
    pub broadcast_debounce_ms: u64,
    /// Durable sync debounce window in milliseconds.
    pub sync_debounce_ms: u64,
    /// Budget for the access check + room load during a join.
    pub join_timeout_ms: u64,
    /// Upper bound on finalization (drain + persist) per room.
    pub finalization_deadline_ms: u64,
    /// Retry behaviour for failed durable-store writes.
    pub sync_retry: SyncRetrySection,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            broadcast_debounce_ms: 500,
            sync_debounce_ms: 30_000,
            join_timeout_ms: 10_000,
            finalization_deadline_ms: 60_000,
            sync_retry: SyncRetrySection::default(),
        }
    }
}

impl EngineSection {
    /// Broadcast debounce as a [`Duration`].
    #[must_use]
    pub const fn broadcast_debounce(&self) -> Duration {
        Duration::from_millis(self.broadcast_debounce_ms)
    }

    /// Sync debounce as a [`Duration`].
    #[must_use]
    pub const fn sync_debounce(&self) -> Duration {
        Duration::from_millis(self.sync_debounce_ms)
    }

    /// Join timeout as a [`Duration`].
    #[must_use]
    pub const fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Finalization deadline as a [`Duration`].
    #[must_use]
    pub const fn finalization_deadline(&self) -> Duration {
        Duration::from_millis(self.finalization_deadline_ms)
    }
}

/// Exponential back-off for durable-store write retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncRetrySection {
    /// First retry delay in milliseconds.
    pub initial_ms: u64,
    /// Delay cap in milliseconds.
    pub max_ms: u64,
    /// Jitter band around each delay, in percent (±).
    pub jitter_pct: u8,
}

impl Default for SyncRetrySection {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            max_ms: 30_000,
            jitter_pct: 20,
        }
    }
}

/// WebSocket gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Listen address, `host:port`.
    pub bind: String,
    /// Server ping cadence in milliseconds.
    pub ping_interval_ms: u64,
    /// Drop a connection after this long without any inbound traffic.
    pub ping_timeout_ms: u64,
    /// Maximum accepted frame size in bytes.
    pub max_frame_bytes: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9280".to_owned(),
            ping_interval_ms: 25_000,
            ping_timeout_ms: 60_000,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

impl GatewaySection {
    /// Ping cadence as a [`Duration`].
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Idle timeout as a [`Duration`].
    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

/// Warm cache TTLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Room entry TTL in seconds, refreshed on write.
    pub room_ttl_secs: u64,
    /// Cursor entry TTL in seconds.
    pub cursor_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            room_ttl_secs: 86_400,
            cursor_ttl_secs: 30,
        }
    }
}

impl CacheSection {
    /// Room TTL as a [`Duration`].
    #[must_use]
    pub const fn room_ttl(&self) -> Duration {
        Duration::from_secs(self.room_ttl_secs)
    }

    /// Cursor TTL as a [`Duration`].
    #[must_use]
    pub const fn cursor_ttl(&self) -> Duration {
        Duration::from_secs(self.cursor_ttl_secs)
    }
}

/// Durable store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Filesystem path for the embedded store. Empty means in-memory
    /// (data is lost on exit — development only).
    pub path: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: "./data/trellis".to_owned(),
        }
    }
}

/// Logging level and output format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default directive for the env filter (overridden by `RUST_LOG`).
    pub level: String,
    /// `"pretty"` for humans, `"json"` for log shippers.
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_knobs() {
        let config = Config::default();
        assert_eq!(config.engine.broadcast_debounce(), Duration::from_millis(500));
        assert_eq!(config.engine.sync_debounce(), Duration::from_secs(30));
        assert_eq!(config.engine.join_timeout(), Duration::from_secs(10));
        assert_eq!(config.engine.finalization_deadline(), Duration::from_secs(60));
        assert_eq!(config.engine.sync_retry.initial_ms, 1_000);
        assert_eq!(config.engine.sync_retry.max_ms, 30_000);
        assert_eq!(config.engine.sync_retry.jitter_pct, 20);
        assert_eq!(config.gateway.ping_interval(), Duration::from_secs(25));
        assert_eq!(config.gateway.ping_timeout(), Duration::from_secs(60));
        assert_eq!(config.cache.room_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.cache.cursor_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn bare_section_headers_parse_to_defaults() {
        let config: Config = toml::from_str("[engine]\n[gateway]\n[logging]\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[engine]\nbroadcast_debounce_ms = 100\n").unwrap();
        assert_eq!(config.engine.broadcast_debounce_ms, 100);
        assert_eq!(config.engine.sync_debounce_ms, 30_000);
    }
}
