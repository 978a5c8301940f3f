//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every field carries a default so an empty file is valid.

pub mod app;
pub mod logging;
pub mod presence;
pub mod rate_limit;
pub mod realtime;
pub mod store;

use serde::{Deserialize, Serialize};

pub use self::app::ServerConfig;
pub use self::logging::LoggingConfig;
pub use self::presence::PresenceConfig;
pub use self::rate_limit::RateLimitConfig;
pub use self::realtime::RealtimeConfig;
pub use self::store::StoreConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Presence reconciliation timings.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Per-identity inbound event admission.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// WebSocket transport settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Persisted presence store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `config/default.toml` with the environment-specific overlay
    /// `config/{env}.toml` and environment variables prefixed with
    /// `BEACON__` (e.g. `BEACON__PRESENCE__GRACE_PERIOD_SECONDS=5`).
    pub fn load(env: &str) -> Result<Self, AppError> {
        Self::load_from("config", env)
    }

    /// Load configuration from an explicit directory.
    pub fn load_from(dir: &str, env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(&format!("{dir}/default")).required(false))
            .add_source(config::File::with_name(&format!("{dir}/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("BEACON")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.rate_limit.max_events == 0 {
            return Err(AppError::configuration(
                "rate_limit.max_events must be greater than zero",
            ));
        }
        if self.presence.coalesce_window_ms == 0 {
            return Err(AppError::configuration(
                "presence.coalesce_window_ms must be greater than zero",
            ));
        }
        let intervals = [
            ("presence.sweep_interval_seconds", self.presence.sweep_interval_seconds),
            ("presence.idle_sweep_interval_seconds", self.presence.idle_sweep_interval_seconds),
            ("rate_limit.window_seconds", self.rate_limit.window_seconds),
            ("rate_limit.sweep_interval_seconds", self.rate_limit.sweep_interval_seconds),
            ("realtime.ping_interval_seconds", self.realtime.ping_interval_seconds),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::configuration(format!(
                "{name} must be greater than zero"
            )));
        }
        Ok(())
    }
}
