//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::body::BodyOptions;
use crate::context::ContextDefaults;
use crate::observability::logging::LogFormat;
use crate::static_files::{DotfilesPolicy, SendOptions, StaticOptions};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request body limits.
    pub body: BodyOptions,

    /// Defaults for every response descriptor.
    pub responses: ResponseConfig,

    /// Static file mount. Disabled when `root` is unset.
    pub static_files: StaticFilesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    /// Defaults every request context starts from.
    pub fn context_defaults(&self) -> ContextDefaults {
        ContextDefaults {
            body: self.body.clone(),
            json_pretty: self.responses.json_pretty,
            disable_etag: self.responses.disable_etag,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// How long graceful shutdown waits for in-flight requests, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Indent JSON bodies.
    pub json_pretty: bool,

    /// Skip automatic ETag generation.
    pub disable_etag: bool,
}

/// Static file serving configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Directory to serve from.
    pub root: Option<PathBuf>,

    /// URL prefix the directory is mounted under.
    pub prefix: String,

    pub dotfiles: DotfilesPolicy,

    /// `Cache-Control` max-age in milliseconds.
    pub max_age_ms: u64,

    pub immutable: bool,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: None,
            prefix: "/".to_string(),
            dotfiles: DotfilesPolicy::Ignore,
            max_age_ms: 0,
            immutable: false,
        }
    }
}

impl StaticFilesConfig {
    /// Middleware options, or `None` when no root is configured.
    pub fn options(&self) -> Option<StaticOptions> {
        let root = self.root.clone()?;
        let mut options = StaticOptions::new(root).prefix(self.prefix.clone());
        options.send = SendOptions {
            dotfiles: self.dotfiles,
            max_age_ms: self.max_age_ms,
            immutable: self.immutable,
            ..Default::default()
        };
        Some(options)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// `pretty` or `json`.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_document() {
        let config: ServerConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:4000"

            [body]
            limit = 2048

            [responses]
            json_pretty = true

            [static_files]
            root = "public"
            prefix = "/assets/"
            dotfiles = "deny"
            max_age_ms = 60000

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.body.limit, 2048);
        assert_eq!(config.timeouts.request_secs, 30);
        assert_eq!(config.observability.log_format, LogFormat::Json);

        let defaults = config.context_defaults();
        assert!(defaults.json_pretty);
        assert!(!defaults.disable_etag);

        let options = config.static_files.options().unwrap();
        assert_eq!(options.prefix, "/assets");
        assert_eq!(options.send.dotfiles, DotfilesPolicy::Deny);
        assert_eq!(options.send.max_age_ms, 60000);
    }

    #[test]
    fn test_static_files_disabled_without_root() {
        assert!(ServerConfig::default().static_files.options().is_none());
    }
}
