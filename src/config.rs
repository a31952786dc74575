//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

/// Error raised when a configuration value is present but unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `LISTEN_ADDR` is not a socket address.
    #[error("invalid LISTEN_ADDR `{value}`: {source}")]
    InvalidListenAddr {
        /// Raw value.
        value: String,
        /// Parse failure.
        source: std::net::AddrParseError,
    },

    /// `UPSTREAM_BASE_URL` is not an absolute URL.
    #[error("invalid UPSTREAM_BASE_URL `{value}`: {source}")]
    InvalidUpstreamUrl {
        /// Raw value.
        value: String,
        /// Parse failure.
        source: url::ParseError,
    },
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Base URL every upstream fetch is resolved against.
    pub upstream_base_url: Url,

    /// Deadline applied to shared upstream fetches.
    pub upstream_timeout: Duration,

    /// TTL used by the cached endpoint when the request gives none.
    pub cache_default_ttl: Duration,

    /// Registry entries older than this are swept.
    pub registry_max_age: Duration,

    /// Interval between sweeps; `None` disables the sweeper.
    pub sweep_interval: Option<Duration>,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `LISTEN_ADDR` or `UPSTREAM_BASE_URL` is
    /// set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `LISTEN_ADDR` or `UPSTREAM_BASE_URL` is
    /// set but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr_raw = lookup("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let listen_addr = listen_addr_raw
            .parse::<SocketAddr>()
            .map_err(|source| ConfigError::InvalidListenAddr {
                value: listen_addr_raw.clone(),
                source,
            })?;

        let upstream_raw =
            lookup("UPSTREAM_BASE_URL").unwrap_or_else(|| "http://localhost:8080".to_string());
        let upstream_base_url =
            Url::parse(&upstream_raw).map_err(|source| ConfigError::InvalidUpstreamUrl {
                value: upstream_raw.clone(),
                source,
            })?;

        let upstream_timeout =
            Duration::from_millis(parse_var(&lookup, "UPSTREAM_TIMEOUT_MS", 30_000));
        let cache_default_ttl =
            Duration::from_millis(parse_var(&lookup, "CACHE_DEFAULT_TTL_MS", 300_000));
        let registry_max_age =
            Duration::from_secs(parse_var(&lookup, "REGISTRY_MAX_AGE_SECS", 3_600));
        let sweep_interval = match parse_var(&lookup, "SWEEP_INTERVAL_SECS", 60) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let event_bus_capacity = parse_var(&lookup, "EVENT_BUS_CAPACITY", 1_024);
        let log_json = lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));

        Ok(Self {
            listen_addr,
            upstream_base_url,
            upstream_timeout,
            cache_default_ttl,
            registry_max_age,
            sweep_interval,
            event_bus_capacity,
            log_json,
        })
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
