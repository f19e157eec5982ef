use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Origin of the tutor web app, e.g. `https://caatuu.example`.
    pub origin: String,
    pub ws_path: String,
    /// WebSocket endpoint derived from `origin` and `ws_path`.
    pub ws_url: String,
    pub default_difficulty: String,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    pub reconnect_jitter: Duration,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub sim_latency_min: Duration,
    pub sim_latency_max: Duration,
    pub log_level: Level,
}

const DEFAULT_ORIGIN: &str = "http://127.0.0.1:3000";
const DEFAULT_WS_PATH: &str = "/ws";

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            ws_url: "ws://127.0.0.1:3000/ws".to_string(),
            default_difficulty: "hsk3".to_string(),
            reconnect_base: Duration::from_millis(1_000),
            reconnect_cap: Duration::from_millis(15_000),
            reconnect_jitter: Duration::from_millis(500),
            connect_timeout: Duration::from_millis(2_500),
            heartbeat_interval: Duration::from_millis(25_000),
            sim_latency_min: Duration::from_millis(200),
            sim_latency_max: Duration::from_millis(450),
            log_level: Level::INFO,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Self::default();

        let origin = std::env::var("CAATUU_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());
        let ws_path =
            std::env::var("CAATUU_WS_PATH").unwrap_or_else(|_| DEFAULT_WS_PATH.to_string());
        let ws_url = endpoint_for_origin(&origin, &ws_path)?;

        let default_difficulty =
            std::env::var("DEFAULT_DIFFICULTY").unwrap_or(defaults.default_difficulty);

        let reconnect_base = env_millis("RECONNECT_BASE_MS", defaults.reconnect_base)?;
        let reconnect_cap = env_millis("RECONNECT_CAP_MS", defaults.reconnect_cap)?;
        let reconnect_jitter = env_millis("RECONNECT_JITTER_MS", defaults.reconnect_jitter)?;
        let connect_timeout = env_millis("CONNECT_TIMEOUT_MS", defaults.connect_timeout)?;
        let heartbeat_interval =
            env_millis("HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval)?;
        let sim_latency_min = env_millis("SIM_LATENCY_MIN_MS", defaults.sim_latency_min)?;
        let sim_latency_max = env_millis("SIM_LATENCY_MAX_MS", defaults.sim_latency_max)?;

        if reconnect_base.is_zero() {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_BASE_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if reconnect_cap < reconnect_base {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_CAP_MS".to_string(),
                "must not be smaller than RECONNECT_BASE_MS".to_string(),
            ));
        }
        if heartbeat_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "HEARTBEAT_INTERVAL_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if sim_latency_min > sim_latency_max {
            return Err(ConfigError::InvalidValue(
                "SIM_LATENCY_MIN_MS".to_string(),
                "must not exceed SIM_LATENCY_MAX_MS".to_string(),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            origin,
            ws_path,
            ws_url,
            default_difficulty,
            reconnect_base,
            reconnect_cap,
            reconnect_jitter,
            connect_timeout,
            heartbeat_interval,
            sim_latency_min,
            sim_latency_max,
            log_level,
        })
    }

    /// Points the client at a different origin, recomputing the endpoint.
    pub fn with_origin(mut self, origin: &str) -> Result<Self, ConfigError> {
        self.ws_url = endpoint_for_origin(origin, &self.ws_path)?;
        self.origin = origin.to_string();
        Ok(self)
    }
}

/// Derives the WebSocket endpoint for a page origin.
///
/// The scheme mirrors the origin (`https` → `wss`, `http` → `ws`) and the host
/// and port are kept as-is. Any path on the origin is replaced by `path`.
pub fn endpoint_for_origin(origin: &str, path: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| {
        ConfigError::InvalidValue("CAATUU_ORIGIN".to_string(), format!("'{origin}': {reason}"))
    };

    let (scheme, rest) = origin
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;
    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        _ => return Err(invalid("scheme must be http or https")),
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    let path = path.trim();
    let separator = if path.starts_with('/') { "" } else { "/" };
    Ok(format!("{ws_scheme}://{host}{separator}{path}"))
}

fn env_millis(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
