//! Environment configuration for the standalone binary, plus typed option
//! structs shared with the embedding API.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::env;
use std::net::IpAddr;
use std::time::Duration;

use crate::quota::QuotaPeriod;

/// Cross-origin resource sharing policy for the HTTP surface.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` allows any.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    /// Ignored when origins contain `"*"` (the combination is invalid).
    pub allow_credentials: bool,
    pub exposed_headers: Vec<String>,
    pub max_age: Option<Duration>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec!["authorization".to_string(), "content-type".to_string()],
            allow_credentials: false,
            exposed_headers: Vec::new(),
            max_age: Some(Duration::from_secs(600)),
        }
    }
}

impl CorsConfig {
    /// Whether any origin is allowed.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Environment-backed configuration for the `crossbar` binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_addr: IpAddr,

    /// Upstream base URL, e.g. `https://api.openai.com/v1`.
    pub upstream_url: String,
    /// Version prefix already present in `upstream_url`.
    pub upstream_base_path: String,
    pub upstream_api_key: Option<String>,
    /// Model ids routed to the upstream.
    pub models: Vec<String>,

    /// Client `key=tenant` pairs; empty means unauthenticated access.
    pub api_keys: Vec<String>,

    pub cache_ttl: Duration,
    pub cache_max_items: usize,
    pub cache_max_bytes: usize,

    pub rate_rps: f64,
    pub rate_burst: f64,

    /// 0 disables quota enforcement.
    pub quota_limit: u64,
    pub quota_period: QuotaPeriod,
}

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openai.com/v1";

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            upstream_base_path: "/v1".to_string(),
            upstream_api_key: None,
            models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
            api_keys: Vec::new(),
            cache_ttl: Duration::from_secs(300),
            cache_max_items: 10_000,
            cache_max_bytes: 256 * 1024 * 1024,
            rate_rps: 10.0,
            rate_burst: 20.0,
            quota_limit: 0,
            quota_period: QuotaPeriod::Monthly,
        }
    }
}

impl Config {
    const ENV_PORT: &'static str = "CROSSBAR_PORT";
    const ENV_BIND_ADDR: &'static str = "CROSSBAR_BIND_ADDR";
    const ENV_UPSTREAM_URL: &'static str = "CROSSBAR_UPSTREAM_URL";
    const ENV_UPSTREAM_BASE_PATH: &'static str = "CROSSBAR_UPSTREAM_BASE_PATH";
    const ENV_UPSTREAM_API_KEY: &'static str = "CROSSBAR_UPSTREAM_API_KEY";
    const ENV_MODELS: &'static str = "CROSSBAR_MODELS";
    const ENV_API_KEYS: &'static str = "CROSSBAR_API_KEYS";
    const ENV_CACHE_TTL_SECS: &'static str = "CROSSBAR_CACHE_TTL_SECS";
    const ENV_CACHE_MAX_ITEMS: &'static str = "CROSSBAR_CACHE_MAX_ITEMS";
    const ENV_CACHE_MAX_BYTES: &'static str = "CROSSBAR_CACHE_MAX_BYTES";
    const ENV_RATE_RPS: &'static str = "CROSSBAR_RATE_RPS";
    const ENV_RATE_BURST: &'static str = "CROSSBAR_RATE_BURST";
    const ENV_QUOTA_LIMIT: &'static str = "CROSSBAR_QUOTA_LIMIT";
    const ENV_QUOTA_PERIOD: &'static str = "CROSSBAR_QUOTA_PERIOD";

    /// Reads configuration from `CROSSBAR_*` environment variables,
    /// falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;
        let upstream_url =
            Self::parse_string_from_env(Self::ENV_UPSTREAM_URL, defaults.upstream_url);
        let upstream_base_path =
            Self::parse_string_from_env(Self::ENV_UPSTREAM_BASE_PATH, defaults.upstream_base_path);
        let upstream_api_key = Self::parse_optional_string_from_env(Self::ENV_UPSTREAM_API_KEY)
            .or_else(|| Self::parse_optional_string_from_env("OPENAI_API_KEY"));
        let models = Self::parse_list_from_env(Self::ENV_MODELS, defaults.models);
        let api_keys = Self::parse_list_from_env(Self::ENV_API_KEYS, defaults.api_keys);
        let quota_period = Self::parse_quota_period_from_env(defaults.quota_period)?;

        Ok(Self {
            port,
            bind_addr,
            upstream_url,
            upstream_base_path,
            upstream_api_key,
            models,
            api_keys,
            cache_ttl: Duration::from_secs(Self::parse_u64_from_env(
                Self::ENV_CACHE_TTL_SECS,
                defaults.cache_ttl.as_secs(),
            )),
            cache_max_items: Self::parse_u64_from_env(
                Self::ENV_CACHE_MAX_ITEMS,
                defaults.cache_max_items as u64,
            ) as usize,
            cache_max_bytes: Self::parse_u64_from_env(
                Self::ENV_CACHE_MAX_BYTES,
                defaults.cache_max_bytes as u64,
            ) as usize,
            rate_rps: Self::parse_f64_from_env(Self::ENV_RATE_RPS, defaults.rate_rps),
            rate_burst: Self::parse_f64_from_env(Self::ENV_RATE_BURST, defaults.rate_burst),
            quota_limit: Self::parse_u64_from_env(Self::ENV_QUOTA_LIMIT, defaults.quota_limit),
            quota_period,
        })
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::NoModels {
                var: Self::ENV_MODELS,
            });
        }
        Ok(())
    }

    /// `bind_addr:port` for the listener.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParse {
                    value: value.clone(),
                    source: e,
                })?;
                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }
                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_quota_period_from_env(default: QuotaPeriod) -> Result<QuotaPeriod, ConfigError> {
        match env::var(Self::ENV_QUOTA_PERIOD) {
            Ok(value) => {
                QuotaPeriod::parse(&value).ok_or(ConfigError::InvalidQuotaPeriod { value })
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    fn parse_optional_string_from_env(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_list_from_env(var_name: &str, default: Vec<String>) -> Vec<String> {
        match env::var(var_name) {
            Ok(value) => Self::split_list(&value),
            Err(_) => default,
        }
    }

    fn split_list(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn parse_u64_from_env(var_name: &str, default: u64) -> u64 {
        env::var(var_name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn parse_f64_from_env(var_name: &str, default: f64) -> f64 {
        env::var(var_name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }
}
