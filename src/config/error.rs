//! Configuration errors.

use thiserror::Error;

/// Failures reading or validating environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A port value could not be parsed.
    #[error("invalid port {value:?}: {source}")]
    PortParse {
        /// The offending value.
        value: String,
        /// Parse failure.
        source: std::num::ParseIntError,
    },

    /// Port 0 is reserved.
    #[error("invalid port {value:?}: must be 1-65535")]
    InvalidPort {
        /// The offending value.
        value: String,
    },

    /// A bind address could not be parsed.
    #[error("invalid bind address {value:?}: {source}")]
    InvalidBindAddr {
        /// The offending value.
        value: String,
        /// Parse failure.
        source: std::net::AddrParseError,
    },

    /// An unknown quota period spelling.
    #[error("invalid quota period {value:?}: expected hourly|daily|weekly|monthly|never")]
    InvalidQuotaPeriod {
        /// The offending value.
        value: String,
    },

    /// The model list was empty.
    #[error("no models configured: set {var}")]
    NoModels {
        /// The variable that should carry the list.
        var: &'static str,
    },
}
