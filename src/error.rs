//! Error types and handling for the VPN orchestrator

use thiserror::Error;

/// Main error type for VPN operations
#[derive(Error, Debug)]
pub enum VpnError {
    /// Malformed share link or missing required component
    #[error("Parse error: {0}")]
    Parse(String),

    /// Scheme or registry lookup without a matching provider
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// A tunnel is already up
    #[error("Already connected")]
    AlreadyConnected,

    /// A connect attempt is still in flight
    #[error("Connection in progress")]
    ConnectionInProgress,

    /// No tunnel to tear down
    #[error("Not connected")]
    NotConnected,

    /// Operation not permitted in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Unknown connection mode
    #[error("Invalid mode: {0} (must be proxy, tun, or tap)")]
    InvalidMode(String),

    /// Unknown interface language
    #[error("Invalid language: {0} (must be en or ru)")]
    InvalidLanguage(String),

    /// Configuration errors, including protocol payloads rejected by a provider
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine process spawn, exit and termination errors
    #[error("Process error: {0}")]
    Process(String),

    /// Telemetry errors
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Unknown connection id
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// Settings document errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for VPN operations
pub type Result<T> = std::result::Result<T, VpnError>;

impl From<toml::de::Error> for VpnError {
    fn from(err: toml::de::Error) -> Self {
        VpnError::Config(format!("TOML parsing error: {err}"))
    }
}

impl From<url::ParseError> for VpnError {
    fn from(err: url::ParseError) -> Self {
        VpnError::Parse(format!("failed to parse URL: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VpnError::Config("test config error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test config error");

        let err = VpnError::UnsupportedProtocol("gopher".to_string());
        assert_eq!(err.to_string(), "Unsupported protocol: gopher");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let vpn_err: VpnError = io_err.into();
        assert!(matches!(vpn_err, VpnError::Io(_)));

        let url_err = url::Url::parse("invalid-url").unwrap_err();
        let vpn_err: VpnError = url_err.into();
        assert!(matches!(vpn_err, VpnError::Parse(_)));
    }
}
