//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid JSON.
    #[error("settings file {} is not valid JSON: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Valid JSON whose fields have the wrong types.
    #[error("settings have the wrong shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value parsed but is unusable (e.g. heartbeat timeout below interval).
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_the_file() {
        let source = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err = SettingsError::Parse {
            path: PathBuf::from("/etc/hydrate.json"),
            source,
        };
        assert!(err.to_string().starts_with("settings file /etc/hydrate.json is not valid JSON"));
    }

    #[test]
    fn read_error_keeps_source() {
        let err = SettingsError::Read {
            path: PathBuf::from("/root/settings.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("port out of range".to_string());
        assert_eq!(err.to_string(), "invalid settings value: port out of range");
    }
}
