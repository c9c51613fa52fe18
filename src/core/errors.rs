//! DKH-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DeckhandError>;

/// Top-level error type for deckhand.
#[derive(Debug, Error)]
pub enum DeckhandError {
    #[error("[DKH-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DKH-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DKH-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DKH-2001] widget script not found: {name}")]
    WidgetNotFound { name: String },

    #[error("[DKH-2002] widget rejected by trust policy: {reason}")]
    TrustRejected { reason: String },

    #[error("[DKH-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DKH-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[DKH-3001] failed to spawn {path}: {details}")]
    Spawn { path: PathBuf, details: String },

    #[error("[DKH-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DKH-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DKH-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DeckhandError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DKH-1001",
            Self::MissingConfig { .. } => "DKH-1002",
            Self::ConfigParse { .. } => "DKH-1003",
            Self::WidgetNotFound { .. } => "DKH-2001",
            Self::TrustRejected { .. } => "DKH-2002",
            Self::Serialization { .. } => "DKH-2101",
            Self::Sql { .. } => "DKH-2102",
            Self::Spawn { .. } => "DKH-3001",
            Self::Io { .. } => "DKH-3002",
            Self::ChannelClosed { .. } => "DKH-3003",
            Self::Runtime { .. } => "DKH-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Trust and configuration failures are deliberate decisions, not
    /// transient conditions; they stay false so the orchestrator never
    /// re-runs a rejected widget without a config change.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::Spawn { .. }
                | Self::Sql { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DeckhandError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for DeckhandError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DeckhandError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_errors() -> Vec<DeckhandError> {
        vec![
            DeckhandError::InvalidConfig {
                details: String::new(),
            },
            DeckhandError::MissingConfig {
                path: PathBuf::new(),
            },
            DeckhandError::ConfigParse {
                context: "",
                details: String::new(),
            },
            DeckhandError::WidgetNotFound {
                name: String::new(),
            },
            DeckhandError::TrustRejected {
                reason: String::new(),
            },
            DeckhandError::Serialization {
                context: "",
                details: String::new(),
            },
            DeckhandError::Sql {
                context: "",
                details: String::new(),
            },
            DeckhandError::Spawn {
                path: PathBuf::new(),
                details: String::new(),
            },
            DeckhandError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            DeckhandError::ChannelClosed { component: "" },
            DeckhandError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = sample_errors();
        let codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_dkh_prefix() {
        for err in &sample_errors() {
            assert!(
                err.code().starts_with("DKH-"),
                "code {} must start with DKH-",
                err.code()
            );
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = DeckhandError::InvalidConfig {
            details: "bad value".to_string(),
        };
        let msg = err.to_string();
        assert!(
            msg.contains("DKH-1001"),
            "display should contain error code: {msg}"
        );
        assert!(
            msg.contains("bad value"),
            "display should contain details: {msg}"
        );
    }

    #[test]
    fn trust_rejection_is_not_retryable() {
        assert!(
            !DeckhandError::TrustRejected {
                reason: String::new()
            }
            .is_retryable()
        );
        assert!(
            !DeckhandError::WidgetNotFound {
                name: String::new()
            }
            .is_retryable()
        );
        assert!(
            !DeckhandError::InvalidConfig {
                details: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(
            DeckhandError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            }
            .is_retryable()
        );
        assert!(
            DeckhandError::Spawn {
                path: PathBuf::new(),
                details: String::new()
            }
            .is_retryable()
        );
        assert!(DeckhandError::ChannelClosed { component: "test" }.is_retryable());
    }

    #[test]
    fn io_convenience_constructor() {
        let err = DeckhandError::io(
            "/tmp/widget.sh",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "DKH-3002");
        assert!(err.to_string().contains("/tmp/widget.sh"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn from_rusqlite_error() {
        let sql_err =
            rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(1), Some("test".to_string()));
        let err: DeckhandError = sql_err.into();
        assert_eq!(err.code(), "DKH-2102");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: DeckhandError = toml_err.into();
        assert_eq!(err.code(), "DKH-1003");
    }
}
