//! DCH-prefixed error types with structured error codes.
//!
//! Per-entry and per-directory failures during a scan are absorbed inside
//! the enumeration layer (counted, optionally logged) and never surface
//! here; `CharterError` covers the conditions that genuinely abort an
//! operation — an unusable scan root, bad configuration, output failures.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, CharterError>;

/// Top-level error type for disk_charter.
#[derive(Debug, Error)]
pub enum CharterError {
    #[error("[DCH-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DCH-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DCH-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DCH-2001] scan root {path} is not statable: {source}")]
    ScanRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DCH-2002] scan root {path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("[DCH-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DCH-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CharterError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DCH-1001",
            Self::MissingConfig { .. } => "DCH-1002",
            Self::ConfigParse { .. } => "DCH-1003",
            Self::ScanRoot { .. } => "DCH-2001",
            Self::NotADirectory { .. } => "DCH-2002",
            Self::Serialization { .. } => "DCH-2101",
            Self::Io { .. } => "DCH-3001",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::ScanRoot { .. })
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

impl From<serde_json::Error> for CharterError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for CharterError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
