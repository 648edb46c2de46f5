//! PRC-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ReclaimError>;

/// Top-level error type for Profile Reclaimer.
#[derive(Debug, Error)]
pub enum ReclaimError {
    #[error("[PRC-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[PRC-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[PRC-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[PRC-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[PRC-2001] filesystem stats failure for {path}: {details}")]
    FsStats { path: PathBuf, details: String },

    #[error("[PRC-2002] profile enumeration failed: {details}")]
    Enumeration { details: String },

    #[error("[PRC-2003] profile deletion failed for {username}: {reason}")]
    Deletion { username: String, reason: String },

    #[error("[PRC-2004] profile no longer present: {path}")]
    ProfileVanished { path: PathBuf },

    #[error("[PRC-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[PRC-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[PRC-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[PRC-3003] platform command `{command}` failed: {details}")]
    Command { command: String, details: String },

    #[error("[PRC-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ReclaimError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "PRC-1001",
            Self::MissingConfig { .. } => "PRC-1002",
            Self::ConfigParse { .. } => "PRC-1003",
            Self::UnsupportedPlatform { .. } => "PRC-1101",
            Self::FsStats { .. } => "PRC-2001",
            Self::Enumeration { .. } => "PRC-2002",
            Self::Deletion { .. } => "PRC-2003",
            Self::ProfileVanished { .. } => "PRC-2004",
            Self::Serialization { .. } => "PRC-2101",
            Self::PermissionDenied { .. } => "PRC-3001",
            Self::Io { .. } => "PRC-3002",
            Self::Command { .. } => "PRC-3003",
            Self::Runtime { .. } => "PRC-3900",
        }
    }

    /// Whether the failure must stop the run before any further work.
    ///
    /// Everything else is absorbed by the component that hit it, logged,
    /// and the run carries on with the next candidate.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::UnsupportedPlatform { .. }
                | Self::Enumeration { .. }
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

    /// Convenience constructor for configuration validation failures.
    #[must_use]
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig {
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for ReclaimError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ReclaimError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ReclaimError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
