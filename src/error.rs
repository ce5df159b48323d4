//! Error types for disk health monitoring.
//!
//! Every device accessor reports failures through [`SmartError`] so that one
//! failed query never invalidates its siblings: callers decide per field
//! whether to degrade or to surface the failure.

use std::io;
use thiserror::Error;

/// Error type for S.M.A.R.T. monitoring operations.
#[derive(Debug, Error)]
pub enum SmartError {
    /// The device path could not be opened as a S.M.A.R.T.-capable device.
    #[error("can't open {path}: {message}")]
    DeviceOpen {
        /// Device path.
        path: String,
        /// errno-equivalent code.
        errno: i32,
        /// Human readable reason.
        message: String,
    },

    /// Reading the S.M.A.R.T. data block failed.
    #[error("can't read S.M.A.R.T. data from {path}: {message}")]
    SmartRead {
        /// Device path.
        path: String,
        /// errno-equivalent code.
        errno: i32,
        /// Human readable reason.
        message: String,
    },

    /// A single attribute query failed.
    #[error("can't get {what} of {path}: {message}")]
    SmartQuery {
        /// Device path.
        path: String,
        /// The attribute being queried.
        what: &'static str,
        /// errno-equivalent code.
        errno: i32,
        /// Human readable reason.
        message: String,
    },

    /// A feature was requested that the device does not provide.
    #[error("{feature} is not supported by {path}")]
    Unsupported {
        /// Device path.
        path: String,
        /// The missing feature.
        feature: &'static str,
    },

    /// Configuration parsing error with line number.
    #[error("configuration error at line {line}: {message}")]
    ConfigParse {
        /// Line number where the error occurred (1-indexed).
        line: usize,
        /// Error message describing the issue.
        message: String,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {0}")]
    ConfigNotFound(String),

    /// Invalid configuration value.
    #[error("invalid configuration value for '{key}': {message}")]
    ConfigInvalid {
        /// The configuration key with invalid value.
        key: String,
        /// Error message describing why the value is invalid.
        message: String,
    },

    /// Underlying I/O failure (e.g. `/proc/diskstats` unreadable).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SmartError {
    /// Builds a query error for `what` on `path`.
    pub fn query(
        path: impl Into<String>,
        what: &'static str,
        errno: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::SmartQuery { path: path.into(), what, errno, message: message.into() }
    }

    /// Returns the errno-equivalent code carried by this error, if any.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::DeviceOpen { errno, .. }
            | Self::SmartRead { errno, .. }
            | Self::SmartQuery { errno, .. } => Some(*errno),
            Self::Unsupported { .. } => Some(libc::EOPNOTSUPP),
            Self::Io(e) => e.raw_os_error(),
            Self::ConfigParse { .. } | Self::ConfigNotFound(_) | Self::ConfigInvalid { .. } => None,
        }
    }
}

/// Result type alias for monitoring operations.
pub type Result<T> = std::result::Result<T, SmartError>;
