//! This module defines the errors that can be returned by bucketring.
//!
//! Note that an empty ring is not an error: routing on a ring without nodes
//! returns `None`.

use std::fmt::Display;

use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

/// Error enum with all possible variants
#[derive(Debug, Serialize)]
pub enum Error {
    /// Rejected construction arguments (eg: zero replicas)
    InvalidConfig { reason: String },
    /// Something that should never happen did happen (eg: a poisoned lock)
    Logic { reason: String },
    Io { reason: String },
}

impl Error {
    /// Returns true if this is an instance of a [`Error::InvalidConfig`] variant
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Error::InvalidConfig { .. })
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig {
            reason: format!("unable to parse config - {}", err),
        }
    }
}
