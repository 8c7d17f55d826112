//! Per-command markers delimiting trailer lines.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use uuid::Uuid;

/// Marker error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkerError {
    #[error("Marker is empty")]
    Empty,
    #[error("Marker contains a character that needs shell escaping: {0:?}")]
    InvalidChar(char),
}

/// Delimiter for the trailer of a single command run.
///
/// Only ASCII alphanumerics and `_`, so it is safe to splice into a shell
/// script unquoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marker(String);

impl Marker {
    /// Generate a fresh marker: the reversed nanosecond timestamp followed by
    /// a random suffix.
    #[must_use]
    pub fn generate() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let reversed: String = nanos.to_string().chars().rev().collect();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{reversed}{}", &suffix[..8]))
    }

    /// Use a caller-chosen marker.
    ///
    /// # Errors
    /// Returns error if the marker is empty or needs escaping.
    pub fn new(marker: impl Into<String>) -> Result<Self, MarkerError> {
        let marker = marker.into();
        if marker.is_empty() {
            return Err(MarkerError::Empty);
        }
        if let Some(c) = marker
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(MarkerError::InvalidChar(c));
        }
        Ok(Self(marker))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Marker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
