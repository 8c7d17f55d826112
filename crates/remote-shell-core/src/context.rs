//! Resolved connection parameters for a host.

use std::{collections::HashMap, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Parameters a transport needs to reach a host.
///
/// Produced by a [`HostResolver`](crate::traits::HostResolver); transports
/// ignore fields they have no use for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostParams {
    /// Network hostname or address.
    pub hostname: String,

    /// Login user.
    #[serde(default)]
    pub user: Option<String>,

    /// Port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Private key file.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// Extra backend-specific options (for OpenSSH, `-o key=value`).
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl HostParams {
    /// Parameters with just a hostname.
    #[must_use]
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Set a backend option.
    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let params: HostParams = serde_json::from_str(r#"{"hostname":"10.0.0.10"}"#).unwrap();
        assert_eq!(params, HostParams::new("10.0.0.10"));
    }

    #[test]
    fn test_builder() {
        let mut params = HostParams::new("example")
            .with_user("admin")
            .with_port(2222)
            .with_identity_file("~/.ssh/id_rsa_test");
        params.set_option("ForwardAgent", "yes");

        assert_eq!(params.user.as_deref(), Some("admin"));
        assert_eq!(params.port, Some(2222));
        assert_eq!(params.options.get("ForwardAgent").map(String::as_str), Some("yes"));
    }
}
