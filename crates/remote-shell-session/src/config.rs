//! Session configuration and host parameters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "{value:?} contains invalid character {found:?}. Valid characters are A-Z a-z 0-9 - % , . / : = _ @ and space"
    )]
    InvalidValue { value: String, found: char },
    #[error("Unknown parameter: {0}")]
    UnknownParam(String),
    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_pager() -> String {
    "cat".to_string()
}

fn default_shell() -> String {
    "bash".to_string()
}

/// Settings applied when a session connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Environment seeded into every new connection.
    pub initial_env: HashMap<String, String>,
    /// Named parameters; usable as `{NAME}` in host strings and exported
    /// into the remote environment.
    pub params: HashMap<String, String>,
    /// Shell the transports should run scripts with.
    pub shell: String,
    /// Value of `PAGER` on the target.
    pub pager: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_env: HashMap::new(),
            params: HashMap::new(),
            shell: default_shell(),
            pager: default_pager(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from JSON, validating every parameter value.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or a parameter is invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        for value in config.params.values() {
            validate_value(value)?;
        }
        Ok(config)
    }

    /// Define or replace a parameter.
    ///
    /// # Errors
    /// Returns error if `value` contains a disallowed character.
    pub fn set_param(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ConfigError> {
        let value = value.into();
        validate_value(&value)?;
        self.params.insert(name.into(), value);
        Ok(())
    }

    /// Environment delta pushed when a connection opens.
    #[must_use]
    pub fn seed_env(&self) -> HashMap<String, String> {
        let mut env = self.initial_env.clone();
        env.extend(self.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.insert("PAGER".to_string(), self.pager.clone());
        env
    }

    /// Expand `{NAME}` references in `host` with this config's parameters.
    ///
    /// # Errors
    /// Returns error if a referenced parameter is not defined.
    pub fn expand_host(&self, host: &str) -> Result<String, ConfigError> {
        expand_host(host, &self.params)
    }
}

/// Reject values that are unsafe to splice into a host string.
///
/// # Errors
/// Returns error naming the last offending character.
pub fn validate_value(value: &str) -> Result<(), ConfigError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || " -%,./:=_@".contains(c);
    match value.chars().rev().find(|c| !allowed(*c)) {
        Some(found) => Err(ConfigError::InvalidValue {
            value: value.to_string(),
            found,
        }),
        None => Ok(()),
    }
}

/// Substitute `{NAME}` references.
///
/// An unclosed `{` is kept as is.
///
/// # Errors
/// Returns error if a referenced parameter is not defined.
pub fn expand_host(host: &str, params: &HashMap<String, String>) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(host.len());
    let mut rest = host;

    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open + 1..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + 1 + len];
        let value = params
            .get(name)
            .ok_or_else(|| ConfigError::UnknownParam(name.to_string()))?;
        expanded.push_str(&rest[..open]);
        expanded.push_str(value);
        rest = &rest[open + len + 2..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_value() {
        for ok in ["", "a", "10.10.10.10", "user@host:22", "a b", "x=1,y=2%", "/p_q-r"] {
            assert!(validate_value(ok).is_ok(), "{ok:?} should be valid");
        }
        for bad in ["a;b", "$HOME", "a\nb", "ü", "`id`", "a|b"] {
            assert!(validate_value(bad).is_err(), "{bad:?} should be invalid");
        }
    }

    #[test]
    fn test_expand_host() {
        let params = HashMap::from([
            ("N".to_string(), "1".to_string()),
            ("host".to_string(), "host01".to_string()),
            ("domain".to_string(), "example.com".to_string()),
        ]);

        assert_eq!(expand_host("target{N}", &params).unwrap(), "target1");
        assert_eq!(
            expand_host("{host}.{domain}", &params).unwrap(),
            "host01.example.com"
        );
        assert_eq!(expand_host("plain", &params).unwrap(), "plain");
        assert_eq!(expand_host("open{N", &params).unwrap(), "open{N");
        assert!(matches!(
            expand_host("{missing}", &params),
            Err(ConfigError::UnknownParam(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_seed_env() {
        let mut config = SessionConfig::new();
        config.initial_env.insert("LANG".into(), "C".into());
        config.set_param("HOST_B", "11.11.11.11").unwrap();

        let env = config.seed_env();

        assert_eq!(env["PAGER"], "cat");
        assert_eq!(env["LANG"], "C");
        assert_eq!(env["HOST_B"], "11.11.11.11");
        assert!(config.set_param("BAD", "a;b").is_err());
        assert!(!config.params.contains_key("BAD"));
    }

    #[test]
    fn test_from_json() {
        let config =
            SessionConfig::from_json(r#"{"params": {"HOST_A": "10.0.0.1"}, "pager": "more"}"#)
                .unwrap();
        assert_eq!(config.params["HOST_A"], "10.0.0.1");
        assert_eq!(config.pager, "more");
        assert_eq!(config.shell, "bash");

        assert!(matches!(
            SessionConfig::from_json(r#"{"params": {"X": "a;b"}}"#),
            Err(ConfigError::InvalidValue { found: ';', .. })
        ));
        assert!(matches!(
            SessionConfig::from_json("{"),
            Err(ConfigError::Json(_))
        ));
    }
}
