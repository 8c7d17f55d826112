//! Trailer parsing.
//!
//! The trailer is a block of `key: value` lines. Parsing never fails: every
//! field is optional and malformed values are dropped with a warning.

use std::collections::HashMap;

/// Exit code reported when the trailer carries no usable `code`.
pub const TRAILER_MISSING_EXIT_CODE: i32 = 1;

/// Separator between `key=value` pairs once the dump is decoded.
pub const ENV_DELIMITER: u8 = 0;

/// Variables injected by the transport or the shell itself.
///
/// These describe the connection, not the user's session, and must not be
/// replayed into later commands.
pub const INJECTED_VARIABLES: &[&str] = &["SSH_CLIENT", "SSH_CONNECTION", "SSH_TTY", "SHLVL", "_"];

/// Session state reported by one framed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trailer {
    /// Exit status of the user's command.
    pub code: Option<i32>,
    /// Working directory after the command.
    pub pwd: Option<String>,
    /// Environment after the command, already filtered.
    pub env: Option<HashMap<String, String>>,
}

impl Trailer {
    /// Parse trailer text collected by the demultiplexer.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut trailer = Self::default();

        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                tracing::warn!(line, "Ignoring malformed trailer line");
                continue;
            };
            let value = value.strip_prefix(' ').unwrap_or(value);

            match key.trim() {
                "code" => match value.trim().parse::<i32>() {
                    Ok(code) => trailer.code = Some(code),
                    Err(err) => tracing::warn!(value, %err, "Cannot parse exit code"),
                },
                "pwd" => {
                    if value.is_empty() {
                        tracing::warn!("Trailer has an empty pwd");
                    } else {
                        trailer.pwd = Some(value.to_string());
                    }
                }
                "env" => trailer.env = Some(parse_env_dump(value)),
                other => tracing::debug!(key = other, "Ignoring unknown trailer key"),
            }
        }

        trailer
    }

    /// Exit code, or [`TRAILER_MISSING_EXIT_CODE`] when none was reported.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(TRAILER_MISSING_EXIT_CODE)
    }

    /// Whether nothing at all was recovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.pwd.is_none() && self.env.is_none()
    }
}

/// Decode a hex environment dump into `key=value` pairs.
///
/// Pairs without `=`, with an empty key, or that are not UTF-8 are
/// discarded, as are [`INJECTED_VARIABLES`]. A dump that is not valid hex
/// yields no pairs.
#[must_use]
pub fn parse_env_dump(dump: &str) -> HashMap<String, String> {
    let bytes = match hex::decode(dump.trim()) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(%err, "Cannot decode environment dump");
            return HashMap::new();
        }
    };

    bytes
        .split(|b| *b == ENV_DELIMITER)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| match std::str::from_utf8(pair) {
            Ok(pair) => Some(pair),
            Err(_) => {
                tracing::debug!("Skipping environment entry that is not UTF-8");
                None
            }
        })
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| !key.is_empty() && !is_injected(key))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Encode pairs the way [`DEFAULT_ENV_COMMAND`](crate::framer::DEFAULT_ENV_COMMAND)
/// prints them.
#[must_use]
pub fn encode_env_dump<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut raw = Vec::new();
    for (key, value) in pairs {
        raw.extend_from_slice(key.as_bytes());
        raw.push(b'=');
        raw.extend_from_slice(value.as_bytes());
        raw.push(ENV_DELIMITER);
    }
    hex::encode(raw)
}

/// Whether `key` is one of the [`INJECTED_VARIABLES`].
#[must_use]
pub fn is_injected(key: &str) -> bool {
    INJECTED_VARIABLES.contains(&key)
}
