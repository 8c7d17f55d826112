//! Wraps user commands with the trailer footer.

use crate::Marker;

/// Default environment dump: the NUL-separated pairs of `env -0` as one
/// unbroken run of lowercase hex.
pub const DEFAULT_ENV_COMMAND: &str = r"env -0 | od -An -v -tx1 | tr -d ' \n'";

/// Default working directory probe.
pub const DEFAULT_PWD_COMMAND: &str = "pwd";

/// Builder for framed scripts.
#[derive(Debug, Clone)]
pub struct CommandFramer {
    /// Command printing the absolute working directory.
    pub pwd_command: String,
    /// Command printing the environment dump.
    pub env_command: String,
}

impl Default for CommandFramer {
    fn default() -> Self {
        Self {
            pwd_command: DEFAULT_PWD_COMMAND.to_string(),
            env_command: DEFAULT_ENV_COMMAND.to_string(),
        }
    }
}

impl CommandFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the working directory probe.
    #[must_use]
    pub fn pwd_command<S: Into<String>>(mut self, command: S) -> Self {
        self.pwd_command = command.into();
        self
    }

    /// Override the environment dump.
    #[must_use]
    pub fn env_command<S: Into<String>>(mut self, command: S) -> Self {
        self.env_command = command.into();
        self
    }

    /// Append the footer to `command`.
    ///
    /// `$?` is captured by the first footer statement, so the reported code
    /// is the status of the user's last command.
    #[must_use]
    pub fn frame(&self, command: &str, marker: &Marker) -> String {
        let m = marker.as_str();
        let mut script = String::with_capacity(command.len() + 256);
        script.push_str(command);
        if !command.ends_with('\n') {
            script.push('\n');
        }
        script.push_str("EXIT_CODE=$?\n");
        script.push_str(&format!("printf '%s\\n' \"{m}code: ${{EXIT_CODE}}{m}\"\n"));
        script.push_str(&format!(
            "printf '%s\\n' \"{m}pwd: $({pwd}){m}\"\n",
            pwd = self.pwd_command
        ));
        script.push_str(&format!(
            "printf '%s\\n' \"{m}env: $({env}){m}\"\n",
            env = self.env_command
        ));
        script
    }
}

/// Frame `command` with the default footer.
#[must_use]
pub fn frame(command: &str, marker: &Marker) -> String {
    CommandFramer::default().frame(command, marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_wraps_each_value_with_marker() {
        let cmd = "\nls\nls\nyo\n";
        let marker = Marker::new("THISISMARKER").unwrap();

        let script = frame(cmd, &marker);

        assert!(script.starts_with(cmd));
        assert_eq!(script.matches("THISISMARKER").count(), 6);
        assert!(script.contains("THISISMARKERcode: ${EXIT_CODE}THISISMARKER"));
        assert!(script.contains("THISISMARKERpwd: $(pwd)THISISMARKER"));
    }

    #[test]
    fn test_exit_code_captured_immediately() {
        let marker = Marker::new("M").unwrap();
        let script = frame("false", &marker);
        let mut lines = script.lines();

        assert_eq!(lines.next(), Some("false"));
        assert_eq!(lines.next(), Some("EXIT_CODE=$?"));
    }

    #[test]
    fn test_env_command_override() {
        let marker = Marker::new("M").unwrap();
        let script = CommandFramer::new()
            .env_command("printenv")
            .frame("true\n", &marker);

        assert!(script.contains("Menv: $(printenv)M"));
        assert!(!script.contains("true\n\n"));
    }
}
