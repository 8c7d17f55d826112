//! Working directory and environment carried from one command to the next.

use std::collections::HashMap;

use remote_shell_core::Connection;
use remote_shell_protocol::Trailer;

/// Shell state reported by the most recent trailer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Absolute working directory on the target.
    pub cwd: String,
    /// Exported environment (injected variables excluded).
    pub env: HashMap<String, String>,
}

impl SessionState {
    /// State for a freshly opened connection.
    #[must_use]
    pub fn new(cwd: impl Into<String>, env: HashMap<String, String>) -> Self {
        Self {
            cwd: cwd.into(),
            env,
        }
    }

    /// Apply trailer text to the state and to `conn`'s persistent settings.
    ///
    /// The working directory and the environment are applied independently.
    /// Returns the reported exit code, or the fallback code when none was
    /// recovered.
    pub fn apply_trailer(&mut self, conn: &mut dyn Connection, text: &str) -> i32 {
        let trailer = Trailer::parse(text);
        if trailer.is_empty() {
            tracing::warn!("Command produced no trailer, keeping session state");
            return trailer.exit_code();
        }

        if let Some(pwd) = &trailer.pwd {
            self.change_dir(conn, pwd);
        }

        if let Some(env) = trailer.env.as_ref() {
            let delta = self.merge_env(env);
            if !delta.is_empty() {
                tracing::debug!(changed = delta.len(), "Updating persistent environment");
                conn.set_persistent_env(&delta);
            }
        }

        trailer.exit_code()
    }

    fn change_dir(&mut self, conn: &mut dyn Connection, pwd: &str) {
        if pwd == self.cwd {
            return;
        }
        match conn.set_persistent_cwd(pwd) {
            Ok(()) => {
                tracing::debug!(from = %self.cwd, to = pwd, "Working directory changed");
                self.cwd = pwd.to_string();
            }
            Err(err) => tracing::warn!(pwd, %err, "Cannot change working directory"),
        }
    }

    /// Merge `env` into the stored environment, returning the entries that
    /// changed. Variables are never removed.
    pub fn merge_env(&mut self, env: &HashMap<String, String>) -> HashMap<String, String> {
        let mut delta = HashMap::new();
        for (key, value) in env {
            if self.env.get(key) != Some(value) {
                self.env.insert(key.clone(), value.clone());
                delta.insert(key.clone(), value.clone());
            }
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use remote_shell_protocol::encode_env_dump;

    use super::*;
    use crate::testing::RecordingConnection;

    fn state() -> SessionState {
        SessionState::new(
            "/home/user",
            HashMap::from([("PAGER".to_string(), "cat".to_string())]),
        )
    }

    #[test]
    fn test_apply_full_trailer() {
        let mut state = state();
        let mut conn = RecordingConnection::new("/home/user");

        let env = encode_env_dump([("K", "V"), ("PAGER", "cat")]);

        let code = state.apply_trailer(&mut conn, &format!("code: 3\npwd: /tmp\nenv: {env}\n"));

        assert_eq!(code, 3);
        assert_eq!(state.cwd, "/tmp");
        assert_eq!(state.env["K"], "V");
        assert_eq!(conn.log().cwd_changes, vec!["/tmp".to_string()]);
        assert_eq!(
            conn.log().env_deltas,
            vec![HashMap::from([("K".to_string(), "V".to_string())])]
        );
    }

    #[test]
    fn test_same_pwd_does_not_chdir() {
        let mut state = state();
        let mut conn = RecordingConnection::new("/home/user");

        state.apply_trailer(&mut conn, "code: 0\npwd: /home/user\n");
        state.apply_trailer(&mut conn, "code: 0\npwd: /home/user\n");

        assert!(conn.log().cwd_changes.is_empty());
        assert_eq!(state.cwd, "/home/user");
    }

    #[test]
    fn test_missing_trailer_keeps_state() {
        let mut state = state();
        let before = state.clone();
        let mut conn = RecordingConnection::new("/home/user");

        assert_eq!(state.apply_trailer(&mut conn, ""), 1);
        assert_eq!(state, before);
        assert!(conn.log().env_deltas.is_empty());
    }

    #[test]
    fn test_rejected_cwd_still_applies_env() {
        let mut state = state();
        let mut conn = RecordingConnection::new("/home/user").reject_cwd();

        let env = encode_env_dump([("NEW", "1")]);

        let code = state.apply_trailer(&mut conn, &format!("code: 0\npwd: /gone\nenv: {env}\n"));

        assert_eq!(code, 0);
        assert_eq!(state.cwd, "/home/user");
        assert_eq!(state.env["NEW"], "1");
    }

    #[test]
    fn test_injected_variables_never_stored() {
        let mut state = state();
        let mut conn = RecordingConnection::new("/home/user");

        let env = encode_env_dump([
            ("SSH_CONNECTION", "1 2 3 4"),
            ("SSH_TTY", "/dev/pts/0"),
            ("SHLVL", "1"),
            ("_", "/bin/env"),
            ("A", "b"),
        ]);

        state.apply_trailer(&mut conn, &format!("code: 0\nenv: {env}\n"));

        assert!(!state.env.contains_key("SSH_CONNECTION"));
        assert!(!state.env.contains_key("SSH_TTY"));
        assert!(!state.env.contains_key("SHLVL"));
        assert!(!state.env.contains_key("_"));
        assert_eq!(state.env["A"], "b");
    }

    #[test]
    fn test_merge_never_removes() {
        let mut state = state();

        let delta = state.merge_env(&HashMap::from([("PAGER".to_string(), "less".to_string())]));

        assert_eq!(delta.len(), 1);
        assert_eq!(state.env["PAGER"], "less");
        assert!(state.merge_env(&HashMap::new()).is_empty());
        assert_eq!(state.env.len(), 1);
    }
}
