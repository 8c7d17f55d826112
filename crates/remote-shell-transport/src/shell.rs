//! Shell command utilities shared by the process backends.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use remote_shell_core::SessionError;

/// Shell that runs framed scripts unless configured otherwise.
pub const DEFAULT_SHELL: &str = "bash";

/// Resolve an executable by name.
///
/// The search order is:
/// 1. Explicit paths (absolute or containing a separator).
/// 2. The current process PATH via `which`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }

    which_async(executable).await
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

/// Quote a single shell word.
///
/// # Errors
/// Returns error if the word contains a NUL byte.
pub fn quote(word: &str) -> Result<String, SessionError> {
    shlex::try_quote(word)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| SessionError::Spawn(format!("Failed to quote {word:?}: {e}")))
}

/// Quoted `KEY=value` words, sorted by key so the command line is stable.
///
/// # Errors
/// Returns error if any pair cannot be quoted.
pub fn env_assignments(env: &HashMap<String, String>) -> Result<Vec<String>, SessionError> {
    let mut keys: Vec<&String> = env.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| quote(&format!("{key}={}", env[key])))
        .collect()
}

/// Expand a leading `~` against the local home directory.
#[must_use]
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    dirs::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest))
}
