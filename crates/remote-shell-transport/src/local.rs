//! Local transport: every framed script runs in a fresh local shell.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use remote_shell_core::{
    Connection, ConnectionError, HostParams, SessionError, SpawnedCommand, Transport,
};
use tokio::process::Command;

use crate::{
    process::spawn_streaming,
    shell::{DEFAULT_SHELL, resolve_executable_path},
};

/// Runs framed scripts with a local shell.
///
/// The host name is only used for logging.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    shell: String,
    cwd: Option<PathBuf>,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            cwd: None,
        }
    }
}

impl LocalTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shell used to run scripts (must accept `-c`).
    #[must_use]
    pub fn shell<S: Into<String>>(mut self, shell: S) -> Self {
        self.shell = shell.into();
        self
    }

    /// Initial working directory (defaults to the process cwd).
    #[must_use]
    pub fn cwd<P: Into<PathBuf>>(mut self, cwd: P) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn open_session(
        &self,
        host: &str,
        _params: &HostParams,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let shell = resolve_executable_path(&self.shell)
            .await
            .ok_or_else(|| ConnectionError::ExecutableNotFound(self.shell.clone()))?;

        let cwd = match &self.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir()?,
        };
        if !cwd.is_dir() {
            return Err(ConnectionError::Unreachable {
                host: host.to_string(),
                reason: format!("{} is not a directory", cwd.display()),
            });
        }

        tracing::info!(host, shell = %shell.display(), cwd = %cwd.display(), "Opened local session");

        Ok(Box::new(LocalConnection {
            shell,
            cwd: cwd.to_string_lossy().into_owned(),
            env: HashMap::new(),
            closed: false,
        }))
    }
}

/// Connection state for [`LocalTransport`].
#[derive(Debug)]
pub struct LocalConnection {
    shell: PathBuf,
    cwd: String,
    env: HashMap<String, String>,
    closed: bool,
}

#[async_trait]
impl Connection for LocalConnection {
    async fn run_framed(&self, script: &str) -> Result<SpawnedCommand, SessionError> {
        if self.closed {
            return Err(SessionError::Transport("connection is closed".to_string()));
        }

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(script)
            .current_dir(&self.cwd)
            .envs(&self.env);

        spawn_streaming(cmd)
    }

    fn set_persistent_env(&mut self, delta: &HashMap<String, String>) {
        self.env
            .extend(delta.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn set_persistent_cwd(&mut self, path: &str) -> Result<(), SessionError> {
        if !Path::new(path).is_dir() {
            return Err(SessionError::Transport(format!("{path} is not a directory")));
        }
        self.cwd = path.to_string();
        Ok(())
    }

    fn persistent_cwd(&self) -> &str {
        &self.cwd
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed = true;
        Ok(())
    }
}
