//! OpenSSH transport driving the system `ssh` client.
//!
//! `open_session` starts a backgrounded multiplexing master (`-M -f -N`) that
//! keeps one authenticated connection alive for the whole session; every
//! framed script then runs as a separate non-interactive `ssh` client over
//! the control socket. `~/.ssh/config` handling stays with `ssh` itself.
//!
//! Terminating a command kills the local `ssh` client, which closes the
//! channel. Remote processes that ignore the hangup may outlive it.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use remote_shell_core::{
    Connection, ConnectionError, HostParams, SessionError, SpawnedCommand, Transport,
};
use tokio::process::Command;
use uuid::Uuid;

use crate::{
    process::spawn_streaming,
    shell::{DEFAULT_SHELL, env_assignments, expand_tilde, quote, resolve_executable_path},
};

/// Idle lifetime of a master whose session was never closed.
const DEFAULT_CONTROL_PERSIST: &str = "10m";

/// Transport backed by the `ssh` binary.
#[derive(Debug, Clone)]
pub struct OpenSshTransport {
    ssh_program: String,
    remote_shell: String,
    control_persist: String,
    connect_timeout: Option<u32>,
    batch_mode: bool,
}

impl Default for OpenSshTransport {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            remote_shell: DEFAULT_SHELL.to_string(),
            control_persist: DEFAULT_CONTROL_PERSIST.to_string(),
            connect_timeout: None,
            batch_mode: true,
        }
    }
}

impl OpenSshTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the `ssh` executable.
    #[must_use]
    pub fn ssh_program<S: Into<String>>(mut self, program: S) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// Shell that runs scripts on the remote side.
    #[must_use]
    pub fn remote_shell<S: Into<String>>(mut self, shell: S) -> Self {
        self.remote_shell = shell.into();
        self
    }

    /// `ControlPersist` value for the master connection.
    #[must_use]
    pub fn control_persist<S: Into<String>>(mut self, persist: S) -> Self {
        self.control_persist = persist.into();
        self
    }

    /// `ConnectTimeout` in seconds.
    #[must_use]
    pub const fn connect_timeout(mut self, secs: u32) -> Self {
        self.connect_timeout = Some(secs);
        self
    }

    /// Allow interactive password/passphrase prompts.
    #[must_use]
    pub const fn interactive_auth(mut self, allow: bool) -> Self {
        self.batch_mode = !allow;
        self
    }

    /// Options shared by the master and every client, ending with `--` and
    /// the destination.
    fn host_args(&self, params: &HostParams) -> Vec<String> {
        let mut args = Vec::new();
        if self.batch_mode {
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }
        if let Some(secs) = self.connect_timeout {
            args.extend(["-o".to_string(), format!("ConnectTimeout={secs}")]);
        }
        if let Some(port) = params.port {
            args.extend(["-p".to_string(), port.to_string()]);
        }
        if let Some(user) = &params.user {
            args.extend(["-l".to_string(), user.clone()]);
        }
        if let Some(identity) = &params.identity_file {
            args.extend([
                "-i".to_string(),
                expand_tilde(identity).to_string_lossy().into_owned(),
            ]);
        }
        let mut options: Vec<_> = params.options.iter().collect();
        options.sort();
        for (key, value) in options {
            args.extend(["-o".to_string(), format!("{key}={value}")]);
        }
        args.extend(["--".to_string(), params.hostname.clone()]);
        args
    }

    fn master_args(&self, params: &HostParams, control_path: &Path, log_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-E".to_string(),
            log_path.display().to_string(),
            "-S".to_string(),
            control_path.display().to_string(),
            "-M".to_string(),
            "-f".to_string(),
            "-N".to_string(),
            "-o".to_string(),
            format!("ControlPersist={}", self.control_persist),
        ];
        args.extend(self.host_args(params));
        args
    }

    fn client_args(&self, params: &HostParams, control_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-T".to_string(),
            "-S".to_string(),
            control_path.display().to_string(),
            "-o".to_string(),
            "ControlMaster=no".to_string(),
        ];
        args.extend(self.host_args(params));
        args
    }
}

#[async_trait]
impl Transport for OpenSshTransport {
    async fn open_session(
        &self,
        host: &str,
        params: &HostParams,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let ssh = resolve_executable_path(&self.ssh_program)
            .await
            .ok_or_else(|| ConnectionError::ExecutableNotFound(self.ssh_program.clone()))?;

        let id = Uuid::new_v4().simple().to_string();
        let control_path = std::env::temp_dir().join(format!("rsh-{}.sock", &id[..12]));
        let log_path = std::env::temp_dir().join(format!("rsh-{}.log", &id[..12]));

        tracing::info!(host, hostname = %params.hostname, "Starting ssh master");

        let status = Command::new(&ssh)
            .args(self.master_args(params, &control_path, &log_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            let reason = tokio::fs::read_to_string(&log_path)
                .await
                .ok()
                .map(|log| log.trim().to_string())
                .filter(|log| !log.is_empty())
                .unwrap_or_else(|| format!("ssh exited with {status}"));
            let _ = tokio::fs::remove_file(&log_path).await;
            return Err(ConnectionError::Unreachable {
                host: host.to_string(),
                reason,
            });
        }

        let mut conn = OpenSshConnection {
            ssh,
            args: self.client_args(params, &control_path),
            control_path,
            log_path,
            remote_shell: self.remote_shell.clone(),
            cwd: String::new(),
            env: HashMap::new(),
            closed: false,
        };

        match conn.probe_cwd().await {
            Ok(cwd) => conn.cwd = cwd,
            Err(reason) => {
                let _ = conn.close().await;
                return Err(ConnectionError::Unreachable {
                    host: host.to_string(),
                    reason,
                });
            }
        }

        tracing::info!(host, cwd = %conn.cwd, "Connected");

        Ok(Box::new(conn))
    }
}

/// Connection state for [`OpenSshTransport`].
#[derive(Debug)]
pub struct OpenSshConnection {
    ssh: PathBuf,
    args: Vec<String>,
    control_path: PathBuf,
    log_path: PathBuf,
    remote_shell: String,
    cwd: String,
    env: HashMap<String, String>,
    closed: bool,
}

impl OpenSshConnection {
    /// Ask the remote login shell for its starting directory.
    async fn probe_cwd(&self) -> Result<String, String> {
        let output = Command::new(&self.ssh)
            .args(&self.args)
            .arg("pwd")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| e.to_string())?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }

        let cwd = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if cwd.is_empty() {
            return Err("remote shell did not report a working directory".to_string());
        }
        Ok(cwd)
    }

    fn destination(&self) -> &str {
        self.args.last().map_or("", String::as_str)
    }
}

/// Remote command line: `cd <cwd> && exec env K=V... <shell> -c <script>`.
///
/// # Errors
/// Returns error if any part cannot be quoted.
pub fn build_remote_command(
    cwd: &str,
    env: &HashMap<String, String>,
    shell: &str,
    script: &str,
) -> Result<String, SessionError> {
    let mut words = vec![
        "cd".to_string(),
        quote(cwd)?,
        "&&".to_string(),
        "exec".to_string(),
        "env".to_string(),
    ];
    words.extend(env_assignments(env)?);
    words.push(quote(shell)?);
    words.push("-c".to_string());
    words.push(quote(script)?);
    Ok(words.join(" "))
}

#[async_trait]
impl Connection for OpenSshConnection {
    async fn run_framed(&self, script: &str) -> Result<SpawnedCommand, SessionError> {
        if self.closed {
            return Err(SessionError::Transport("connection is closed".to_string()));
        }

        let remote = build_remote_command(&self.cwd, &self.env, &self.remote_shell, script)?;
        let mut cmd = Command::new(&self.ssh);
        cmd.args(&self.args).arg(remote);

        spawn_streaming(cmd)
    }

    fn set_persistent_env(&mut self, delta: &HashMap<String, String>) {
        self.env
            .extend(delta.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn set_persistent_cwd(&mut self, path: &str) -> Result<(), SessionError> {
        if path.is_empty() {
            return Err(SessionError::Transport("empty working directory".to_string()));
        }
        self.cwd = path.to_string();
        Ok(())
    }

    fn persistent_cwd(&self) -> &str {
        &self.cwd
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let status = Command::new(&self.ssh)
            .arg("-S")
            .arg(&self.control_path)
            .arg("-O")
            .arg("exit")
            .arg("--")
            .arg(self.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            tracing::debug!(?status, "ssh master already gone");
        }
        for path in [&self.control_path, &self.log_path] {
            if path.exists() {
                let _ = tokio::fs::remove_file(path).await;
            }
        }
        Ok(())
    }
}
