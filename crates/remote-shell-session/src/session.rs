//! Session lifecycle: connect, run framed commands, interrupt, close.

use std::collections::HashMap;

use remote_shell_core::{
    Connection, ConnectionError, HostResolver, PassthroughResolver, SessionError, ShellError,
    Transport,
};
use remote_shell_protocol::{CommandFramer, Marker, Trailer, demux};

use crate::{
    cancel::{CancellationController, Interrupter},
    config::{ConfigError, SessionConfig},
    state::SessionState,
};

/// A persistent shell on one host.
///
/// Every command runs as a separate invocation on the transport; the working
/// directory and exported environment reported by each command are replayed
/// into the next one.
pub struct Session<T, R = PassthroughResolver> {
    transport: T,
    resolver: R,
    config: SessionConfig,
    framer: CommandFramer,
    cancel: CancellationController,
    conn: Option<Box<dyn Connection>>,
    host: Option<String>,
    state: SessionState,
}

impl<T: Transport> Session<T> {
    /// Session whose host names are passed to the transport unchanged.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_resolver(transport, PassthroughResolver)
    }
}

impl<T, R> Session<T, R>
where
    T: Transport,
    R: HostResolver,
{
    #[must_use]
    pub fn with_resolver(transport: T, resolver: R) -> Self {
        Self {
            transport,
            resolver,
            config: SessionConfig::default(),
            framer: CommandFramer::default(),
            cancel: CancellationController::new(),
            conn: None,
            host: None,
            state: SessionState::default(),
        }
    }

    /// Replace the configuration used by the next `connect`.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the footer builder.
    #[must_use]
    pub fn with_framer(mut self, framer: CommandFramer) -> Self {
        self.framer = framer;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Define a parameter; it is exported on the next `connect`.
    ///
    /// # Errors
    /// Returns error if the value contains a disallowed character.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        self.config.set_param(name, value)
    }

    /// Open a connection to `host`, closing any current one first.
    ///
    /// # Errors
    /// Returns error if the host cannot be resolved or reached.
    pub async fn connect(&mut self, host: &str) -> Result<(), ShellError> {
        self.close().await;

        let params = self.resolver.resolve(host)?;
        tracing::debug!(host, hostname = %params.hostname, "Resolved host");

        let mut conn = self.transport.open_session(host, &params).await?;
        let env = self.config.seed_env();
        conn.set_persistent_env(&env);

        self.state = SessionState::new(conn.persistent_cwd(), env);
        self.conn = Some(conn);
        self.host = Some(host.to_string());

        tracing::info!(host, cwd = %self.state.cwd, "Session connected");
        Ok(())
    }

    /// Run `command`, streaming its output lines to `on_output`.
    ///
    /// A non-zero exit status is a normal return. When the command's trailer
    /// cannot be recovered the state is left unchanged and the fallback code
    /// is returned. An interrupted command whose trailer was already received
    /// still updates the working directory and environment.
    ///
    /// # Errors
    /// Returns error if not connected, if the command contains a NUL byte, if
    /// the transport fails (the session is then disconnected), or if the
    /// command was interrupted.
    pub async fn exec<F>(&mut self, command: &str, on_output: F) -> Result<i32, ShellError>
    where
        F: FnMut(&str),
    {
        let Some(conn) = self.conn.as_deref() else {
            return Err(ConnectionError::NotConnected.into());
        };
        if command.contains('\0') {
            return Err(ShellError::InvalidCommand(
                "command contains a NUL byte".to_string(),
            ));
        }

        let marker = Marker::generate();
        let script = self.framer.frame(command, &marker);
        tracing::debug!(host = ?self.host, cwd = %self.state.cwd, %marker, "Running command");

        let spawned = match conn.run_framed(&script).await {
            Ok(spawned) => spawned,
            Err(err) => return Err(self.abandon(err).await),
        };

        let guard = self.cancel.on_command_started(spawned.terminator);
        let trailer = demux(spawned.output, &marker, on_output).await;
        let interrupted = guard.was_interrupted();
        drop(guard);

        let trailer = match trailer {
            Ok(trailer) => trailer,
            Err(err) => return Err(self.abandon(err).await),
        };

        // A trailer with a code means the command itself ran to completion;
        // its cwd and env are kept even when the interrupt won the race.
        if interrupted && Trailer::parse(&trailer).code.is_none() {
            tracing::debug!(%marker, "Command interrupted");
            return Err(ShellError::Interrupted);
        }

        let Some(conn) = self.conn.as_deref_mut() else {
            return Err(ConnectionError::NotConnected.into());
        };
        let code = self.state.apply_trailer(conn, &trailer);
        if interrupted {
            tracing::debug!(%marker, code, "Command interrupted after its trailer");
            return Err(ShellError::Interrupted);
        }
        tracing::debug!(code, cwd = %self.state.cwd, "Command finished");
        Ok(code)
    }

    /// Interrupt the running command. No-op when idle.
    pub fn interrupt(&self) -> bool {
        self.cancel.interrupt()
    }

    /// Handle for interrupting from another task.
    #[must_use]
    pub fn interrupter(&self) -> Interrupter {
        self.cancel.interrupter()
    }

    /// Release the connection, if any. Idempotent.
    pub async fn close(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let host = self.host.take();
        self.state = SessionState::default();

        if let Err(err) = conn.close().await {
            tracing::warn!(?host, %err, "Error while closing connection");
        }
        tracing::info!(?host, "Session closed");
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Host passed to the last successful `connect`.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Working directory used by the next command.
    #[must_use]
    pub fn cwd(&self) -> &str {
        &self.state.cwd
    }

    /// Environment replayed into the next command.
    #[must_use]
    pub const fn env(&self) -> &HashMap<String, String> {
        &self.state.env
    }

    async fn abandon(&mut self, err: SessionError) -> ShellError {
        tracing::error!(host = ?self.host, %err, "Transport failed, disconnecting");
        self.close().await;
        err.into()
    }
}

impl<T, R> std::fmt::Debug for Session<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("connected", &self.conn.is_some())
            .field("cwd", &self.state.cwd)
            .finish_non_exhaustive()
    }
}
