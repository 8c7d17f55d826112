//! Core traits implemented by transport backends.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{
    HostParams, OutputStream,
    error::{ConnectionError, SessionError},
};

/// Terminates a running command.
///
/// Must be callable from any task while another task drains the output.
pub trait Terminate: Send + Sync {
    /// Request termination. Calling it more than once is harmless.
    fn terminate(&self);
}

/// Terminator backed by a oneshot channel.
///
/// The backend's pump task holds the receiver and kills the process when it
/// fires.
#[derive(Debug)]
pub struct OneshotTerminator {
    tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
}

impl OneshotTerminator {
    /// Create a terminator and the receiver the pump should select on.
    #[must_use]
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: std::sync::Mutex::new(Some(tx)),
            }),
            rx,
        )
    }
}

impl Terminate for OneshotTerminator {
    fn terminate(&self) {
        let tx = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
    }
}

/// A framed command started on a connection.
pub struct SpawnedCommand {
    /// Merged line stream; ends when the command exits or is terminated.
    pub output: OutputStream,
    /// Handle that terminates this command and nothing else.
    pub terminator: Arc<dyn Terminate>,
}

/// An open connection to one host.
///
/// Persistent cwd/env are applied to every subsequent `run_framed`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a framed script as one non-interactive invocation.
    async fn run_framed(&self, script: &str) -> Result<SpawnedCommand, SessionError>;

    /// Merge `delta` into the environment of future invocations.
    fn set_persistent_env(&mut self, delta: &HashMap<String, String>);

    /// Change the working directory of future invocations.
    ///
    /// # Errors
    /// Returns error if the backend rejects the path.
    fn set_persistent_cwd(&mut self, path: &str) -> Result<(), SessionError>;

    /// Working directory used for the next invocation.
    fn persistent_cwd(&self) -> &str;

    /// Release the connection.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `host` using resolved `params`.
    async fn open_session(
        &self,
        host: &str,
        params: &HostParams,
    ) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// Resolves a host alias into connection parameters.
pub trait HostResolver: Send + Sync {
    /// Resolve `host`.
    ///
    /// # Errors
    /// Returns error if the host cannot be resolved.
    fn resolve(&self, host: &str) -> Result<HostParams, ConnectionError>;
}

/// Uses the alias as the hostname and leaves everything else to the backend.
#[derive(Debug, Default, Clone)]
pub struct PassthroughResolver;

impl HostResolver for PassthroughResolver {
    fn resolve(&self, host: &str) -> Result<HostParams, ConnectionError> {
        if host.trim().is_empty() {
            return Err(ConnectionError::Resolve {
                host: host.to_string(),
                reason: "empty host".to_string(),
            });
        }
        if host.starts_with('-') {
            return Err(ConnectionError::Resolve {
                host: host.to_string(),
                reason: "host must not start with '-'".to_string(),
            });
        }
        Ok(HostParams::new(host))
    }
}

/// Fixed alias table, falling back to passthrough for unknown aliases.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, HostParams>,
}

impl StaticResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register parameters for an alias.
    #[must_use]
    pub fn host(mut self, alias: impl Into<String>, params: HostParams) -> Self {
        self.hosts.insert(alias.into(), params);
        self
    }
}

impl HostResolver for StaticResolver {
    fn resolve(&self, host: &str) -> Result<HostParams, ConnectionError> {
        match self.hosts.get(host) {
            Some(params) => Ok(params.clone()),
            None => PassthroughResolver.resolve(host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_fires_once() {
        let (terminator, mut rx) = OneshotTerminator::channel();
        assert!(rx.try_recv().is_err());

        terminator.terminate();
        terminator.terminate();

        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_passthrough_resolver() {
        let params = PassthroughResolver.resolve("myserver").unwrap();
        assert_eq!(params.hostname, "myserver");
        assert!(PassthroughResolver.resolve("  ").is_err());
    }

    #[test]
    fn test_resolver_rejects_option_like_host() {
        let err = PassthroughResolver
            .resolve("-oProxyCommand=touch /tmp/x")
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Resolve { .. }));

        let fallback = StaticResolver::new().resolve("-F/dev/null");
        assert!(fallback.is_err());
        assert!(PassthroughResolver.resolve("host-1").is_ok());
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticResolver::new().host(
            "test3",
            HostParams::new("1.2.3.4").with_user("admin").with_port(2222),
        );

        let params = resolver.resolve("test3").unwrap();
        assert_eq!(params.hostname, "1.2.3.4");
        assert_eq!(params.port, Some(2222));

        let fallback = resolver.resolve("test2").unwrap();
        assert_eq!(fallback.hostname, "test2");
    }
}
