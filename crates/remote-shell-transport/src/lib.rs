//! Process-backed transports for persistent remote shell sessions.
//!
//! Provides:
//! - `LocalTransport` - Runs framed scripts with a local shell (feature: local)
//! - `OpenSshTransport` - Runs framed scripts over a multiplexed `ssh` master (feature: openssh)
//! - Process-group spawning with line streaming and termination

pub mod process;
pub mod shell;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "openssh")]
pub mod openssh;

#[cfg(feature = "local")]
pub use local::{LocalConnection, LocalTransport};
#[cfg(feature = "openssh")]
pub use openssh::{OpenSshConnection, OpenSshTransport};
pub use process::spawn_streaming;
pub use shell::resolve_executable_path;
