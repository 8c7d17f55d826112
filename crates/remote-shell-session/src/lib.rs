//! Persistent shell sessions over non-interactive transports.
//!
//! Provides:
//! - `Session` - Connect, run commands, interrupt and close
//! - `SessionState` - Working directory and environment carried between commands
//! - `CancellationController` / `Interrupter` - Interrupt the running command
//! - `SessionConfig` - Initial environment and host parameters

pub mod cancel;
pub mod completion;
pub mod config;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

pub use cancel::{CancellationController, CommandGuard, Interrupter};
pub use completion::Completion;
pub use config::{ConfigError, SessionConfig, expand_host, validate_value};
pub use session::Session;
pub use state::SessionState;
