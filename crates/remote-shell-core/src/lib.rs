//! Core abstractions for persistent remote shell sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `OutputChunk` - One tick of a command's stdout/stderr line stream
//! - `HostParams` - Resolved connection parameters
//! - `Transport`, `Connection`, `Terminate`, `HostResolver` traits
//! - The `ConnectionError` / `SessionError` / `ShellError` taxonomy

pub mod chunk;
pub mod context;
pub mod error;
pub mod traits;

pub use chunk::{OutputChunk, OutputStream, stream_from_chunks};
pub use context::HostParams;
pub use error::{ConnectionError, SessionError, ShellError};
pub use traits::{
    Connection, HostResolver, OneshotTerminator, PassthroughResolver, SpawnedCommand,
    StaticResolver, Terminate, Transport,
};
