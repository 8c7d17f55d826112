//! Command framing and output demultiplexing.
//!
//! Provides:
//! - `Marker` - Per-command trailer delimiter
//! - `CommandFramer` - Appends the trailer footer to a user command
//! - `Demultiplexer` / `demux` - Splits output from trailer lines
//! - `Trailer` - Parsed exit code, working directory and environment

pub mod demux;
pub mod framer;
pub mod marker;
pub mod trailer;

pub use demux::{Demultiplexer, demux};
pub use framer::{CommandFramer, frame};
pub use marker::{Marker, MarkerError};
pub use trailer::{TRAILER_MISSING_EXIT_CODE, Trailer, encode_env_dump, parse_env_dump};
