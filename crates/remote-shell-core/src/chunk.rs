//! Output chunks produced by a running remote command.

use futures::stream::{self, BoxStream, StreamExt};

use crate::error::SessionError;

/// Line stream produced by a transport for one command.
///
/// Finite and consumed exactly once.
pub type OutputStream = BoxStream<'static, Result<OutputChunk, SessionError>>;

/// One tick of the transport's two-channel line iterator.
///
/// Lines keep their terminator exactly as read. Backends normally fill at
/// most one side per tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputChunk {
    /// Line read from stdout.
    pub stdout: Option<String>,
    /// Line read from stderr.
    pub stderr: Option<String>,
}

impl OutputChunk {
    /// Chunk carrying a stdout line.
    #[must_use]
    pub fn stdout(line: impl Into<String>) -> Self {
        Self {
            stdout: Some(line.into()),
            stderr: None,
        }
    }

    /// Chunk carrying a stderr line.
    #[must_use]
    pub fn stderr(line: impl Into<String>) -> Self {
        Self {
            stdout: None,
            stderr: Some(line.into()),
        }
    }

    /// Flatten into the ordered, non-empty lines of this tick.
    ///
    /// When both sides are present stdout comes first and stderr follows as a
    /// separate line.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        [self.stdout, self.stderr]
            .into_iter()
            .flatten()
            .filter(|line| !line.is_empty())
            .collect()
    }
}

/// Build an [`OutputStream`] from already-known chunks.
#[must_use]
pub fn stream_from_chunks<I>(chunks: I) -> OutputStream
where
    I: IntoIterator<Item = OutputChunk>,
    I::IntoIter: Send + 'static,
{
    stream::iter(chunks.into_iter().map(Ok)).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdout_precedes_stderr() {
        let chunk = OutputChunk {
            stdout: Some("out\n".into()),
            stderr: Some("err\n".into()),
        };
        assert_eq!(chunk.into_lines(), vec!["out\n", "err\n"]);
    }

    #[test]
    fn test_empty_sides_are_dropped() {
        let chunk = OutputChunk {
            stdout: Some(String::new()),
            stderr: None,
        };
        assert!(chunk.into_lines().is_empty());
        assert!(OutputChunk::default().into_lines().is_empty());
    }

    #[test]
    fn test_stream_from_chunks() {
        let chunks = vec![OutputChunk::stdout("a\n"), OutputChunk::stderr("b\n")];
        let collected: Vec<_> = tokio_test::block_on(stream_from_chunks(chunks).collect::<Vec<_>>());
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].as_ref().unwrap(), &OutputChunk::stderr("b\n"));
    }
}
