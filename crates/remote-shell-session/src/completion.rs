//! Tab completion backed by the target shell's `compgen`.

use std::collections::BTreeSet;

use remote_shell_core::{HostResolver, ShellError, Transport};

use crate::Session;

/// Completion candidates for the token under the cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Sorted, de-duplicated candidates.
    pub matches: Vec<String>,
    /// Byte offset where the completed token starts.
    pub start: usize,
}

/// Token ending at `cursor` (a byte offset) and its start offset.
///
/// Tokens are split on whitespace and `;`. Returns `None` when there is
/// nothing to complete.
fn token_at(line: &str, cursor: usize) -> Option<(usize, &str)> {
    let head = line.get(..cursor.min(line.len()))?;
    let start = head
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace() || *c == ';')
        .map_or(0, |(i, c)| i + c.len_utf8());
    let token = &head[start..];
    (!token.is_empty()).then_some((start, token))
}

impl<T, R> Session<T, R>
where
    T: Transport,
    R: HostResolver,
{
    /// Complete the token that ends at `cursor`.
    ///
    /// `$NAME` tokens complete shell variables; anything else completes
    /// commands, directories, files and aliases. Returns no matches when
    /// disconnected.
    ///
    /// # Errors
    /// Returns error if the completion command itself fails.
    pub async fn complete(&mut self, line: &str, cursor: usize) -> Result<Completion, ShellError> {
        if !self.is_connected() {
            tracing::debug!("Completion requested while disconnected");
            return Ok(Completion::default());
        }
        let Some((start, token)) = token_at(line, cursor) else {
            return Ok(Completion::default());
        };

        let (prefix, command) = if token.starts_with('$') {
            ("$", "compgen -A arrayvar -A export -A variable")
        } else {
            ("", "compgen -cdfa")
        };
        let word = token.strip_prefix(prefix).unwrap_or(token);
        let Ok(word) = shlex::try_quote(word) else {
            return Ok(Completion::default());
        };

        let mut candidates = BTreeSet::new();
        self.exec(&format!("{command} -- {word}"), |line| {
            let name = line.trim_end();
            let candidate = format!("{prefix}{name}");
            if !name.is_empty() && candidate.starts_with(token) {
                candidates.insert(candidate);
            }
        })
        .await?;

        Ok(Completion {
            matches: candidates.into_iter().collect(),
            start,
        })
    }
}
