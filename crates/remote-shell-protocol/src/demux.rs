//! Separates command output from trailer lines.
//!
//! Every footer line has the form `{marker}payload{marker}`. When the user's
//! last output line has no terminating newline the shell glues the first
//! footer line onto it, so a marked line either starts with the marker or
//! carries ordinary text in front of it.

use futures::StreamExt;
use remote_shell_core::{OutputStream, SessionError};

use crate::Marker;

/// Incremental demultiplexer for one command run.
#[derive(Debug)]
pub struct Demultiplexer {
    marker: Marker,
    trailer: String,
}

impl Demultiplexer {
    #[must_use]
    pub fn new(marker: Marker) -> Self {
        Self {
            marker,
            trailer: String::new(),
        }
    }

    /// Feed one physical line, forwarding ordinary output to `on_output`.
    pub fn push_line<F>(&mut self, line: &str, on_output: &mut F)
    where
        F: FnMut(&str),
    {
        let marker = self.marker.as_str();
        let body = strip_line_terminator(line);

        if !body.ends_with(marker) {
            on_output(line);
            return;
        }

        if body.len() >= 2 * marker.len() && body.starts_with(marker) {
            let payload = &body[marker.len()..body.len() - marker.len()];
            self.push_payload(payload);
            return;
        }

        // Ordinary text, then the payload, then nothing but the terminator.
        let Some((leading, rest)) = body.split_once(marker) else {
            on_output(line);
            return;
        };
        let Some((payload, _)) = rest.split_once(marker) else {
            on_output(line);
            return;
        };

        if !leading.is_empty() {
            on_output(leading);
        }
        self.push_payload(payload);
    }

    fn push_payload(&mut self, payload: &str) {
        self.trailer.push_str(payload);
        self.trailer.push('\n');
    }

    /// Trailer text collected so far.
    #[must_use]
    pub fn trailer(&self) -> &str {
        &self.trailer
    }

    /// Consume the demultiplexer, returning the trailer text.
    #[must_use]
    pub fn finish(self) -> String {
        self.trailer
    }
}

/// Drain `output`, forwarding ordinary lines to `on_output` in order.
///
/// Returns the accumulated trailer text, which is empty when no marked line
/// was seen.
///
/// # Errors
/// Returns the transport error that ended the stream. Lines received before
/// the error have already been forwarded.
pub async fn demux<F>(
    mut output: OutputStream,
    marker: &Marker,
    mut on_output: F,
) -> Result<String, SessionError>
where
    F: FnMut(&str),
{
    let mut demux = Demultiplexer::new(marker.clone());
    while let Some(chunk) = output.next().await {
        for line in chunk?.into_lines() {
            demux.push_line(&line, &mut on_output);
        }
    }
    Ok(demux.finish())
}

fn strip_line_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
