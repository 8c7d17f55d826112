//! Runs a command in its own process group and streams its output lines.

use std::{pin::pin, process::Stdio, time::Duration};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use futures::StreamExt;
use remote_shell_core::{OneshotTerminator, OutputChunk, SessionError, SpawnedCommand};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// How long the readers may keep flushing after the group was killed.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type ChunkSender = mpsc::UnboundedSender<Result<OutputChunk, SessionError>>;

#[derive(Debug, Clone, Copy)]
enum Channel {
    Stdout,
    Stderr,
}

/// Spawn `cmd` and pump its stdout/stderr lines into a stream.
///
/// The stream ends once both pipes reach EOF. Terminating kills the whole
/// process group, including background jobs that outlive the group leader
/// while holding the pipes open.
///
/// # Errors
/// Returns error if the process cannot be spawned.
pub fn spawn_streaming(mut cmd: Command) -> Result<SpawnedCommand, SessionError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .group_spawn()
        .map_err(|e| SessionError::Spawn(e.to_string()))?;

    let stdout = child
        .inner()
        .stdout
        .take()
        .ok_or_else(|| SessionError::Spawn("stdout not captured".to_string()))?;
    let stderr = child
        .inner()
        .stderr
        .take()
        .ok_or_else(|| SessionError::Spawn("stderr not captured".to_string()))?;

    let (tx, rx) = mpsc::unbounded_channel();
    let (terminator, interrupt_rx) = OneshotTerminator::channel();

    let readers = vec![
        tokio::spawn(read_lines(stdout, Channel::Stdout, tx.clone())),
        tokio::spawn(read_lines(stderr, Channel::Stderr, tx)),
    ];
    tokio::spawn(supervise(child, readers, interrupt_rx));

    Ok(SpawnedCommand {
        output: UnboundedReceiverStream::new(rx).boxed(),
        terminator,
    })
}

async fn read_lines<R>(reader: R, channel: Channel, tx: ChunkSender)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                let chunk = match channel {
                    Channel::Stdout => OutputChunk::stdout(line),
                    Channel::Stderr => OutputChunk::stderr(line),
                };
                if tx.send(Ok(chunk)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(?channel, "Failed to read command output: {e}");
                let _ = tx.send(Err(SessionError::Io(e)));
                break;
            }
        }
    }
}

async fn supervise(
    mut child: AsyncGroupChild,
    readers: Vec<JoinHandle<()>>,
    mut interrupt_rx: oneshot::Receiver<()>,
) {
    // The leader's pid is gone once it is reaped; the group id is not.
    let pgid = child.id();
    let aborts: Vec<_> = readers.iter().map(JoinHandle::abort_handle).collect();
    let mut drained = pin!(futures::future::join_all(readers));
    let mut exited = false;
    let mut listening = true;

    let interrupted = loop {
        tokio::select! {
            status = child.wait(), if !exited => {
                tracing::debug!(?status, "Command exited");
                exited = true;
            }
            _ = &mut drained => break false,
            signal = &mut interrupt_rx, if listening => match signal {
                Ok(()) => break true,
                Err(_) => listening = false,
            },
        }
    };

    if interrupted {
        tracing::debug!(?pgid, exited, "Interrupt requested, killing process group");
        kill_group(&mut child, pgid);
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut drained).await.is_err() {
            tracing::warn!("Command output still open after kill, closing stream");
            for abort in &aborts {
                abort.abort();
            }
        }
    }

    if !exited {
        let _ = child.wait().await;
    }
}

#[cfg(unix)]
fn kill_group(_child: &mut AsyncGroupChild, pgid: Option<u32>) {
    use nix::{
        errno::Errno,
        sys::signal::{self as nix_signal, Signal},
        unistd::Pid,
    };

    let Some(pgid) = pgid.and_then(|id| i32::try_from(id).ok()) else {
        tracing::warn!("No process group to kill");
        return;
    };
    match nix_signal::killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid, "Failed to kill process group: {e}"),
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut AsyncGroupChild, _pgid: Option<u32>) {
    if let Err(e) = child.start_kill() {
        tracing::warn!("Failed to kill process group: {e}");
    }
}
