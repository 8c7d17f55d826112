//! Scripted transport for session tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::{StreamExt, future, stream};
use remote_shell_core::{
    Connection, ConnectionError, HostParams, OneshotTerminator, OutputChunk, OutputStream, SessionError,
    SpawnedCommand, Transport,
};

/// Calls observed by a [`RecordingConnection`].
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    pub opened: Vec<String>,
    pub scripts: Vec<String>,
    pub cwd_changes: Vec<String>,
    pub env_deltas: Vec<HashMap<String, String>>,
    pub closed: usize,
}

/// How the next framed script behaves.
#[derive(Debug)]
pub enum Reply {
    /// Print the output, then a trailer.
    Run {
        output: Vec<OutputChunk>,
        code: i32,
        pwd: String,
        env: String,
    },
    /// Print the output and exit without a trailer.
    NoTrailer(Vec<OutputChunk>),
    /// Print the output, then block until terminated.
    Hang(Vec<OutputChunk>),
    /// Print a full trailer, then block until terminated.
    Linger { code: i32, pwd: String, env: String },
    /// The transport drops while the command runs.
    Fail,
}

impl Reply {
    pub fn ok(pwd: &str) -> Self {
        Self::Run {
            output: Vec::new(),
            code: 0,
            pwd: pwd.to_string(),
            env: String::new(),
        }
    }
}

type Replies = Arc<Mutex<VecDeque<Reply>>>;
type Log = Arc<Mutex<CallLog>>;

#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    cwd: String,
    replies: Replies,
    log: Log,
    unreachable: bool,
}

impl ScriptedTransport {
    pub fn new(cwd: &str) -> Self {
        Self {
            cwd: cwd.to_string(),
            replies: Arc::default(),
            log: Arc::default(),
            unreachable: false,
        }
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn log(&self) -> CallLog {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open_session(
        &self,
        host: &str,
        params: &HostParams,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        if self.unreachable {
            return Err(ConnectionError::Unreachable {
                host: host.to_string(),
                reason: "scripted".to_string(),
            });
        }
        self.log.lock().unwrap().opened.push(params.hostname.clone());
        Ok(Box::new(RecordingConnection {
            cwd: self.cwd.clone(),
            replies: Arc::clone(&self.replies),
            log: Arc::clone(&self.log),
            reject_cwd: false,
        }))
    }
}

#[derive(Debug)]
pub struct RecordingConnection {
    cwd: String,
    replies: Replies,
    log: Log,
    reject_cwd: bool,
}

impl RecordingConnection {
    pub fn new(cwd: &str) -> Self {
        Self {
            cwd: cwd.to_string(),
            replies: Arc::default(),
            log: Arc::default(),
            reject_cwd: false,
        }
    }

    pub fn reject_cwd(mut self) -> Self {
        self.reject_cwd = true;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.lock().unwrap().clone()
    }
}

/// Pull the marker back out of a framed script.
fn marker_of(script: &str) -> String {
    let line = script
        .lines()
        .find(|line| line.contains("code: ${EXIT_CODE}"))
        .unwrap();
    let start = line.find('"').unwrap() + 1;
    let end = line.find("code: ").unwrap();
    line[start..end].to_string()
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn run_framed(&self, script: &str) -> Result<SpawnedCommand, SessionError> {
        self.log.lock().unwrap().scripts.push(script.to_string());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::ok(&self.cwd));
        let m = marker_of(script);
        let (terminator, interrupted) = OneshotTerminator::channel();

        let output: OutputStream = match reply {
            Reply::Run {
                mut output,
                code,
                pwd,
                env,
            } => {
                output.push(OutputChunk::stdout(format!("{m}code: {code}{m}\n")));
                output.push(OutputChunk::stdout(format!("{m}pwd: {pwd}{m}\n")));
                output.push(OutputChunk::stdout(format!("{m}env: {env}{m}\n")));
                stream::iter(output.into_iter().map(Ok)).boxed()
            }
            Reply::NoTrailer(output) => stream::iter(output.into_iter().map(Ok)).boxed(),
            Reply::Hang(output) => stream::iter(output.into_iter().map(Ok))
                .chain(stream::once(interrupted).filter_map(|_| future::ready(None)))
                .boxed(),
            Reply::Linger { code, pwd, env } => stream::iter(
                [
                    format!("{m}code: {code}{m}\n"),
                    format!("{m}pwd: {pwd}{m}\n"),
                    format!("{m}env: {env}{m}\n"),
                ]
                .map(|line| Ok(OutputChunk::stdout(line))),
            )
            .chain(stream::once(interrupted).filter_map(|_| future::ready(None)))
            .boxed(),
            Reply::Fail => stream::iter(vec![
                Ok(OutputChunk::stdout("partial\n")),
                Err(SessionError::Transport("connection reset".to_string())),
            ])
            .boxed(),
        };

        Ok(SpawnedCommand { output, terminator })
    }

    fn set_persistent_env(&mut self, delta: &HashMap<String, String>) {
        self.log.lock().unwrap().env_deltas.push(delta.clone());
    }

    fn set_persistent_cwd(&mut self, path: &str) -> Result<(), SessionError> {
        if self.reject_cwd {
            return Err(SessionError::Transport(format!("{path} rejected")));
        }
        self.log.lock().unwrap().cwd_changes.push(path.to_string());
        self.cwd = path.to_string();
        Ok(())
    }

    fn persistent_cwd(&self) -> &str {
        &self.cwd
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}
