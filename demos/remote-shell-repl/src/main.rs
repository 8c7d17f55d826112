//! Line-oriented shell over a persistent remote session.
//!
//! Run with: cargo run -p remote-shell-repl -- [--local] [--config session.json]
//!
//! Input lines are run on the connected host. Lines starting with `%` are
//! session commands:
//!
//! - `%login HOST` - connect (`{NAME}` expands parameters)
//! - `%logout` - disconnect
//! - `%param NAME VALUE` - define a parameter, exported on the next login
//! - `%complete TEXT` - list completions for the end of TEXT
//!
//! Ctrl-C interrupts the running command.

use std::io::Write as _;

use anyhow::{Context, bail};
use remote_shell_core::{ShellError, Transport};
use remote_shell_session::{Session, SessionConfig};
use remote_shell_transport::{LocalTransport, OpenSshTransport};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Args {
    local: bool,
    config: SessionConfig,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut local = false;
    let mut config = SessionConfig::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--local" => local = true,
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {path}"))?;
                config = SessionConfig::from_json(&json)?;
            }
            other => bail!("Unknown argument: {other}"),
        }
    }

    Ok(Args { local, config })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args()?;
    let shell = args.config.shell.clone();

    if args.local {
        let session = Session::new(LocalTransport::new().shell(shell)).with_config(args.config);
        repl(session).await
    } else {
        let session =
            Session::new(OpenSshTransport::new().remote_shell(shell)).with_config(args.config);
        repl(session).await
    }
}

async fn repl<T: Transport>(mut session: Session<T>) -> anyhow::Result<()> {
    let interrupter = session.interrupter();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !interrupter.interrupt() {
                eprintln!("(nothing to interrupt; Ctrl-D exits)");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt(&session);

    while let Some(line) = lines.next_line().await? {
        if let Err(err) = handle_line(&mut session, line.trim_end()).await {
            eprintln!("error: {err:#}");
        }
        prompt(&session);
    }

    session.close().await;
    Ok(())
}

async fn handle_line<T: Transport>(session: &mut Session<T>, line: &str) -> anyhow::Result<()> {
    let Some(magic) = line.strip_prefix('%') else {
        if !line.trim().is_empty() {
            run(session, line).await?;
        }
        return Ok(());
    };

    let mut words = magic.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some("login"), Some(host), None) => {
            let host = session.config().expand_host(host)?;
            session.connect(&host).await?;
            println!("[ssh] Successfully logged in to {host}.");
        }
        (Some("logout"), None, None) => {
            session.close().await;
            println!("[ssh] Successfully logged out.");
        }
        (Some("param"), Some(name), Some(_)) => {
            let value = magic
                .trim_start()
                .strip_prefix("param")
                .and_then(|rest| rest.trim_start().strip_prefix(name))
                .map_or("", str::trim);
            session.set_param(name, value)?;
        }
        (Some("complete"), ..) => {
            let text = magic.trim_start().strip_prefix("complete").unwrap_or("");
            let text = text.strip_prefix(' ').unwrap_or(text);
            let completion = session.complete(text, text.len()).await?;
            for candidate in completion.matches {
                println!("{candidate}");
            }
        }
        _ => bail!("Unknown or malformed session command: %{magic}"),
    }
    Ok(())
}

async fn run<T: Transport>(session: &mut Session<T>, command: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    let result = session
        .exec(command, |line| {
            let _ = stdout.write_all(line.as_bytes());
            let _ = stdout.flush();
        })
        .await;

    match result {
        Ok(0) => {}
        Ok(code) => eprintln!("[exit {code}]"),
        Err(ShellError::Interrupted) => eprintln!("[interrupted]"),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn prompt<T: Transport>(session: &Session<T>) {
    match session.host() {
        Some(host) => print!("{host}:{}$ ", session.cwd()),
        None => print!("(not connected)$ "),
    }
    let _ = std::io::stdout().flush();
}
