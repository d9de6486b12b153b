//! Launching client binaries.
//!
//! Every client runs in its own process group, so that a timeout reaches
//! whatever it spawned too (docker containers, wrapper scripts). Both pipes
//! are drained while the client runs; whatever it printed before being
//! interrupted is still returned.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context as _, Result};
use itertools::Itertools as _;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt as _};
use tokio::process::Command;
use trace_diff::{RawOutput, Stream};
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// For inputs known to be slow to execute.
pub const EXTRA_TIMEOUT: Duration = Duration::from_secs(45);
/// How long an interrupted process group gets before it is killed, and how
/// long a killed one gets to release its pipes.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// The outcome of a [`Runner::run`].
#[derive(Debug)]
pub struct Finished {
    /// The selected stream, possibly cut short by a timeout.
    pub output: RawOutput,
    pub timed_out: bool,
    /// [`None`] if the exit status could not be collected after interrupting.
    pub status: Option<ExitStatus>,
}

/// A means of running a client as a subprocess.
#[derive(Clone, Debug)]
pub struct Runner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    stream: Stream,
}

impl Runner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            timeout: DEFAULT_TIMEOUT,
            stream: Stream::default(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Switch between [`DEFAULT_TIMEOUT`] and [`EXTRA_TIMEOUT`].
    pub fn extra_time(self, extra_time: bool) -> Self {
        self.timeout(if extra_time {
            EXTRA_TIMEOUT
        } else {
            DEFAULT_TIMEOUT
        })
    }

    /// Which stream carries the trace.
    pub fn stream(mut self, stream: Stream) -> Self {
        self.stream = stream;
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(&self.program).chain(&self.args).join(" ")
    }

    /// Run to completion or until the timeout expires.
    ///
    /// The timeout covers both the process and its pipes: a client that has
    /// exited but left something behind holding them open is interrupted
    /// like one still running. Only failing to start the process is an
    /// error. A client that times out or exits unsuccessfully still yields
    /// its output.
    pub async fn run(&self) -> Result<Finished> {
        let command_line = self.command_line();
        info!("{command_line}");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .context(format!("couldn't exec `{}`", self.program))?;
        // The group outlives the leader while anything it spawned is alive.
        let group = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .map(Pid::from_raw);
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let completed = tokio::time::timeout(self.timeout, async {
            tokio::join!(
                child.wait(),
                drain(&mut stdout, &mut out),
                drain(&mut stderr, &mut err)
            )
        })
        .await;

        let (status, timed_out) = match completed {
            Ok((status, out_read, err_read)) => {
                let status = status.context(format!("couldn't wait for `{}`", self.program))?;
                let read = match self.stream {
                    Stream::Stdout => out_read,
                    Stream::Stderr => err_read,
                };
                read.context(format!(
                    "couldn't read the {} of `{}`",
                    self.stream, self.program
                ))?;
                (Some(status), false)
            }
            Err(_) => {
                info!(
                    "TIMEOUT after {:?}, interrupting `{command_line}`",
                    self.timeout
                );
                let mut status = None;
                for signal in [Signal::SIGINT, Signal::SIGKILL] {
                    if let Some(group) = group {
                        if let Err(e) = killpg(group, signal) {
                            warn!("couldn't send {signal:?} to process group {group}: {e}");
                        }
                    }
                    let settled = tokio::time::timeout(KILL_GRACE, async {
                        tokio::join!(
                            child.wait(),
                            drain(&mut stdout, &mut out),
                            drain(&mut stderr, &mut err)
                        )
                    })
                    .await;
                    if let Ok((exited, ..)) = settled {
                        status = exited.ok();
                        break;
                    }
                    warn!("`{}` survived {signal:?}", self.program);
                }
                if status.is_none() {
                    status = child.try_wait().ok().flatten();
                }
                (status, true)
            }
        };
        debug!(?status, "`{}` finished", self.program);

        let captured = match self.stream {
            Stream::Stdout => out,
            Stream::Stderr => err,
        };
        Ok(Finished {
            output: RawOutput::from_text(self.stream, &String::from_utf8_lossy(&captured)),
            timed_out,
            status,
        })
    }
}

/// Read `pipe` to its end. Bytes are appended as they arrive, so a read
/// abandoned at a deadline keeps what it got and can be resumed.
async fn drain<R>(pipe: &mut Option<R>, captured: &mut Vec<u8>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok(());
    };
    let mut chunk = [0; 4096];
    loop {
        match pipe.read(&mut chunk).await? {
            0 => return Ok(()),
            n => captured.extend_from_slice(&chunk[..n]),
        }
    }
}
