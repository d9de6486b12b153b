use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use alloy::transports::http::reqwest::Url;
use anyhow::{anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueHint};
use trace_diff::{ClientKind, Stream};

const RPC_HELP_HEADING: &str = "RPC options";
const TRACE_HELP_HEADING: &str = "Trace options";

/// Differential testing of EVM clients
#[derive(Parser)]
#[command(version = evmlab::version(), propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Runs every client on the same input and compares their traces.
    Run {
        /// A client, as `NAME:KIND:COMMAND`. The command is run by `sh`.
        /// Give at least two.
        #[arg(short, long = "client", required = true, value_name = "NAME:KIND:COMMAND")]
        clients: Vec<ClientSpec>,
        /// Seconds a client may run before it is interrupted.
        #[arg(short, long, env = "EVMDIFF_TIMEOUT", value_parser = parse_seconds, conflicts_with = "extra_time")]
        timeout: Option<Duration>,
        /// Allow the longer timeout, for inputs known to be slow.
        #[arg(long, env = "EVMDIFF_EXTRA_TIME")]
        extra_time: bool,
        /// Read every client's trace from this stream instead of the one its
        /// kind writes to.
        #[arg(long, env = "EVMDIFF_STREAM")]
        stream: Option<Stream>,
        #[clap(flatten)]
        trace: TraceArgs,
    },
    /// Compares client output saved to files.
    Compare {
        /// A saved output, as `NAME:KIND:PATH`. Give at least two.
        #[arg(short = 'f', long = "trace", required = true, value_name = "NAME:KIND:PATH")]
        traces: Vec<SavedTrace>,
        #[clap(flatten)]
        trace: TraceArgs,
    },
    /// Prints the balance, code and nonce of an account.
    Account {
        #[clap(flatten)]
        rpc: RpcArgs,
        address: Address,
        /// Read the state at this block rather than the latest one.
        #[arg(short, long)]
        block: Option<u64>,
        /// Report the hex-encoded code in this file instead of the
        /// account's own.
        #[arg(long, value_hint = ValueHint::FilePath)]
        code_file: Option<PathBuf>,
    },
    /// Prints one storage slot of an account.
    Storage {
        #[clap(flatten)]
        rpc: RpcArgs,
        address: Address,
        key: U256,
        /// Read the state at this block rather than the latest one.
        #[arg(short, long)]
        block: Option<u64>,
    },
    /// Prints a transaction.
    Tx {
        #[clap(flatten)]
        rpc: RpcArgs,
        hash: B256,
    },
    /// Prints the node's own trace of a transaction.
    TraceTx {
        #[clap(flatten)]
        rpc: RpcArgs,
        hash: B256,
        #[arg(long)]
        disable_storage: bool,
        #[arg(long)]
        disable_memory: bool,
        #[arg(long)]
        disable_stack: bool,
        /// A JavaScript or built-in tracer to run instead of the struct logger.
        #[arg(long)]
        tracer: Option<String>,
        /// Tracer timeout, as understood by the node (e.g. `10s`).
        #[arg(long)]
        tracer_timeout: Option<String>,
    },
}

#[derive(Args, Clone, Copy, Debug)]
pub(crate) struct TraceArgs {
    /// Leave post-state roots out of the comparison.
    #[arg(long, env = "EVMDIFF_NO_STATE_ROOT", help_heading = TRACE_HELP_HEADING)]
    pub(crate) no_state_root: bool,
    /// Print the maximum call depth and Constantinople opcode count of each
    /// trace.
    #[arg(long, env = "EVMDIFF_STATS", help_heading = TRACE_HELP_HEADING)]
    pub(crate) stats: bool,
}

#[derive(Args, Clone, Debug)]
pub(crate) struct RpcArgs {
    /// The node RPC URL.
    #[arg(short = 'u', long, env = "EVMDIFF_RPC_URL", value_hint = ValueHint::Url, help_heading = RPC_HELP_HEADING)]
    pub(crate) rpc_url: Url,
    /// Backoff in milliseconds after a rate-limited request.
    #[arg(long, env = "EVMDIFF_BACKOFF", default_value_t = 1000, help_heading = RPC_HELP_HEADING)]
    pub(crate) backoff: u64,
    /// The maximum number of retries of a rate-limited request. Unbounded
    /// if unset.
    #[arg(long, env = "EVMDIFF_MAX_RETRIES", help_heading = RPC_HELP_HEADING)]
    pub(crate) max_retries: Option<u32>,
    /// Seconds before a single request is abandoned.
    #[arg(long, env = "EVMDIFF_REQUEST_TIMEOUT", value_parser = parse_seconds, default_value = "30", help_heading = RPC_HELP_HEADING)]
    pub(crate) request_timeout: Duration,
    /// Where to keep the run's lookup cache.
    #[arg(long, env = "EVMDIFF_CACHE_DIR", value_hint = ValueHint::DirPath, help_heading = RPC_HELP_HEADING)]
    pub(crate) cache_dir: Option<PathBuf>,
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    s.parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| format!("`{s}` is not a number of seconds"))
}

/// Split `NAME:KIND:REST`, where only `REST` may contain colons.
fn split_spec(s: &str) -> anyhow::Result<(String, ClientKind, String)> {
    let mut parts = s.splitn(3, ':');
    let (Some(name), Some(kind), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("expected NAME:KIND:..., got `{s}`");
    };
    if name.is_empty() || rest.is_empty() {
        bail!("empty name or value in `{s}`");
    }
    let kind = kind
        .parse::<ClientKind>()
        .map_err(|_| anyhow!("unknown client kind `{kind}`"))?;
    Ok((name.to_owned(), kind, rest.to_owned()))
}

/// A client to launch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ClientSpec {
    pub(crate) name: String,
    pub(crate) kind: ClientKind,
    pub(crate) command: String,
}

impl FromStr for ClientSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, kind, command) = split_spec(s)?;
        Ok(Self {
            name,
            kind,
            command,
        })
    }
}

/// Output of a client saved to a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SavedTrace {
    pub(crate) name: String,
    pub(crate) kind: ClientKind,
    pub(crate) path: PathBuf,
}

impl FromStr for SavedTrace {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, kind, path) = split_spec(s)?;
        Ok(Self {
            name,
            kind,
            path: path.into(),
        })
    }
}
