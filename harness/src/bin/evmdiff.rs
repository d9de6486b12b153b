use std::path::Path;
use std::process::ExitCode;

use alloy::primitives::Bytes;
use alloy::providers::RootProvider;
use alloy::transports::http::ReqwestTransport;
use anyhow::{Context as _, Result};
use clap::Parser as _;
use evmlab::chain::{ChainDataClient, RetryPolicy, RpcChainData, ScopedCache, TraceOptions};
use evmlab::env::load_dotenvy_vars_if_present;
use evmlab::runner::Runner;
use futures::future::try_join_all;
use serde::Serialize;
use trace_diff::{
    annotate, compare, CanonicalTrace, Canonicalizer, ClientKind, NamedTrace, RawOutput,
    TraceConfig,
};
use tracing::{info, warn};

use self::evmdiff::cli::{self, ClientSpec, Command, RpcArgs, TraceArgs};

mod evmdiff {
    pub mod cli;
}

/// One client's output, ready to be canonicalized.
struct Captured {
    name: String,
    kind: ClientKind,
    output: RawOutput,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    load_dotenvy_vars_if_present();
    evmlab::tracing::init();

    let args = cli::Cli::parse();
    match args.command {
        Command::Run {
            clients,
            timeout,
            extra_time,
            stream,
            trace,
        } => {
            let captured = try_join_all(clients.into_iter().map(|client| {
                let ClientSpec {
                    name,
                    kind,
                    command,
                } = client;
                let mut runner = Runner::new("sh")
                    .args(["-c".to_owned(), command])
                    .extra_time(extra_time)
                    .stream(stream.unwrap_or(kind.default_stream()));
                if let Some(timeout) = timeout {
                    runner = runner.timeout(timeout);
                }
                async move {
                    let finished = runner.run().await?;
                    if finished.timed_out {
                        warn!("{name} timed out, comparing what it printed so far");
                    }
                    anyhow::Ok(Captured {
                        name,
                        kind,
                        output: finished.output,
                    })
                }
            }))
            .await?;
            report(captured, trace)
        }
        Command::Compare { traces, trace } => {
            let mut captured = Vec::with_capacity(traces.len());
            for saved in traces {
                let text = tokio::fs::read_to_string(&saved.path)
                    .await
                    .with_context(|| format!("couldn't read {}", saved.path.display()))?;
                captured.push(Captured {
                    name: saved.name,
                    kind: saved.kind,
                    output: RawOutput::from_text(saved.kind.default_stream(), &text),
                });
            }
            report(captured, trace)
        }
        Command::Account {
            rpc,
            address,
            block,
            code_file,
        } => {
            let code = match code_file {
                Some(path) => Some(read_code(&path).await?),
                None => None,
            };
            let client = chain_client(&rpc)?;
            let account = client.account_info(address, block, code).await;
            finish_lookup(client, account)
        }
        Command::Storage {
            rpc,
            address,
            key,
            block,
        } => {
            let client = chain_client(&rpc)?;
            let value = client.storage_slot(address, key, block).await;
            finish_lookup(client, value)
        }
        Command::Tx { rpc, hash } => {
            let client = chain_client(&rpc)?;
            let transaction = client.transaction(hash).await;
            finish_lookup(client, transaction)
        }
        Command::TraceTx {
            rpc,
            hash,
            disable_storage,
            disable_memory,
            disable_stack,
            tracer,
            tracer_timeout,
        } => {
            let options = TraceOptions {
                disable_storage,
                disable_memory,
                disable_stack,
                tracer,
                timeout: tracer_timeout,
            };
            let client = chain_client(&rpc)?;
            let trace = client.trace_transaction(hash, &options).await;
            finish_lookup(client, trace)
        }
    }
}

/// Canonicalize, compare and print. Fails the process when the clients
/// disagree.
fn report(captured: Vec<Captured>, args: TraceArgs) -> Result<ExitCode> {
    let config = if args.no_state_root {
        TraceConfig::without_state_root()
    } else {
        TraceConfig::default()
    };

    let mut traces = Vec::with_capacity(captured.len());
    for Captured { name, kind, output } in captured {
        let canonical = Canonicalizer::new(kind, config).canonicalize(&output);
        let mut annotated = annotate(canonical);
        let trace = annotated.by_ref().collect::<CanonicalTrace>();
        info!(
            "{name}: {} lines in, {} steps out",
            output.lines.len(),
            trace.len()
        );
        if args.stats {
            println!("{name} {}", serde_json::to_string(&annotated.stats())?);
        }
        traces.push((name, trace));
    }

    let named = traces
        .iter()
        .map(|(name, trace)| NamedTrace::new(name, trace))
        .collect::<Vec<_>>();
    let result = compare(&named, &config)?;
    if !result.annotated_log.is_empty() {
        println!("{result}");
    }

    Ok(match result.first_divergence {
        None => {
            info!("all {} clients agree", named.len());
            ExitCode::SUCCESS
        }
        Some(position) => {
            warn!("clients diverge at step {position}");
            ExitCode::FAILURE
        }
    })
}

fn chain_client(
    rpc: &RpcArgs,
) -> Result<ChainDataClient<RpcChainData<RootProvider<ReqwestTransport>, ReqwestTransport>>> {
    let backend = RpcChainData::new(RootProvider::new_http(rpc.rpc_url.clone()))
        .with_request_timeout(rpc.request_timeout);
    let cache = match &rpc.cache_dir {
        Some(dir) => ScopedCache::create_in(dir)?,
        None => ScopedCache::create()?,
    };
    let retry = RetryPolicy::new(
        tokio::time::Duration::from_millis(rpc.backoff),
        rpc.max_retries,
    );
    Ok(ChainDataClient::new(backend, cache, retry))
}

async fn read_code(path: &Path) -> Result<Bytes> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("couldn't read {}", path.display()))?;
    text.trim()
        .parse()
        .with_context(|| format!("{} does not hold hex-encoded code", path.display()))
}

/// Release the cache, then print the result as JSON.
fn finish_lookup<P, T>(
    client: ChainDataClient<P>,
    result: Result<Option<T>, evmlab::chain::FetchError>,
) -> Result<ExitCode>
where
    P: evmlab::chain::ChainData,
    T: Serialize,
{
    client.close()?;
    match result? {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            warn!("nothing found");
            Ok(ExitCode::FAILURE)
        }
    }
}
