//! Chain state for building test inputs: accounts, storage, transactions and
//! reference traces.
//!
//! A [`ChainData`] backend answers single lookups. [`ChainDataClient`] puts a
//! run-scoped on-disk cache and a rate-limit [`RetryPolicy`] in front of it,
//! and turns every failure except [`FetchError::Timeout`] into an empty
//! result, so that one flaky lookup does not abort a whole run.

use std::future::Future;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

mod cache;
mod client;
mod retry;
mod rpc;

pub use cache::ScopedCache;
pub use client::ChainDataClient;
pub use retry::RetryPolicy;
pub use rpc::RpcChainData;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("rate limited by the provider")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub address: Address,
    pub balance: U256,
    pub code: Bytes,
    pub nonce: u64,
}

/// Options for `debug_traceTransaction`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceOptions {
    pub disable_storage: bool,
    pub disable_memory: bool,
    pub disable_stack: bool,
    pub tracer: Option<String>,
    /// A duration string understood by the node, e.g. `"10s"`.
    pub timeout: Option<String>,
}

/// A transaction as a JSON object.
pub type TransactionRecord = serde_json::Map<String, serde_json::Value>;

/// A source of chain state.
///
/// `block` selects the state to read; [`None`] means the latest block.
pub trait ChainData {
    fn account_info(
        &self,
        address: Address,
        block: Option<u64>,
    ) -> impl Future<Output = Result<AccountInfo, FetchError>> + Send;

    fn storage_slot(
        &self,
        _address: Address,
        _key: U256,
        _block: Option<u64>,
    ) -> impl Future<Output = Result<U256, FetchError>> + Send {
        async { Err(FetchError::Unsupported("storage lookup")) }
    }

    /// [`None`] if the backend doesn't know the transaction.
    fn transaction(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionRecord>, FetchError>> + Send;

    fn trace_transaction(
        &self,
        _hash: B256,
        _options: &TraceOptions,
    ) -> impl Future<Output = Result<serde_json::Value, FetchError>> + Send {
        async { Err(FetchError::Unsupported("debug_traceTransaction")) }
    }
}
