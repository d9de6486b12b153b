use std::future::IntoFuture;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::BlockId;
use alloy::transports::{RpcError, Transport, TransportError, TransportErrorKind};

use super::{AccountInfo, ChainData, FetchError, TraceOptions, TransactionRecord};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`ChainData`] from a JSON-RPC node.
pub struct RpcChainData<ProviderT, TransportT> {
    provider: ProviderT,
    request_timeout: Duration,
    _phantom: std::marker::PhantomData<TransportT>,
}

impl<ProviderT, TransportT> RpcChainData<ProviderT, TransportT>
where
    ProviderT: Provider<TransportT>,
    TransportT: Transport + Clone,
{
    pub fn new(provider: ProviderT) -> Self {
        Self {
            provider,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Requests taking longer fail with [`FetchError::Timeout`].
    pub fn with_request_timeout(self, request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            ..self
        }
    }

    async fn request<T, F>(&self, request: F) -> Result<T, FetchError>
    where
        F: IntoFuture<Output = Result<T, TransportError>>,
    {
        match tokio::time::timeout(self.request_timeout, request.into_future()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

fn block_id(block: Option<u64>) -> BlockId {
    block.map_or_else(BlockId::latest, BlockId::number)
}

/// Only an HTTP 429 is worth retrying. Everything else degrades.
fn classify(e: TransportError) -> FetchError {
    match e {
        RpcError::Transport(TransportErrorKind::HttpError(http)) if http.is_rate_limit_err() => {
            FetchError::RateLimited
        }
        e => FetchError::Other(e.into()),
    }
}

impl<ProviderT, TransportT> ChainData for RpcChainData<ProviderT, TransportT>
where
    ProviderT: Provider<TransportT>,
    TransportT: Transport + Clone,
{
    async fn account_info(
        &self,
        address: Address,
        block: Option<u64>,
    ) -> Result<AccountInfo, FetchError> {
        let block = block_id(block);
        let balance = self
            .request(self.provider.get_balance(address).block_id(block))
            .await?;
        let code = self
            .request(self.provider.get_code_at(address).block_id(block))
            .await?;
        let nonce = self
            .request(self.provider.get_transaction_count(address).block_id(block))
            .await?;
        Ok(AccountInfo {
            address,
            balance,
            code,
            nonce,
        })
    }

    async fn storage_slot(
        &self,
        address: Address,
        key: U256,
        block: Option<u64>,
    ) -> Result<U256, FetchError> {
        self.request(
            self.provider
                .get_storage_at(address, key)
                .block_id(block_id(block)),
        )
        .await
    }

    async fn transaction(&self, hash: B256) -> Result<Option<TransactionRecord>, FetchError> {
        let Some(transaction) = self
            .request(self.provider.get_transaction_by_hash(hash))
            .await?
        else {
            return Ok(None);
        };
        match serde_json::to_value(transaction).map_err(anyhow::Error::from)? {
            serde_json::Value::Object(record) => Ok(Some(record)),
            other => Err(anyhow::anyhow!("transaction {hash} is not an object: {other}").into()),
        }
    }

    async fn trace_transaction(
        &self,
        hash: B256,
        options: &TraceOptions,
    ) -> Result<serde_json::Value, FetchError> {
        self.request(
            self.provider
                .raw_request::<_, serde_json::Value>(
                    "debug_traceTransaction".into(),
                    (hash, options.clone()),
                ),
        )
        .await
    }
}
