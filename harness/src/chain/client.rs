use alloy::primitives::{Address, Bytes, B256, U256};
use tracing::{info, warn};

use super::{
    AccountInfo, ChainData, FetchError, RetryPolicy, ScopedCache, TraceOptions, TransactionRecord,
};

/// Pairs of (harness name, provider name) for transaction fields. Both are
/// present in every record handed out.
const TRANSACTION_FIELDS: [(&str, &str); 3] = [
    ("sender", "from"),
    ("recipient", "to"),
    ("block_id", "blockNumber"),
];

/// Caching, retrying front for a [`ChainData`] backend.
///
/// Lookups pinned to a block are immutable, so they are cached for the rest
/// of the run; lookups against the latest block never are. Only
/// [`FetchError::Timeout`] is returned as an error: any other failure is
/// logged and reported as [`None`].
pub struct ChainDataClient<P> {
    backend: P,
    cache: ScopedCache,
    retry: RetryPolicy,
}

impl<P: ChainData> ChainDataClient<P> {
    pub const fn new(backend: P, cache: ScopedCache, retry: RetryPolicy) -> Self {
        Self {
            backend,
            cache,
            retry,
        }
    }

    /// With `code_override`, the account's code is replaced by the given
    /// bytes. Such lookups bypass the cache in both directions, as the
    /// result is not the chain's.
    pub async fn account_info(
        &self,
        address: Address,
        block: Option<u64>,
        code_override: Option<Bytes>,
    ) -> Result<Option<AccountInfo>, FetchError> {
        info!("account_info({address}, {block:?})");
        let key = block
            .filter(|_| code_override.is_none())
            .map(|block| format!("{address}-{block}"));
        if let Some(cached) = key.as_deref().and_then(|key| self.cache.get(key)) {
            return Ok(Some(cached));
        }
        let fetched = self
            .retry
            .run("account_info", || self.backend.account_info(address, block))
            .await;
        let Some(mut account) = degrade("account_info", fetched)? else {
            return Ok(None);
        };
        match code_override {
            Some(code) => account.code = code,
            None => {
                if let Some(key) = &key {
                    self.store(key, &account);
                }
            }
        }
        Ok(Some(account))
    }

    pub async fn storage_slot(
        &self,
        address: Address,
        slot: U256,
        block: Option<u64>,
    ) -> Result<Option<U256>, FetchError> {
        info!("storage_slot({address}, {slot:#x}, {block:?})");
        let key = block.map(|block| format!("{address}-{block}-{slot:#x}"));
        if let Some(cached) = key.as_deref().and_then(|key| self.cache.get(key)) {
            return Ok(Some(cached));
        }
        let fetched = self
            .retry
            .run("storage_slot", || {
                self.backend.storage_slot(address, slot, block)
            })
            .await;
        let value = degrade("storage_slot", fetched)?;
        if let (Some(key), Some(value)) = (&key, &value) {
            self.store(key, value);
        }
        Ok(value)
    }

    /// The transaction with both provider and harness field names.
    pub async fn transaction(&self, hash: B256) -> Result<Option<TransactionRecord>, FetchError> {
        let key = format!("tx-{hash}");
        if let Some(cached) = self.cache.get(&key) {
            return Ok(Some(cached));
        }
        let fetched = self
            .retry
            .run("transaction", || self.backend.transaction(hash))
            .await;
        let Some(mut record) = degrade("transaction", fetched)?.flatten() else {
            return Ok(None);
        };
        add_field_aliases(&mut record);
        self.store(&key, &record);
        Ok(Some(record))
    }

    /// Never cached.
    pub async fn trace_transaction(
        &self,
        hash: B256,
        options: &TraceOptions,
    ) -> Result<Option<serde_json::Value>, FetchError> {
        let fetched = self
            .retry
            .run("trace_transaction", || {
                self.backend.trace_transaction(hash, options)
            })
            .await;
        degrade("trace_transaction", fetched)
    }

    pub fn backend(&self) -> &P {
        &self.backend
    }

    /// Release the cache. Dropping the client does the same, without
    /// reporting failure.
    pub fn close(self) -> anyhow::Result<()> {
        self.cache.close()
    }

    fn store<T: serde::Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.cache.put(key, value) {
            warn!("{e:#}");
        }
    }
}

fn degrade<T>(what: &str, result: Result<T, FetchError>) -> Result<Option<T>, FetchError> {
    match result {
        Ok(it) => Ok(Some(it)),
        Err(FetchError::Timeout) => Err(FetchError::Timeout),
        Err(e @ FetchError::Unsupported(_)) => {
            info!("{what}: {e}");
            Ok(None)
        }
        Err(e) => {
            warn!("{what} failed, trace may not be correct: {e:#}");
            Ok(None)
        }
    }
}

fn add_field_aliases(record: &mut TransactionRecord) {
    for (ours, theirs) in TRANSACTION_FIELDS {
        match (record.get(ours).cloned(), record.get(theirs).cloned()) {
            (None, Some(value)) => {
                record.insert(ours.to_owned(), value);
            }
            (Some(value), None) => {
                record.insert(theirs.to_owned(), value);
            }
            _ => {}
        }
    }
}
