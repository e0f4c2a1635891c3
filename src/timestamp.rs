//! Memoized block-number to wall-clock timestamp resolution.
//!
//! Block timestamps are immutable once mined, so the cache is append-only
//! and never evicts; its intended lifetime is the whole process. The cache
//! is address-independent and is meant to be shared (via `Arc`) between the
//! backfill path and any number of feeds.

use std::{collections::HashMap, sync::Arc};

use alloy::{
    consensus::BlockHeader,
    network::{BlockResponse, Network},
};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::{error::HistoryError, safe_provider::SafeProvider};

pub struct BlockTimestampCache<N: Network> {
    provider: SafeProvider<N>,
    slots: Mutex<HashMap<u64, Arc<OnceCell<u64>>>>,
}

impl<N: Network> BlockTimestampCache<N> {
    #[must_use]
    pub fn new(provider: SafeProvider<N>) -> Self {
        Self { provider, slots: Mutex::new(HashMap::new()) }
    }

    /// Resolves a block number to its UNIX timestamp (seconds).
    ///
    /// Cache hits return without touching the network. On a miss, exactly
    /// one `eth_getBlockByNumber` lookup is issued per block number:
    /// concurrent callers asking for the same block share the in-flight
    /// request instead of each paying the network cost. A failed lookup
    /// leaves the slot empty, so a later call will try again.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::TimestampResolution`] if the lookup fails or
    /// the block does not exist.
    pub async fn resolve(&self, number: u64) -> Result<u64, HistoryError> {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(number).or_default())
        };

        let timestamp = slot
            .get_or_try_init(|| async {
                debug!(block_number = number, "resolving block timestamp");
                let block = self
                    .provider
                    .get_block_by_number(number.into())
                    .await
                    .map_err(|e| HistoryError::TimestampResolution {
                        block: number,
                        cause: Arc::new(e),
                    })?
                    .ok_or_else(|| HistoryError::TimestampResolution {
                        block: number,
                        cause: Arc::new(alloy::transports::TransportErrorKind::custom_str(
                            "block not found",
                        )),
                    })?;
                Ok::<u64, HistoryError>(block.header().timestamp())
            })
            .await?;

        Ok(*timestamp)
    }

    /// Number of resolved entries currently held.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy::{
        network::Ethereum,
        providers::RootProvider,
        rpc::{
            client::RpcClient,
            types::{Block as RpcBlock, Header, Transaction},
        },
        transports::mock::Asserter,
    };
    use serde_json::Value;

    use super::*;

    fn mocked_cache(asserter: Asserter) -> BlockTimestampCache<Ethereum> {
        let provider = RootProvider::<Ethereum>::new(RpcClient::mocked(asserter));
        let provider = SafeProvider::new(provider)
            .max_retries(0)
            .max_timeout(Duration::from_secs(1))
            .retry_interval(Duration::from_millis(1));
        BlockTimestampCache::new(provider)
    }

    fn mock_block(number: u64, timestamp: u64) -> RpcBlock<Transaction, Header> {
        let mut block: RpcBlock<Transaction, Header> = RpcBlock::default();
        block.header.number = number;
        block.header.timestamp = timestamp;
        block
    }

    #[tokio::test]
    async fn second_resolution_hits_the_cache() -> anyhow::Result<()> {
        let asserter = Asserter::new();
        let cache = mocked_cache(asserter.clone());

        // exactly one block response queued: a second network lookup would fail
        asserter.push_success(&mock_block(4500, 1_700_000_000));

        assert_eq!(cache.resolve(4500).await?, 1_700_000_000);
        assert_eq!(cache.resolve(4500).await?, 1_700_000_000);
        assert_eq!(cache.len().await, 1);

        Ok(())
    }

    #[tokio::test]
    async fn concurrent_resolutions_share_one_lookup() -> anyhow::Result<()> {
        let asserter = Asserter::new();
        let cache = Arc::new(mocked_cache(asserter.clone()));

        asserter.push_success(&mock_block(77, 1_234));

        let a = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve(77).await })
        };
        let b = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve(77).await })
        };

        assert_eq!(a.await??, 1_234);
        assert_eq!(b.await??, 1_234);

        Ok(())
    }

    #[tokio::test]
    async fn distinct_blocks_resolve_independently() -> anyhow::Result<()> {
        let asserter = Asserter::new();
        let cache = mocked_cache(asserter.clone());

        asserter.push_success(&mock_block(10, 100));
        asserter.push_success(&mock_block(11, 112));

        assert_eq!(cache.resolve(10).await?, 100);
        assert_eq!(cache.resolve(11).await?, 112);
        assert_eq!(cache.len().await, 2);

        Ok(())
    }

    #[tokio::test]
    async fn missing_block_is_an_error_and_retriable() -> anyhow::Result<()> {
        let asserter = Asserter::new();
        let cache = mocked_cache(asserter.clone());

        asserter.push_success(&Value::Null);
        let err = cache.resolve(99).await.unwrap_err();
        assert!(matches!(err, HistoryError::TimestampResolution { block: 99, .. }));
        assert!(cache.is_empty().await);

        // the failed slot stays empty, so a later attempt retries the lookup
        asserter.push_success(&mock_block(99, 555));
        assert_eq!(cache.resolve(99).await?, 555);

        Ok(())
    }
}
