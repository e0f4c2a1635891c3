//! Single-window log retrieval.

use std::{ops::RangeInclusive, sync::Arc};

use alloy::{network::Network, primitives::Address, rpc::types::Log};
use tracing::debug;

use crate::{contract::EventKind, error::HistoryError, safe_provider::SafeProvider};

/// Fetches raw logs for one event kind over one block window.
///
/// Each call issues exactly one `eth_getLogs` query; splitting a large range
/// into provider-safe windows is the caller's concern.
#[derive(Clone)]
pub struct LogFetcher<N: Network> {
    provider: SafeProvider<N>,
    contract: Address,
}

impl<N: Network> LogFetcher<N> {
    #[must_use]
    pub fn new(provider: SafeProvider<N>, contract: Address) -> Self {
        Self { provider, contract }
    }

    #[must_use]
    pub fn contract(&self) -> Address {
        self.contract
    }

    #[must_use]
    pub fn provider(&self) -> &SafeProvider<N> {
        &self.provider
    }

    /// Current chain head.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Rpc`] if the head query fails.
    pub async fn head(&self) -> Result<u64, HistoryError> {
        Ok(self.provider.get_block_number().await?)
    }

    /// Fetches logs for `kind` within `range`, optionally restricted to an
    /// acting address via the event's first indexed topic.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ChunkFetchFailed`] carrying the failed range
    /// when the query fails after the provider wrapper's retries.
    pub async fn fetch(
        &self,
        kind: EventKind,
        range: RangeInclusive<u64>,
        actor: Option<Address>,
    ) -> Result<Vec<Log>, HistoryError> {
        let filter =
            kind.filter(self.contract, actor).from_block(*range.start()).to_block(*range.end());

        debug!(
            event = %kind,
            from_block = range.start(),
            to_block = range.end(),
            "fetching logs"
        );

        self.provider
            .get_logs(&filter)
            .await
            .map_err(|e| HistoryError::ChunkFetchFailed { range, cause: Arc::new(e) })
    }
}
