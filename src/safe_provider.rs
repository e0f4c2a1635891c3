//! Provider wrapper with built-in retry and timeout mechanisms.
//!
//! Every network round trip the history engine performs (chain-head query,
//! chunked log query, block-timestamp lookup, live log subscription) goes
//! through this wrapper, so transient provider errors get a bounded
//! exponential retry and no single call can hang a backfill indefinitely.

use std::{future::Future, time::Duration};

use alloy::{
    eips::BlockNumberOrTag,
    network::Network,
    providers::{Provider, RootProvider},
    pubsub::Subscription,
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportErrorKind},
};
use backon::{ExponentialBuilder, Retryable};
use tracing::{debug, error};

/// Default total timeout per provider call, retries included.
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(30);
/// Default maximum number of retry attempts.
pub const DEFAULT_MAX_RETRIES: usize = 5;
/// Default base delay between retries.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct SafeProvider<N: Network> {
    provider: RootProvider<N>,
    max_timeout: Duration,
    max_retries: usize,
    retry_interval: Duration,
}

impl<N: Network> SafeProvider<N> {
    #[must_use]
    pub fn new(provider: RootProvider<N>) -> Self {
        Self {
            provider,
            max_timeout: DEFAULT_MAX_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    #[must_use]
    pub fn max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Whether the underlying transport supports `eth_subscribe`.
    ///
    /// HTTP transports do not; the live feed is skipped for them.
    #[must_use]
    pub fn supports_subscriptions(&self) -> bool {
        self.provider.client().pubsub_frontend().is_some()
    }

    /// Fetch the current chain head with retry and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails repeatedly even after
    /// exhausting retries, or if the call times out.
    pub async fn get_block_number(&self) -> Result<u64, RpcError<TransportErrorKind>> {
        debug!("eth_blockNumber called");
        let operation = || self.provider.get_block_number();
        let result = self.retry_with_total_timeout(operation).await;
        if let Err(e) = &result {
            error!("eth_blockNumber failed: {e}");
        }
        result
    }

    /// Fetch a block by number with retry and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails repeatedly even after
    /// exhausting retries, or if the call times out.
    pub async fn get_block_by_number(
        &self,
        number: BlockNumberOrTag,
    ) -> Result<Option<N::BlockResponse>, RpcError<TransportErrorKind>> {
        debug!("eth_getBlockByNumber called");
        let provider = self.provider.clone();
        let result = self
            .retry_with_total_timeout(|| async { provider.get_block_by_number(number).await })
            .await;
        if let Err(e) = &result {
            error!("eth_getBlockByNumber failed: {e}");
        }
        result
    }

    /// Fetch logs for the given filter with retry and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails repeatedly even after
    /// exhausting retries, or if the call times out.
    pub async fn get_logs(
        &self,
        filter: &Filter,
    ) -> Result<Vec<Log>, RpcError<TransportErrorKind>> {
        debug!("eth_getLogs called");
        let provider = self.provider.clone();
        let result =
            self.retry_with_total_timeout(|| async { provider.get_logs(filter).await }).await;
        if let Err(e) = &result {
            error!("eth_getLogs failed: {e}");
        }
        result
    }

    /// Subscribe to logs matching `filter` with retry and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC call fails repeatedly even after
    /// exhausting retries, or if the call times out.
    pub async fn subscribe_logs(
        &self,
        filter: &Filter,
    ) -> Result<Subscription<Log>, RpcError<TransportErrorKind>> {
        debug!("eth_subscribe (logs) called");
        let provider = self.provider.clone();
        let result = self
            .retry_with_total_timeout(|| async { provider.subscribe_logs(filter).await })
            .await;
        if let Err(e) = &result {
            error!("eth_subscribe failed: {e}");
        }
        result
    }

    /// Execute `operation` with exponential backoff and a total timeout.
    ///
    /// The retry loop is wrapped in `tokio::time::timeout(self.max_timeout, ...)`
    /// so the entire operation, including time spent inside the RPC call,
    /// cannot exceed `max_timeout`.
    async fn retry_with_total_timeout<T, F, Fut>(
        &self,
        operation: F,
    ) -> Result<T, RpcError<TransportErrorKind>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let retry_strategy = ExponentialBuilder::default()
            .with_max_times(self.max_retries)
            .with_min_delay(self.retry_interval);

        match tokio::time::timeout(
            self.max_timeout,
            operation.retry(retry_strategy).sleep(tokio::time::sleep),
        )
        .await
        {
            Ok(res) => res,
            Err(_) => Err(TransportErrorKind::custom_str("total operation timeout exceeded")),
        }
    }
}
