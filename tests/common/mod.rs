#![allow(dead_code)]

use std::time::Duration;

use alloy::{
    network::Ethereum,
    primitives::{Address, B256, U256, address},
    providers::RootProvider,
    rpc::{
        client::RpcClient,
        types::{Block as RpcBlock, Header, Log, Transaction},
    },
    sol_types::SolEvent,
    transports::mock::Asserter,
};
use serde_json::json;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tx_history::{
    BlockTimestampCache, FeedMessage, FeedStatus, LogFetcher, SafeProvider, feed::FeedUpdate,
};

pub const CONTRACT: Address = address!("0x00000000000000000000000000000000000000aa");
pub const USER: Address = address!("0x1111111111111111111111111111111111111111");
pub const REFERRER: Address = address!("0x2222222222222222222222222222222222222222");
pub const OTHER: Address = address!("0x3333333333333333333333333333333333333333");

/// Whole display units in 18-decimal fixed point.
pub fn units(whole: u64) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(18))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Provider over a mocked transport. Retries are disabled so every queued
/// response is consumed exactly once.
pub fn mocked_provider(asserter: Asserter) -> SafeProvider<Ethereum> {
    init_tracing();
    let provider = RootProvider::<Ethereum>::new(RpcClient::mocked(asserter));
    SafeProvider::new(provider)
        .max_retries(0)
        .max_timeout(Duration::from_secs(1))
        .retry_interval(Duration::from_millis(1))
}

pub fn mocked_fetcher(asserter: Asserter) -> LogFetcher<Ethereum> {
    LogFetcher::new(mocked_provider(asserter), CONTRACT)
}

pub fn mocked_timestamps(asserter: Asserter) -> BlockTimestampCache<Ethereum> {
    BlockTimestampCache::new(mocked_provider(asserter))
}

pub fn push_head(asserter: &Asserter, head: u64) {
    asserter.push_success(&json!(format!("0x{head:x}")));
}

pub fn push_block(asserter: &Asserter, number: u64, timestamp: u64) {
    let mut block: RpcBlock<Transaction, Header> = RpcBlock::default();
    block.header.number = number;
    block.header.timestamp = timestamp;
    asserter.push_success(&block);
}

pub fn push_logs(asserter: &Asserter, logs: &[Log]) {
    asserter.push_success(&logs.to_vec());
}

pub fn push_empty_logs(asserter: &Asserter, count: usize) {
    for _ in 0..count {
        push_logs(asserter, &[]);
    }
}

/// Wraps an encoded event in an RPC log as a node would deliver it.
pub fn event_log(event: &impl SolEvent, block_number: u64, tx_seed: u8, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log { address: CONTRACT, data: event.encode_log_data() },
        block_number: Some(block_number),
        transaction_hash: Some(B256::repeat_byte(tx_seed)),
        log_index: Some(log_index),
        ..Default::default()
    }
}

/// Collects feed updates until the backfill-completed status arrives.
pub async fn drain_until_completed(updates: &mut ReceiverStream<FeedUpdate>) -> Vec<FeedUpdate> {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut seen = Vec::new();
        while let Some(message) = updates.next().await {
            let done =
                matches!(message, FeedMessage::Status(FeedStatus::BackfillCompleted { .. }));
            seen.push(message);
            if done {
                break;
            }
        }
        seen
    })
    .await
    .expect("timed out waiting for backfill completion")
}
