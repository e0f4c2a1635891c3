//! Historical backfill over a bounded lookback window.
//!
//! One pass reconstructs an address's transaction history from raw logs:
//! query the chain head, walk the lookback window in provider-safe chunks,
//! fetch each watched event kind per chunk, normalize, deduplicate and sort.
//! A failed chunk never aborts the pass; it is recorded and the walk moves
//! on, so one flaky window costs at most its own blocks.

use std::{collections::HashSet, ops::RangeInclusive};

use alloy::{network::Network, primitives::Address};
use tracing::{info, warn};

use crate::{
    chunk::chunks,
    contract::{ContractEvent, EventKind},
    error::HistoryError,
    fetch::LogFetcher,
    normalize::normalize,
    record::{TxRecord, sort_newest_first},
    timestamp::BlockTimestampCache,
};

/// Default number of blocks of history reconstructed behind the chain head.
pub const DEFAULT_LOOKBACK_WINDOW: u64 = 100_000;
/// Default maximum width of a single `eth_getLogs` window.
pub const DEFAULT_MAX_CHUNK_WIDTH: u64 = 10_000;

/// Outcome of one backfill pass.
#[derive(Debug, Clone)]
pub struct BackfillReport {
    /// Deduplicated records, newest first.
    pub records: Vec<TxRecord>,
    /// Chunks whose log queries failed; their blocks are absent from
    /// `records` and history may be incomplete.
    pub failed_ranges: Vec<RangeInclusive<u64>>,
    /// Occurrences discarded because they could not be decoded or their
    /// block timestamp could not be resolved.
    pub dropped: usize,
}

impl BackfillReport {
    /// Whether the pass reconstructed the whole window without losses.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_ranges.is_empty() && self.dropped == 0
    }
}

/// Reconstructs `address`'s history over the last `lookback` blocks.
///
/// Chunks are processed sequentially. Within a chunk the watched event kinds
/// are fetched one by one, each filtered to the address's role in that
/// event; the first failed fetch marks the whole chunk as failed and the
/// walk continues with the next chunk. Records are timestamped with their
/// block's time, deduplicated by id and sorted newest first.
///
/// # Errors
///
/// Returns [`HistoryError::Rpc`] if the chain-head query fails. Chunk and
/// timestamp failures are not errors; they surface in the report.
pub async fn backfill<N: Network>(
    fetcher: &LogFetcher<N>,
    timestamps: &BlockTimestampCache<N>,
    address: Address,
    lookback: u64,
    max_chunk: u64,
) -> Result<BackfillReport, HistoryError> {
    let head = fetcher.head().await?;
    let from = head.saturating_sub(lookback);

    info!(%address, from_block = from, to_block = head, "starting history backfill");

    let mut records: Vec<TxRecord> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut failed_ranges: Vec<RangeInclusive<u64>> = Vec::new();
    let mut dropped = 0usize;

    'chunks: for range in chunks(from, head, max_chunk)? {
        for kind in EventKind::WATCHED {
            let logs = match fetcher.fetch(kind, range.clone(), Some(address)).await {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(
                        from_block = range.start(),
                        to_block = range.end(),
                        error = %e,
                        "chunk fetch failed, skipping its blocks"
                    );
                    failed_ranges.push(range.clone());
                    continue 'chunks;
                }
            };

            for log in logs {
                let event = match ContractEvent::decode(kind, &log) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(event = %kind, error = %e, "undecodable log dropped");
                        dropped += 1;
                        continue;
                    }
                };

                let Some(block_number) = log.block_number else {
                    warn!(event = %kind, "log without block number dropped");
                    dropped += 1;
                    continue;
                };

                let timestamp = match timestamps.resolve(block_number).await {
                    Ok(timestamp) => timestamp,
                    Err(e) => {
                        warn!(block_number, error = %e, "timestamp unresolved, record dropped");
                        dropped += 1;
                        continue;
                    }
                };

                let record = normalize(&event, &log, timestamp);
                if seen_ids.insert(record.id.clone()) {
                    records.push(record);
                }
            }
        }
    }

    sort_newest_first(&mut records);

    info!(
        %address,
        records = records.len(),
        failed_chunks = failed_ranges.len(),
        dropped,
        "backfill finished"
    );

    Ok(BackfillReport { records, failed_ranges, dropped })
}
