//! Backfill orchestration against a mocked provider.
//!
//! Queued responses follow the orchestrator's deterministic call order: one
//! chain-head query, then per chunk one log query per watched event kind
//! (purchases, batch purchases, cycle completions, referral bonuses,
//! withdrawals). Timestamps are resolved inline as each kind's logs are
//! processed, so a block lookup is queued directly after the log batch that
//! references it, before the next kind's query.

mod common;

use alloy::{primitives::U256, transports::mock::Asserter};
use common::*;
use tx_history::{
    RecordKind, backfill,
    contract::{BalanceWithdrawn, BatchEntryPurchased, CycleCompleted, EntryPurchased},
};

#[tokio::test]
async fn reconstructs_history_over_the_lookback_window() -> anyhow::Result<()> {
    let asserter = Asserter::new();
    let fetcher = mocked_fetcher(asserter.clone());
    let timestamps = mocked_timestamps(asserter.clone());

    // head 5000, lookback 1000: one chunk covering [4000, 5000]
    push_head(&asserter, 5000);
    push_empty_logs(&asserter, 1);
    let batch = BatchEntryPurchased {
        user: USER,
        referrer: REFERRER,
        startId: U256::from(10),
        endId: U256::from(12),
        amount: units(45),
    };
    push_logs(&asserter, &[event_log(&batch, 4500, 0xfe, 0)]);
    push_block(&asserter, 4500, 1_700_000_000);
    push_empty_logs(&asserter, 3);

    let report = backfill(&fetcher, &timestamps, USER, 1000, 10_000).await?;

    assert!(report.is_complete());
    assert_eq!(report.records.len(), 1);

    let record = &report.records[0];
    assert_eq!(record.kind, RecordKind::Purchase);
    assert_eq!(record.amount, -45.0);
    assert_eq!(record.detail, "3 slots purchased");
    assert_eq!(record.block_number, 4500);
    assert_eq!(record.timestamp, 1_700_000_000);

    Ok(())
}

#[tokio::test]
async fn failed_chunk_is_reported_and_its_blocks_skipped() -> anyhow::Result<()> {
    let asserter = Asserter::new();
    let fetcher = mocked_fetcher(asserter.clone());
    let timestamps = mocked_timestamps(asserter.clone());

    // head 299, lookback 199, chunk width 100: chunks [100, 199] and [200, 299]
    push_head(&asserter, 299);

    // first log query of the first chunk fails; the whole chunk is skipped
    asserter.push_failure_msg("query exceeds provider limits");

    push_empty_logs(&asserter, 4);
    let withdrawal = BalanceWithdrawn { user: USER, amount: units(50) };
    push_logs(&asserter, &[event_log(&withdrawal, 250, 0xab, 7)]);
    push_block(&asserter, 250, 1_700_000_100);

    let report = backfill(&fetcher, &timestamps, USER, 199, 100).await?;

    assert!(!report.is_complete());
    assert_eq!(report.failed_ranges, vec![100..=199]);
    assert_eq!(report.records.len(), 1);
    assert!(report.records.iter().all(|record| record.block_number >= 200));

    Ok(())
}

#[tokio::test]
async fn unresolved_timestamp_drops_the_record() -> anyhow::Result<()> {
    let asserter = Asserter::new();
    let fetcher = mocked_fetcher(asserter.clone());
    let timestamps = mocked_timestamps(asserter.clone());

    push_head(&asserter, 10);
    let purchase = EntryPurchased {
        user: USER,
        referrer: REFERRER,
        entryId: U256::from(1),
        amount: units(15),
    };
    push_logs(&asserter, &[event_log(&purchase, 5, 0x01, 0)]);
    asserter.push_success(&serde_json::Value::Null);
    push_empty_logs(&asserter, 4);

    let report = backfill(&fetcher, &timestamps, USER, 10, 100).await?;

    assert!(report.records.is_empty());
    assert_eq!(report.dropped, 1);
    assert!(report.failed_ranges.is_empty());
    assert!(!report.is_complete());

    Ok(())
}

#[tokio::test]
async fn duplicate_observations_collapse_to_one_record() -> anyhow::Result<()> {
    let asserter = Asserter::new();
    let fetcher = mocked_fetcher(asserter.clone());
    let timestamps = mocked_timestamps(asserter.clone());

    push_head(&asserter, 10);
    push_empty_logs(&asserter, 4);
    let withdrawal = BalanceWithdrawn { user: USER, amount: units(50) };
    let log = event_log(&withdrawal, 5, 0xcd, 3);
    push_logs(&asserter, &[log.clone(), log]);
    push_block(&asserter, 5, 1_700_000_200);

    let report = backfill(&fetcher, &timestamps, USER, 10, 100).await?;

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.dropped, 0);
    assert!(report.is_complete());

    Ok(())
}

#[tokio::test]
async fn records_are_ordered_newest_first() -> anyhow::Result<()> {
    let asserter = Asserter::new();
    let fetcher = mocked_fetcher(asserter.clone());
    let timestamps = mocked_timestamps(asserter.clone());

    push_head(&asserter, 100);
    let purchase = EntryPurchased {
        user: USER,
        referrer: REFERRER,
        entryId: U256::from(3),
        amount: units(15),
    };
    push_logs(&asserter, &[event_log(&purchase, 20, 0x01, 0)]);
    push_block(&asserter, 20, 1_700_000_000);
    push_empty_logs(&asserter, 1);
    let cycle = CycleCompleted { user: USER, entryId: U256::from(3), profitPaid: units(30) };
    push_logs(&asserter, &[event_log(&cycle, 40, 0x02, 0)]);
    push_block(&asserter, 40, 1_700_000_500);
    push_empty_logs(&asserter, 2);

    let report = backfill(&fetcher, &timestamps, USER, 100, 1000).await?;

    assert_eq!(report.records.len(), 2);
    assert!(
        report
            .records
            .windows(2)
            .all(|pair| pair[0].timestamp >= pair[1].timestamp)
    );
    assert_eq!(report.records[0].kind, RecordKind::CycleCompletion);
    assert_eq!(report.records[1].kind, RecordKind::Purchase);

    Ok(())
}
