//! The normalized transaction record, the single shape every event kind is
//! reduced to before display or sorting.

use alloy::primitives::{Address, B256};
use serde::Serialize;

/// User-facing classification of a record.
///
/// Single and batch purchases both present as `Purchase`; the distinction
/// survives only in the record id and the detail text.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    Purchase,
    CycleCompletion,
    ReferralBonus,
    Withdrawal,
}

/// One row of reconstructed history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TxRecord {
    /// Stable identity: `txHash:eventTag:discriminator`. Two observations of
    /// the same on-chain occurrence always produce the same id.
    pub id: String,
    pub kind: RecordKind,
    /// Signed display-unit amount. Negative for money leaving the user's
    /// balance (purchases, withdrawals), positive for money arriving.
    pub amount: f64,
    /// Short human-readable description, e.g. "3 slots purchased".
    pub detail: String,
    /// The other address involved, when there is one (the referred user for
    /// referral bonuses).
    pub counterparty: Option<Address>,
    pub tx_hash: B256,
    pub block_number: u64,
    /// UNIX seconds. Block time for backfilled records, observation time for
    /// live ones.
    pub timestamp: u64,
}

/// Sorts records newest first.
///
/// The sort is stable so records sharing a timestamp keep their relative
/// arrival order.
pub fn sort_newest_first(records: &mut [TxRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}
