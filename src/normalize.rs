//! Reduction of decoded contract events to [`TxRecord`]s.
//!
//! Normalization is total: every decoded event yields a record. Amounts that
//! cannot be represented in display units degrade to `0.0` with a logged
//! warning instead of discarding the occurrence.

use alloy::{
    primitives::{
        U256,
        utils::{Unit, format_units},
    },
    rpc::types::Log,
};
use tracing::warn;

use crate::{
    contract::ContractEvent,
    record::{RecordKind, TxRecord},
};

/// Builds the normalized record for a decoded event.
///
/// `timestamp` is supplied by the caller: block time on the backfill path,
/// observation wall-clock time on the live path.
#[must_use]
pub fn normalize(event: &ContractEvent, log: &Log, timestamp: u64) -> TxRecord {
    let tx_hash = log.transaction_hash.unwrap_or_default();
    let id = |discriminator: &dyn std::fmt::Display| {
        format!("{tx_hash}:{}:{discriminator}", event.kind())
    };

    let (kind, amount, detail, counterparty) = match event {
        ContractEvent::Purchase(ev) => {
            (RecordKind::Purchase, -display_units(ev.amount), "1 slot purchased".to_owned(), None)
        }
        ContractEvent::BatchPurchase(ev) => {
            let slots = batch_slot_count(ev.startId, ev.endId);
            let detail = if slots == 1 {
                "1 slot purchased".to_owned()
            } else {
                format!("{slots} slots purchased")
            };
            (RecordKind::Purchase, -display_units(ev.amount), detail, None)
        }
        ContractEvent::CycleCompletion(ev) => (
            RecordKind::CycleCompletion,
            display_units(ev.profitPaid),
            format!("slot #{} completed", ev.entryId),
            None,
        ),
        ContractEvent::ReferralBonus(ev) => (
            RecordKind::ReferralBonus,
            display_units(ev.amount),
            format!("referral bonus from {}", ev.referred),
            Some(ev.referred),
        ),
        ContractEvent::Withdrawal(ev) => (
            RecordKind::Withdrawal,
            -display_units(ev.amount),
            "withdrawn to wallet".to_owned(),
            None,
        ),
    };

    let id = match event {
        ContractEvent::Purchase(ev) => id(&ev.entryId),
        ContractEvent::BatchPurchase(ev) => id(&ev.startId),
        ContractEvent::CycleCompletion(ev) => id(&ev.entryId),
        ContractEvent::ReferralBonus(ev) => id(&ev.referred),
        ContractEvent::Withdrawal(_) => id(&log.log_index.unwrap_or_default()),
    };

    TxRecord {
        id,
        kind,
        amount,
        detail,
        counterparty,
        tx_hash,
        block_number: log.block_number.unwrap_or_default(),
        timestamp,
    }
}

/// Number of slots covered by a batch purchase, `endId - startId + 1`.
///
/// An inverted id range from a misbehaving contract counts as a single slot
/// rather than wrapping.
fn batch_slot_count(start_id: U256, end_id: U256) -> u64 {
    end_id
        .checked_sub(start_id)
        .and_then(|width| u64::try_from(width).ok())
        .and_then(|width| width.checked_add(1))
        .unwrap_or(1)
}

/// Converts an 18-decimal fixed-point amount to display units.
fn display_units(value: U256) -> f64 {
    match format_units(value, Unit::ETHER.get()).map(|s| s.parse::<f64>()) {
        Ok(Ok(amount)) => amount,
        _ => {
            warn!(raw = %value, "amount not representable in display units, recording as 0");
            0.0
        }
    }
}
