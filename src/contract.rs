//! Schema of the watched contract's events.
//!
//! The contract is treated as an opaque schema: named events with indexed
//! and unindexed arguments. Each recognized event carries an [`EventKind`]
//! tag, so downstream code dispatches on the tag instead of duck-typing the
//! argument bag.

use std::fmt::{self, Display};

use alloy::{
    primitives::{Address, B256},
    rpc::types::{Filter, Log},
    sol,
    sol_types::{self, SolEvent},
};

sol! {
    #[derive(Debug, PartialEq)]
    event EntryPurchased(address indexed user, address indexed referrer, uint256 entryId, uint256 amount);

    #[derive(Debug, PartialEq)]
    event BatchEntryPurchased(address indexed user, address indexed referrer, uint256 startId, uint256 endId, uint256 amount);

    #[derive(Debug, PartialEq)]
    event CycleCompleted(address indexed user, uint256 entryId, uint256 profitPaid);

    // "Refferer" is the contract's own spelling; the ABI is external.
    #[derive(Debug, PartialEq)]
    event ReffererBonusPaid(address indexed refferer, address indexed referred, uint256 amount);

    #[derive(Debug, PartialEq)]
    event BalanceWithdrawn(address indexed user, uint256 amount);
}

/// Closed set of recognized event kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Purchase,
    BatchPurchase,
    CycleCompletion,
    ReferralBonus,
    Withdrawal,
}

impl EventKind {
    /// Event kinds watched by the backfill and the live feed.
    pub const WATCHED: [EventKind; 5] = [
        EventKind::Purchase,
        EventKind::BatchPurchase,
        EventKind::CycleCompletion,
        EventKind::ReferralBonus,
        EventKind::Withdrawal,
    ];

    #[must_use]
    pub fn signature_hash(self) -> B256 {
        match self {
            EventKind::Purchase => EntryPurchased::SIGNATURE_HASH,
            EventKind::BatchPurchase => BatchEntryPurchased::SIGNATURE_HASH,
            EventKind::CycleCompletion => CycleCompleted::SIGNATURE_HASH,
            EventKind::ReferralBonus => ReffererBonusPaid::SIGNATURE_HASH,
            EventKind::Withdrawal => BalanceWithdrawn::SIGNATURE_HASH,
        }
    }

    /// Builds the log filter for this event kind.
    ///
    /// Every recognized event indexes the address acting from the user's
    /// perspective (buyer, entry owner, referrer, withdrawer) as its first
    /// topic, so an `actor` filter restricts results to that address.
    #[must_use]
    pub fn filter(self, contract: Address, actor: Option<Address>) -> Filter {
        let mut filter = Filter::new().address(contract).event_signature(self.signature_hash());
        if let Some(actor) = actor {
            filter = filter.topic1(actor.into_word());
        }
        filter
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            EventKind::Purchase => "purchase",
            EventKind::BatchPurchase => "batch-purchase",
            EventKind::CycleCompletion => "cycle-completion",
            EventKind::ReferralBonus => "referral-bonus",
            EventKind::Withdrawal => "withdrawal",
        };
        write!(f, "{tag}")
    }
}

/// A decoded, kind-tagged contract event.
#[derive(Debug, Clone, PartialEq)]
pub enum ContractEvent {
    Purchase(EntryPurchased),
    BatchPurchase(BatchEntryPurchased),
    CycleCompletion(CycleCompleted),
    ReferralBonus(ReffererBonusPaid),
    Withdrawal(BalanceWithdrawn),
}

impl ContractEvent {
    /// Decodes a raw log against the schema selected by `kind`.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the log's topics or data do not match the
    /// event's ABI shape.
    pub fn decode(kind: EventKind, log: &Log) -> Result<Self, sol_types::Error> {
        Ok(match kind {
            EventKind::Purchase => Self::Purchase(EntryPurchased::decode_log_data(log.data())?),
            EventKind::BatchPurchase => {
                Self::BatchPurchase(BatchEntryPurchased::decode_log_data(log.data())?)
            }
            EventKind::CycleCompletion => {
                Self::CycleCompletion(CycleCompleted::decode_log_data(log.data())?)
            }
            EventKind::ReferralBonus => {
                Self::ReferralBonus(ReffererBonusPaid::decode_log_data(log.data())?)
            }
            EventKind::Withdrawal => {
                Self::Withdrawal(BalanceWithdrawn::decode_log_data(log.data())?)
            }
        })
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ContractEvent::Purchase(_) => EventKind::Purchase,
            ContractEvent::BatchPurchase(_) => EventKind::BatchPurchase,
            ContractEvent::CycleCompletion(_) => EventKind::CycleCompletion,
            ContractEvent::ReferralBonus(_) => EventKind::ReferralBonus,
            ContractEvent::Withdrawal(_) => EventKind::Withdrawal,
        }
    }

    /// The address this event belongs to from the feed's perspective.
    #[must_use]
    pub fn actor(&self) -> Address {
        match self {
            ContractEvent::Purchase(ev) => ev.user,
            ContractEvent::BatchPurchase(ev) => ev.user,
            ContractEvent::CycleCompletion(ev) => ev.user,
            ContractEvent::ReferralBonus(ev) => ev.refferer,
            ContractEvent::Withdrawal(ev) => ev.user,
        }
    }
}
