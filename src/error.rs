use std::{ops::RangeInclusive, sync::Arc};

use alloy::transports::{RpcError, TransportErrorKind};
use thiserror::Error;

/// Errors produced while reconstructing transaction history.
///
/// Transport errors are `Arc`-wrapped so error values stay `Clone` when
/// fanned out to multiple feed subscribers.
#[derive(Error, Debug, Clone)]
pub enum HistoryError {
    /// Backfill bounds are inverted. Programmer error; never retried.
    #[error("invalid block range: from {from} is greater than to {to}")]
    InvalidRange { from: u64, to: u64 },

    /// A single chunk's log query failed. Recoverable: the orchestrator
    /// records the range and continues with the next chunk.
    #[error("fetching logs for blocks [{}, {}] failed: {cause}", .range.start(), .range.end())]
    ChunkFetchFailed { range: RangeInclusive<u64>, cause: Arc<RpcError<TransportErrorKind>> },

    /// A block timestamp lookup failed. Recoverable: the affected record is
    /// dropped from the backfill pass rather than sorted on a guess.
    #[error("resolving timestamp for block {block} failed: {cause}")]
    TimestampResolution { block: u64, cause: Arc<RpcError<TransportErrorKind>> },

    #[error("RPC error: {0}")]
    Rpc(Arc<RpcError<TransportErrorKind>>),

    #[error("feed service is shutting down")]
    ServiceShutdown,
}

impl From<RpcError<TransportErrorKind>> for HistoryError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        HistoryError::Rpc(Arc::new(error))
    }
}
