use std::error::Error;

/// Message delivered to feed update subscribers.
#[derive(Debug, Clone)]
pub enum FeedMessage<T: Clone, E: Error + Clone> {
    Data(T),
    Status(FeedStatus),
    Error(E),
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    /// A history backfill for the watched address has started; the feed is
    /// loading and may be empty or partial until it completes.
    BackfillStarted,
    /// The backfill finished. `complete` is false when one or more block
    /// ranges could not be fetched and history may be incomplete.
    BackfillCompleted { complete: bool },
}
