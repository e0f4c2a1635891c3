//! Event indexing and history reconstruction for a slot-purchase contract.
//!
//! Reconstructs a per-address transaction history from raw contract event
//! logs: a chunked backfill walks a bounded lookback window behind the chain
//! head while live log subscriptions keep the feed current, and both paths
//! merge into one deduplicated list ordered newest first.
//!
//! ## Example
//!
//! ```no_run
//! use alloy::{network::Ethereum, primitives::address};
//! use tokio_stream::StreamExt;
//! use tx_history::TransactionFeed;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TransactionFeed::new(address!("0x5FbDB2315678afecb367f032d93F642f64180aa3"))
//!     .with_lookback(100_000)
//!     .connect_ws::<Ethereum>("ws://localhost:8546".parse()?)
//!     .await?
//!     .run();
//!
//! client.watch(address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")).await?;
//!
//! let mut updates = client.updates().await?;
//! while let Some(update) = updates.next().await {
//!     println!("{update:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod backfill;
pub mod chunk;
pub mod contract;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod normalize;
pub mod record;
pub mod safe_provider;
pub mod timestamp;
pub mod types;

pub use backfill::{BackfillReport, DEFAULT_LOOKBACK_WINDOW, DEFAULT_MAX_CHUNK_WIDTH, backfill};
pub use chunk::{BlockChunks, chunks};
pub use contract::{ContractEvent, EventKind};
pub use error::HistoryError;
pub use feed::{
    ConnectedTransactionFeed, FeedSnapshot, FeedUpdate, TransactionFeed, TransactionFeedClient,
};
pub use fetch::LogFetcher;
pub use normalize::normalize;
pub use record::{RecordKind, TxRecord, sort_newest_first};
pub use safe_provider::SafeProvider;
pub use timestamp::BlockTimestampCache;
pub use types::{FeedMessage, FeedStatus};
