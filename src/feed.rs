//! Live transaction feed with history backfill.
//!
//! The feed is a command-channel service: a single spawned task owns all
//! feed state and every mutation (watch, live ingest, backfill completion)
//! arrives as a command on its channel, so ordering and deduplication need
//! no locks. Watching an address kicks off a backfill task; while it runs,
//! live logs keep flowing in, and the completed backfill merges around them
//! instead of overwriting. Each backfill carries the generation it was
//! started under, and results from a superseded generation are discarded.

use std::{
    collections::HashSet,
    ops::RangeInclusive,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use alloy::{
    network::Network,
    primitives::Address,
    providers::RootProvider,
    rpc::{client::ClientBuilder, types::Log},
    transports::{TransportResult, http::reqwest::Url, ws::WsConnect},
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{debug, error, info, warn};

use crate::{
    backfill::{BackfillReport, DEFAULT_LOOKBACK_WINDOW, DEFAULT_MAX_CHUNK_WIDTH, backfill},
    contract::{ContractEvent, EventKind},
    error::HistoryError,
    fetch::LogFetcher,
    normalize::normalize,
    record::{TxRecord, sort_newest_first},
    safe_provider::SafeProvider,
    timestamp::BlockTimestampCache,
    types::{FeedMessage, FeedStatus},
};

pub const MAX_BUFFERED_MESSAGES: usize = 50000;

pub type FeedUpdate = FeedMessage<TxRecord, HistoryError>;

/// Read-only view of the feed state at one instant.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    /// Ordered records, newest first.
    pub records: Vec<TxRecord>,
    /// True while a backfill for the watched address is in flight.
    pub is_loading: bool,
    /// True when the last backfill lost chunks or records.
    pub incomplete: bool,
    /// Block ranges the last backfill could not fetch.
    pub failed_ranges: Vec<RangeInclusive<u64>>,
    pub last_error: Option<HistoryError>,
}

/// Builder for a transaction feed over one contract.
#[derive(Debug, Clone)]
pub struct TransactionFeed {
    contract: Address,
    lookback: u64,
    max_chunk_width: u64,
}

impl TransactionFeed {
    #[must_use]
    pub fn new(contract: Address) -> Self {
        Self {
            contract,
            lookback: DEFAULT_LOOKBACK_WINDOW,
            max_chunk_width: DEFAULT_MAX_CHUNK_WIDTH,
        }
    }

    /// Number of blocks of history reconstructed behind the chain head.
    #[must_use]
    pub fn with_lookback(mut self, blocks: u64) -> Self {
        self.lookback = blocks;
        self
    }

    /// Maximum width of a single log query window.
    #[must_use]
    pub fn with_max_chunk_width(mut self, blocks: u64) -> Self {
        self.max_chunk_width = blocks;
        self
    }

    /// Connects to the provider via WebSocket.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect_ws<N: Network>(
        self,
        ws_url: Url,
    ) -> TransportResult<ConnectedTransactionFeed<N>> {
        let provider =
            RootProvider::<N>::new(ClientBuilder::default().ws(WsConnect::new(ws_url)).await?);
        Ok(self.connect(provider))
    }

    /// Connects to the provider via IPC.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect_ipc<N: Network>(
        self,
        ipc_path: String,
    ) -> TransportResult<ConnectedTransactionFeed<N>> {
        let provider = RootProvider::<N>::new(ClientBuilder::default().ipc(ipc_path.into()).await?);
        Ok(self.connect(provider))
    }

    /// Uses an existing provider.
    #[must_use]
    pub fn connect<N: Network>(self, provider: RootProvider<N>) -> ConnectedTransactionFeed<N> {
        self.connect_with(SafeProvider::new(provider))
    }

    /// Uses an existing wrapped provider, keeping its retry configuration.
    #[must_use]
    pub fn connect_with<N: Network>(self, provider: SafeProvider<N>) -> ConnectedTransactionFeed<N> {
        let timestamps = Arc::new(BlockTimestampCache::new(provider.clone()));
        ConnectedTransactionFeed {
            fetcher: LogFetcher::new(provider, self.contract),
            timestamps,
            lookback: self.lookback,
            max_chunk_width: self.max_chunk_width,
        }
    }
}

pub struct ConnectedTransactionFeed<N: Network> {
    fetcher: LogFetcher<N>,
    timestamps: Arc<BlockTimestampCache<N>>,
    lookback: u64,
    max_chunk_width: u64,
}

impl<N: Network> ConnectedTransactionFeed<N> {
    /// Shares a timestamp cache with other feeds instead of the private one.
    #[must_use]
    pub fn with_timestamp_cache(mut self, cache: Arc<BlockTimestampCache<N>>) -> Self {
        self.timestamps = cache;
        self
    }

    /// Starts the feed service and returns a client for sending commands.
    ///
    /// When the transport supports subscriptions, one live log subscription
    /// per watched event kind is spawned and fanned into the service. Over
    /// plain HTTP the feed still backfills but receives no live events.
    #[must_use]
    pub fn run(self) -> TransactionFeedClient {
        let (service, cmd_tx) = Service::new(
            self.fetcher.clone(),
            Arc::clone(&self.timestamps),
            self.lookback,
            self.max_chunk_width,
        );
        tokio::spawn(async move {
            service.run().await;
        });

        if self.fetcher.provider().supports_subscriptions() {
            for kind in EventKind::WATCHED {
                let fetcher = self.fetcher.clone();
                let cmd_tx = cmd_tx.clone();
                tokio::spawn(async move {
                    stream_live_logs(fetcher, kind, cmd_tx).await;
                });
            }
        } else {
            debug!("transport has no pubsub support, live events disabled");
        }

        TransactionFeedClient::new(cmd_tx)
    }
}

/// Forwards live logs for one event kind into the service until either side
/// goes away.
async fn stream_live_logs<N: Network>(
    fetcher: LogFetcher<N>,
    kind: EventKind,
    cmd_tx: mpsc::Sender<Command>,
) {
    let filter = kind.filter(fetcher.contract(), None);
    let subscription = match fetcher.provider().subscribe_logs(&filter).await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!(event = %kind, error = %e, "log subscription failed");
            return;
        }
    };

    info!(event = %kind, "live log subscription established");

    let mut stream = subscription.into_stream();
    while let Some(log) = stream.next().await {
        if cmd_tx.send(Command::Ingest { kind, log }).await.is_err() {
            debug!(event = %kind, "feed service gone, stopping live stream");
            return;
        }
    }

    warn!(event = %kind, "live log subscription ended");
}

enum Command {
    Watch { address: Address, response: oneshot::Sender<()> },
    Ingest { kind: EventKind, log: Log },
    Snapshot { response: oneshot::Sender<FeedSnapshot> },
    Updates { sender: mpsc::Sender<FeedUpdate>, response: oneshot::Sender<()> },
    ApplyBackfill { generation: u64, outcome: Result<BackfillReport, HistoryError> },
    Shutdown { response: oneshot::Sender<()> },
}

struct Service<N: Network> {
    fetcher: LogFetcher<N>,
    timestamps: Arc<BlockTimestampCache<N>>,
    lookback: u64,
    max_chunk_width: u64,
    command_receiver: mpsc::Receiver<Command>,
    command_sender: mpsc::Sender<Command>,
    subscribers: Vec<mpsc::Sender<FeedUpdate>>,
    watched: Option<Address>,
    generation: u64,
    records: Vec<TxRecord>,
    seen_ids: HashSet<String>,
    is_loading: bool,
    incomplete: bool,
    failed_ranges: Vec<RangeInclusive<u64>>,
    last_error: Option<HistoryError>,
    backfill_task: Option<JoinHandle<()>>,
}

impl<N: Network> Service<N> {
    fn new(
        fetcher: LogFetcher<N>,
        timestamps: Arc<BlockTimestampCache<N>>,
        lookback: u64,
        max_chunk_width: u64,
    ) -> (Self, mpsc::Sender<Command>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(MAX_BUFFERED_MESSAGES);

        let service = Self {
            fetcher,
            timestamps,
            lookback,
            max_chunk_width,
            command_receiver: cmd_rx,
            command_sender: cmd_tx.clone(),
            subscribers: Vec::new(),
            watched: None,
            generation: 0,
            records: Vec::new(),
            seen_ids: HashSet::new(),
            is_loading: false,
            incomplete: false,
            failed_ranges: Vec::new(),
            last_error: None,
            backfill_task: None,
        };

        (service, cmd_tx)
    }

    async fn run(mut self) {
        info!("starting transaction feed service");

        while let Some(command) = self.command_receiver.recv().await {
            match command {
                Command::Watch { address, response } => {
                    self.handle_watch(address);
                    let _ = response.send(());
                }
                Command::Ingest { kind, log } => self.handle_ingest(kind, &log),
                Command::Snapshot { response } => {
                    let _ = response.send(self.snapshot());
                }
                Command::Updates { sender, response } => {
                    self.subscribers.push(sender);
                    let _ = response.send(());
                }
                Command::ApplyBackfill { generation, outcome } => {
                    self.handle_apply_backfill(generation, outcome);
                }
                Command::Shutdown { response } => {
                    let _ = response.send(());
                    break;
                }
            }
        }

        if let Some(task) = self.backfill_task.take() {
            task.abort();
        }
        info!("transaction feed service stopped");
    }

    fn handle_watch(&mut self, address: Address) {
        info!(%address, "watching address");

        // Supersede any in-flight backfill. Aborting is advisory; the
        // generation check discards a result that slips through.
        self.generation += 1;
        if let Some(task) = self.backfill_task.take() {
            task.abort();
        }

        self.watched = Some(address);
        self.records.clear();
        self.seen_ids.clear();
        self.failed_ranges.clear();
        self.incomplete = false;
        self.last_error = None;
        self.is_loading = true;

        self.broadcast(FeedMessage::Status(FeedStatus::BackfillStarted));

        let fetcher = self.fetcher.clone();
        let timestamps = Arc::clone(&self.timestamps);
        let lookback = self.lookback;
        let max_chunk = self.max_chunk_width;
        let generation = self.generation;
        let cmd_tx = self.command_sender.clone();

        self.backfill_task = Some(tokio::spawn(async move {
            let outcome = backfill(&fetcher, &timestamps, address, lookback, max_chunk).await;
            let _ = cmd_tx.send(Command::ApplyBackfill { generation, outcome }).await;
        }));
    }

    fn handle_ingest(&mut self, kind: EventKind, log: &Log) {
        let Some(watched) = self.watched else {
            return;
        };

        let event = match ContractEvent::decode(kind, log) {
            Ok(event) => event,
            Err(e) => {
                warn!(event = %kind, error = %e, "undecodable live log ignored");
                return;
            }
        };

        if event.actor() != watched {
            return;
        }

        // Live records carry observation time; block time is not resolved
        // on this path to keep ingestion synchronous.
        let record = normalize(&event, log, unix_now());
        self.insert(record);
    }

    fn handle_apply_backfill(
        &mut self,
        generation: u64,
        outcome: Result<BackfillReport, HistoryError>,
    ) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "stale backfill result discarded");
            return;
        }

        self.is_loading = false;
        self.backfill_task = None;

        match outcome {
            Ok(report) => {
                let complete = report.is_complete();
                self.incomplete = !complete;
                self.failed_ranges = report.failed_ranges;

                // Merge around records that arrived live while the backfill
                // ran; the backfill never replaces them.
                for record in report.records {
                    self.insert(record);
                }

                info!(
                    records = self.records.len(),
                    complete,
                    "backfill applied"
                );
                self.broadcast(FeedMessage::Status(FeedStatus::BackfillCompleted { complete }));
            }
            Err(e) => {
                error!(error = %e, "backfill failed");
                self.incomplete = true;
                self.last_error = Some(e.clone());
                self.broadcast(FeedMessage::Error(e));
                self.broadcast(FeedMessage::Status(FeedStatus::BackfillCompleted {
                    complete: false,
                }));
            }
        }
    }

    /// Inserts a record unless its id is already present, keeping the feed
    /// ordered. Redelivery of the same occurrence is a no-op.
    fn insert(&mut self, record: TxRecord) {
        if !self.seen_ids.insert(record.id.clone()) {
            return;
        }
        self.records.push(record.clone());
        sort_newest_first(&mut self.records);
        self.broadcast(FeedMessage::Data(record));
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            records: self.records.clone(),
            is_loading: self.is_loading,
            incomplete: self.incomplete,
            failed_ranges: self.failed_ranges.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn broadcast(&mut self, message: FeedUpdate) {
        self.subscribers.retain(|subscriber| match subscriber.try_send(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("dropping slow feed subscriber");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

/// Handle for sending commands to a running feed service.
#[derive(Clone)]
pub struct TransactionFeedClient {
    command_sender: mpsc::Sender<Command>,
}

impl TransactionFeedClient {
    fn new(command_sender: mpsc::Sender<Command>) -> Self {
        Self { command_sender }
    }

    /// Switches the feed to `address`: clears current records, cancels any
    /// in-flight backfill and starts a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ServiceShutdown`] if the service is gone.
    pub async fn watch(&self, address: Address) -> Result<(), HistoryError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_sender
            .send(Command::Watch { address, response: response_tx })
            .await
            .map_err(|_| HistoryError::ServiceShutdown)?;
        response_rx.await.map_err(|_| HistoryError::ServiceShutdown)
    }

    /// Feeds one observed log into the service.
    ///
    /// Logs for addresses other than the watched one, and redeliveries of
    /// occurrences already present, are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ServiceShutdown`] if the service is gone.
    pub async fn ingest(&self, kind: EventKind, log: Log) -> Result<(), HistoryError> {
        self.command_sender
            .send(Command::Ingest { kind, log })
            .await
            .map_err(|_| HistoryError::ServiceShutdown)
    }

    /// Current feed state.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ServiceShutdown`] if the service is gone.
    pub async fn snapshot(&self) -> Result<FeedSnapshot, HistoryError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_sender
            .send(Command::Snapshot { response: response_tx })
            .await
            .map_err(|_| HistoryError::ServiceShutdown)?;
        response_rx.await.map_err(|_| HistoryError::ServiceShutdown)
    }

    /// Subscribes to feed updates.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ServiceShutdown`] if the service is gone.
    pub async fn updates(&self) -> Result<ReceiverStream<FeedUpdate>, HistoryError> {
        let (update_tx, update_rx) = mpsc::channel(MAX_BUFFERED_MESSAGES);
        let (response_tx, response_rx) = oneshot::channel();
        self.command_sender
            .send(Command::Updates { sender: update_tx, response: response_tx })
            .await
            .map_err(|_| HistoryError::ServiceShutdown)?;
        response_rx.await.map_err(|_| HistoryError::ServiceShutdown)?;
        Ok(ReceiverStream::new(update_rx))
    }

    /// Stops the service.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::ServiceShutdown`] if the service is already
    /// gone.
    pub async fn shutdown(&self) -> Result<(), HistoryError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_sender
            .send(Command::Shutdown { response: response_tx })
            .await
            .map_err(|_| HistoryError::ServiceShutdown)?;
        response_rx.await.map_err(|_| HistoryError::ServiceShutdown)
    }
}
