// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-log engine tying the log, the reducer, the view cache and the reconciler together.
use std::sync::Arc;
use std::time::Duration;

use agora_core::CommandTable;
use agora_core::command::CommandError;
use agora_store::{Batches, Log, LogError, SeqNum, TableStore};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::ViewCache;
use crate::event::Event;
use crate::reconcile::{DEFAULT_RECONCILE_INTERVAL, Reconciler};
use crate::reducer::Reducer;
use crate::router::Router;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Configuration parameters for an engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Interval of the view reconciliation timer, `None` disables the timer.
    ///
    /// Default is 4 seconds.
    pub reconcile_interval: Option<Duration>,

    /// Number of events buffered for slow subscribers before they start lagging behind.
    ///
    /// Default is 256.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Some(DEFAULT_RECONCILE_INTERVAL),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("engine was closed before the entry got applied")]
    Closed,
}

struct EngineInner<L, S: TableStore> {
    log: Arc<L>,
    store: S,
    cache: Arc<ViewCache<S>>,
    table: CommandTable,
    events: broadcast::Sender<Event>,
    applied: watch::Receiver<u64>,
    writable: watch::Receiver<bool>,
    reconciler: CancellationToken,
    shutdown: CancellationToken,
}

/// Handle to the engine materializing one log.
///
/// The engine applies every batch delivered by the log on its own task, strictly one after
/// another. Handles are cheap to clone, all clones refer to the same engine.
pub struct Engine<L, S: TableStore> {
    inner: Arc<EngineInner<L, S>>,
}

impl<L, S: TableStore> Clone for Engine<L, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L, S> Engine<L, S>
where
    L: Log,
    S: TableStore,
{
    /// Builder for the events channel, the same sender must be used for the view cache.
    pub fn events_channel(config: &EngineConfig) -> broadcast::Sender<Event> {
        broadcast::channel(config.event_capacity).0
    }

    /// Start applying batches of the log.
    pub fn spawn(
        log: L,
        batches: Batches,
        store: S,
        router: Router<S>,
        cache: ViewCache<S>,
        events: broadcast::Sender<Event>,
        config: EngineConfig,
    ) -> Self {
        let log = Arc::new(log);
        let cache = Arc::new(cache);
        let table = router.table().clone();

        let (applied_tx, applied_rx) = watch::channel(0);
        let (writable_tx, writable_rx) = watch::channel(log.is_writable());
        let shutdown = CancellationToken::new();
        let reconciler = shutdown.child_token();

        let reducer = Reducer::new(store.clone(), router, cache.clone(), events.clone());
        tokio::spawn(run(
            log.clone(),
            batches,
            reducer,
            applied_tx,
            writable_tx,
            shutdown.clone(),
        ));

        if let Some(interval) = config.reconcile_interval {
            Reconciler::new(cache.clone(), events.clone(), interval).spawn(reconciler.clone());
        }

        Self {
            inner: Arc::new(EngineInner {
                log,
                store,
                cache,
                table,
                events,
                applied: applied_rx,
                writable: writable_rx,
                reconciler,
                shutdown,
            }),
        }
    }

    pub fn log(&self) -> &L {
        &self.inner.log
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn cache(&self) -> &ViewCache<S> {
        &self.inner.cache
    }

    /// Encode a command, append it to the log and wait until it was applied locally.
    pub async fn append<T: Serialize>(&self, name: &str, payload: &T) -> Result<SeqNum, EngineError> {
        let bytes = self.inner.table.encode(name, payload)?;
        self.append_bytes(bytes).await
    }

    /// Append raw entry bytes and wait until they were applied locally.
    pub async fn append_bytes(&self, bytes: Vec<u8>) -> Result<SeqNum, EngineError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::Closed);
        }
        let seq = self.inner.log.append(bytes).await?;
        self.wait_applied(seq).await?;
        Ok(seq)
    }

    /// Wait until the entry with the given sequence number was applied.
    pub async fn wait_applied(&self, seq: SeqNum) -> Result<(), EngineError> {
        let mut applied = self.inner.applied.clone();
        applied
            .wait_for(|applied| *applied > seq)
            .await
            .map_err(|_| EngineError::Closed)?;
        Ok(())
    }

    /// Number of log entries applied so far.
    pub fn applied(&self) -> u64 {
        *self.inner.applied.borrow()
    }

    pub fn is_writable(&self) -> bool {
        *self.inner.writable.borrow()
    }

    /// Writability of the local replica, updated after every applied batch.
    pub fn writable(&self) -> watch::Receiver<bool> {
        self.inner.writable.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    pub fn stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.subscribe())
    }

    /// Emit a local event to all subscribers.
    pub fn emit(&self, event: Event) {
        let _ = self.inner.events.send(event);
    }

    pub fn events(&self) -> &broadcast::Sender<Event> {
        &self.inner.events
    }

    /// Refresh all cached views and emit their current rows.
    pub async fn update(&self) {
        let domains = self.inner.cache.domains();
        for domain in &domains {
            match self.inner.cache.refresh(*domain).await {
                Ok(rows) => self.emit(Event::Updated {
                    domain: *domain,
                    rows,
                }),
                Err(err) => warn!(%domain, %err, "failed refreshing view"),
            }
        }
        self.emit(Event::Update);
        self.emit(Event::UpdateComplete { domains });
    }

    pub fn stop_reconciler(&self) {
        self.inner.reconciler.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop the reconciler, the batch loop and finally the log.
    pub async fn close(&self) {
        if self.is_closed() {
            return;
        }
        self.stop_reconciler();
        self.inner.shutdown.cancel();
        self.inner.log.close().await;
        debug!(key = %self.inner.log.key(), "engine closed");
    }
}

async fn run<L, S>(
    log: Arc<L>,
    mut batches: Batches,
    mut reducer: Reducer<S>,
    applied: watch::Sender<u64>,
    writable: watch::Sender<bool>,
    token: CancellationToken,
) where
    L: Log,
    S: TableStore,
{
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,
            batch = batches.recv() => {
                let Some(batch) = batch else {
                    break;
                };
                let Some(next) = batch.last().map(|entry| entry.seq + 1) else {
                    continue;
                };
                reducer.apply(batch, &*log).await;
                writable.send_replace(log.is_writable());
                applied.send_replace(next);
            }
        }
    }

    debug!(key = %log.key(), "stopped applying batches");
}
