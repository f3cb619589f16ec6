// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic re-check of cached views.
//!
//! Views are refreshed by the reducer whenever a batch touches them. The reconciler additionally
//! re-loads every cached domain which was not refreshed within the last interval and emits an
//! update when its rows changed. This catches state which was changed outside of the reducer.
use std::sync::Arc;
use std::time::Duration;

use agora_core::Domain;
use agora_store::TableStore;
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::cache::ViewCache;
use crate::event::Event;

/// Default interval of the reconciliation timer.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(4);

pub struct Reconciler<S: TableStore> {
    cache: Arc<ViewCache<S>>,
    events: broadcast::Sender<Event>,
    interval: Duration,
}

impl<S: TableStore> Reconciler<S> {
    pub fn new(
        cache: Arc<ViewCache<S>>,
        events: broadcast::Sender<Event>,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            events,
            interval,
        }
    }

    /// Run the timer on a separate task until the token gets cancelled.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }

    async fn run(self, token: CancellationToken) {
        let mut ticks = interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately, views were just loaded at that point.
        ticks.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!("reconciler received shutdown signal");
                    break;
                }
                _ = ticks.tick() => {
                    self.reconcile().await;
                }
            }
        }
    }

    /// Refresh and diff all stale domains, returns the domains which were checked.
    pub async fn reconcile(&self) -> Vec<Domain> {
        let stale = self.cache.stale_domains(self.interval);
        if stale.is_empty() {
            return stale;
        }

        trace!(domains = ?stale, "reconcile stale views");
        join_all(stale.iter().map(|domain| self.cache.diff_and_emit(*domain))).await;
        let _ = self.events.send(Event::PeriodicUpdate {
            domains: stale.clone(),
        });
        stale
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use agora_core::Domain;
    use agora_core::model::Category;
    use agora_store::{MemoryStore, TableStore, Transaction};
    use tokio::sync::broadcast;
    use tokio_util::sync::CancellationToken;

    use crate::cache::ViewCache;
    use crate::event::Event;

    use super::Reconciler;

    #[tokio::test(start_paused = true)]
    async fn picks_up_changes_outside_reducer() {
        let store = MemoryStore::new();
        let (events, mut rx) = broadcast::channel(16);
        let mut cache = ViewCache::new(store.clone(), events.clone());
        cache.register_table::<Category>(Domain::Categories);
        let cache = Arc::new(cache);
        cache.refresh(Domain::Categories).await.unwrap();

        let token = CancellationToken::new();
        let handle =
            Reconciler::new(cache.clone(), events, Duration::from_secs(4)).spawn(token.clone());

        // Written directly to the store, the reducer never sees it.
        let mut tx = store.transaction();
        tx.insert(&Category {
            id: "c1".into(),
            room_id: "garden".into(),
            name: "Chat".into(),
            position: 0,
        })
        .await
        .unwrap();
        tx.flush().await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;

        let Event::Updated { domain, rows } = rx.recv().await.unwrap() else {
            panic!("expected updated event");
        };
        assert_eq!(domain, Domain::Categories);
        assert_eq!(rows.unwrap().len(), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            Event::PeriodicUpdate {
                domains: vec![Domain::Categories]
            }
        );

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_domains_are_skipped() {
        let store = MemoryStore::new();
        let (events, _rx) = broadcast::channel(16);
        let mut cache = ViewCache::new(store.clone(), events.clone());
        cache.register_table::<Category>(Domain::Categories);
        let cache = Arc::new(cache);

        let reconciler = Reconciler::new(cache.clone(), events, Duration::from_secs(4));
        assert_eq!(reconciler.reconcile().await, vec![Domain::Categories]);

        // Just refreshed by the previous run.
        assert!(reconciler.reconcile().await.is_empty());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(reconciler.reconcile().await, vec![Domain::Categories]);
    }
}
