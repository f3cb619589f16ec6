// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cached, ordered snapshots of materialized domains.
//!
//! Every registered domain is backed by a [`View`] which loads all of its rows from the table
//! store. Refreshing a domain replaces its snapshot, the previous snapshot is kept when loading
//! fails.
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::RwLock;
use std::time::Duration;

use agora_core::{Domain, Record, Row};
use agora_store::{StoreError, TableStore};
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, TryStreamExt};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::event::Event;

/// Loads all rows of one domain from the store.
pub trait View<S: TableStore>: Send + Sync {
    fn load(&self, store: &S) -> BoxFuture<'static, Result<Vec<Row>, StoreError>>;
}

/// View over every record of one table.
pub struct TableView<R>(PhantomData<fn() -> R>);

impl<R> TableView<R> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<R> Default for TableView<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, R> View<S> for TableView<R>
where
    S: TableStore,
    R: Record + Into<Row>,
{
    fn load(&self, store: &S) -> BoxFuture<'static, Result<Vec<Row>, StoreError>> {
        store
            .find::<R>()
            .map_ok(|record: R| -> Row { record.into() })
            .try_collect::<Vec<Row>>()
            .boxed()
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    rows: Vec<Row>,
    refreshed_at: Option<Instant>,
}

impl Snapshot {
    fn ids(&self) -> BTreeSet<String> {
        self.rows.iter().map(Row::id).collect()
    }
}

pub struct ViewCache<S: TableStore> {
    store: S,
    views: BTreeMap<Domain, Box<dyn View<S>>>,
    snapshots: RwLock<BTreeMap<Domain, Snapshot>>,
    events: broadcast::Sender<Event>,
}

impl<S: TableStore> ViewCache<S> {
    pub fn new(store: S, events: broadcast::Sender<Event>) -> Self {
        Self {
            store,
            views: BTreeMap::new(),
            snapshots: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    /// Cache the given domain, loading its rows with the view.
    pub fn register<V: View<S> + 'static>(&mut self, domain: Domain, view: V) -> &mut Self {
        self.views.insert(domain, Box::new(view));
        self
    }

    /// Cache the given domain as all records of one table.
    pub fn register_table<R: Record + Into<Row>>(&mut self, domain: Domain) -> &mut Self {
        self.register(domain, TableView::<R>::new())
    }

    /// All cached domains.
    pub fn domains(&self) -> Vec<Domain> {
        self.views.keys().copied().collect()
    }

    pub fn is_cached(&self, domain: Domain) -> bool {
        self.views.contains_key(&domain)
    }

    /// Current rows of a domain or `None` if it is not cached.
    pub fn rows(&self, domain: Domain) -> Option<Vec<Row>> {
        if !self.is_cached(domain) {
            return None;
        }
        let snapshots = self.snapshots.read().expect("acquire read access on cache");
        Some(
            snapshots
                .get(&domain)
                .map(|snapshot| snapshot.rows.clone())
                .unwrap_or_default(),
        )
    }

    /// Current records of a domain converted into their concrete type.
    pub fn records<R>(&self, domain: Domain) -> Vec<R>
    where
        R: TryFrom<Row>,
    {
        self.rows(domain)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| R::try_from(row).ok())
            .collect()
    }

    /// Reload the rows of a domain from the store.
    ///
    /// Returns the new rows, or `None` if the domain is not cached. On failure the previous rows
    /// are kept and an [`Event::Error`] is emitted.
    pub async fn refresh(&self, domain: Domain) -> Result<Option<Vec<Row>>, StoreError> {
        let Some(view) = self.views.get(&domain) else {
            return Ok(None);
        };

        let mut rows = match view.load(&self.store).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(%domain, %err, "failed refreshing view, keeping cached rows");
                let _ = self
                    .events
                    .send(Event::Error(format!("failed refreshing {domain}: {err}")));
                return Err(err);
            }
        };
        rows.sort_by_key(Row::order_key);

        let mut snapshots = self.snapshots.write().expect("acquire write access on cache");
        let snapshot = snapshots.entry(domain).or_default();
        snapshot.rows = rows.clone();
        snapshot.refreshed_at = Some(Instant::now());
        trace!(%domain, rows = rows.len(), "refreshed view");

        Ok(Some(rows))
    }

    /// Refresh a domain and emit [`Event::Updated`] if its set of ids changed.
    ///
    /// Returns true if an event was emitted.
    pub async fn diff_and_emit(&self, domain: Domain) -> bool {
        let (before_ids, before_len) = {
            let snapshots = self.snapshots.read().expect("acquire read access on cache");
            snapshots
                .get(&domain)
                .map(|snapshot| (snapshot.ids(), snapshot.rows.len()))
                .unwrap_or_default()
        };

        let Ok(Some(rows)) = self.refresh(domain).await else {
            return false;
        };

        let after_ids: BTreeSet<String> = rows.iter().map(Row::id).collect();
        if after_ids == before_ids && rows.len() == before_len {
            return false;
        }

        let _ = self.events.send(Event::Updated {
            domain,
            rows: Some(rows),
        });
        true
    }

    /// Cached domains which were not refreshed within `max_age`.
    pub fn stale_domains(&self, max_age: Duration) -> Vec<Domain> {
        let snapshots = self.snapshots.read().expect("acquire read access on cache");
        self.views
            .keys()
            .filter(|domain| {
                snapshots
                    .get(domain)
                    .and_then(|snapshot| snapshot.refreshed_at)
                    .is_none_or(|refreshed_at| refreshed_at.elapsed() >= max_age)
            })
            .copied()
            .collect()
    }
}
