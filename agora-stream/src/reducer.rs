// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sequential application of log batches to the table store.
use std::collections::BTreeSet;
use std::sync::Arc;

use agora_core::Domain;
use agora_store::{LogEntry, SeqNum, TableStore, Transaction, Writers};
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::cache::ViewCache;
use crate::event::Event;
use crate::router::{ApplyContext, Dispatched, Outcome, Router};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReducerState {
    #[default]
    Idle,
    Applying,
    Flushing,
}

/// Summary of one applied batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub rejected: usize,
    /// Entries which could not be decoded or failed inside their handler.
    pub skipped: usize,
    pub domains: BTreeSet<Domain>,
    pub last_seq: Option<SeqNum>,
}

/// Applies ordered batches of log entries and refreshes the views they touch.
///
/// Errors occurring while applying an entry never escape the reducer, the entry is logged and
/// skipped and the remaining batch is applied as usual.
pub struct Reducer<S: TableStore> {
    store: S,
    router: Router<S>,
    cache: Arc<ViewCache<S>>,
    events: broadcast::Sender<Event>,
    state: ReducerState,
}

impl<S: TableStore> Reducer<S> {
    pub fn new(
        store: S,
        router: Router<S>,
        cache: Arc<ViewCache<S>>,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            store,
            router,
            cache,
            events,
            state: ReducerState::Idle,
        }
    }

    pub fn state(&self) -> ReducerState {
        self.state
    }

    pub fn router(&self) -> &Router<S> {
        &self.router
    }

    pub async fn apply(&mut self, batch: Vec<LogEntry>, writers: &dyn Writers) -> ApplyReport {
        let mut report = ApplyReport::default();
        self.state = ReducerState::Applying;

        let mut tx = self.store.transaction();
        for entry in &batch {
            report.last_seq = Some(entry.seq);
            let mut cx = ApplyContext::<S> {
                tx: &mut tx,
                writers,
                seq: entry.seq,
                writer: entry.writer,
            };

            match self.router.dispatch(&entry.value, &mut cx).await {
                Ok(Dispatched {
                    spec,
                    outcome: Outcome::Applied,
                }) => {
                    debug!(seq = entry.seq, command = spec.name, "applied entry");
                    report.applied += 1;
                    report.domains.extend(spec.domains.iter().copied());
                    let _ = self.events.send(Event::Applied {
                        command: spec.name,
                        seq: entry.seq,
                    });
                }
                Ok(Dispatched {
                    spec,
                    outcome: Outcome::Rejected(reason),
                }) => {
                    warn!(seq = entry.seq, command = spec.name, %reason, "rejected entry");
                    report.rejected += 1;
                    let _ = self.events.send(Event::Rejected {
                        command: spec.name,
                        seq: entry.seq,
                        reason,
                    });
                }
                Err(err) => {
                    warn!(seq = entry.seq, %err, "skipped malformed entry");
                    report.skipped += 1;
                }
            }
        }

        self.state = ReducerState::Flushing;
        if let Err(err) = tx.flush().await {
            error!(%err, "failed flushing applied batch");
            let _ = self.events.send(Event::Error(err.to_string()));
        }

        if !report.domains.is_empty() {
            let refreshes = report
                .domains
                .iter()
                .map(|domain| self.cache.refresh(*domain));
            let refreshed = join_all(refreshes).await;

            // Failed refreshes already emitted an error and keep the previous rows.
            for (domain, rows) in report.domains.iter().zip(refreshed) {
                if let Ok(rows) = rows {
                    let _ = self.events.send(Event::Updated {
                        domain: *domain,
                        rows,
                    });
                }
            }
            let _ = self.events.send(Event::Update);
            let _ = self.events.send(Event::UpdateComplete {
                domains: report.domains.iter().copied().collect(),
            });
        }

        self.state = ReducerState::Idle;
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agora_core::command::{Command, CommandTable, room};
    use agora_core::model::{Category, Room, RoomKind};
    use agora_core::{Domain, EncryptionKey, Hash, PrivateKey, Row, Timestamp};
    use agora_store::{LogEntry, MemoryLogNetwork, MemoryStore, TableStore, Transaction};
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    use crate::cache::ViewCache;
    use crate::event::Event;
    use crate::handlers::Upsert;
    use crate::router::{ApplyContext, Handler, HandlerError, Outcome, Router};
    use crate::test_utils::setup_logging;

    use super::{Reducer, ReducerState};

    fn reducer(store: &MemoryStore) -> (Reducer<MemoryStore>, broadcast::Receiver<Event>) {
        let (events, rx) = broadcast::channel(64);

        let mut router = Router::new(CommandTable::room());
        router
            .register(room::CREATE_ROOM, Upsert::<Room>::new())
            .unwrap()
            .register(room::UPDATE_ROOM, Upsert::<Room>::new())
            .unwrap()
            .register(room::CREATE_CATEGORY, Upsert::<Category>::new())
            .unwrap();

        let mut cache = ViewCache::new(store.clone(), events.clone());
        cache
            .register_table::<Room>(Domain::Room)
            .register_table::<Category>(Domain::Categories);

        let reducer = Reducer::new(store.clone(), router, Arc::new(cache), events);
        (reducer, rx)
    }

    fn garden(name: &str) -> Room {
        Room {
            id: "garden".into(),
            kind: RoomKind::Community,
            name: name.into(),
            description: String::new(),
            avatar: None,
            created_at: Timestamp::new(1),
            created_by: PrivateKey::new().public_key(),
            discovery_key: Hash::new(b"discovery"),
            key: Hash::new(b"key"),
            is_private: false,
            is_encrypted: false,
            settings: Default::default(),
        }
    }

    fn entries(values: Vec<Vec<u8>>) -> Vec<LogEntry> {
        let writer = PrivateKey::new().public_key();
        values
            .into_iter()
            .enumerate()
            .map(|(seq, value)| LogEntry {
                seq: seq as u64,
                writer,
                value,
            })
            .collect()
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        setup_logging();

        let network = MemoryLogNetwork::new();
        let (log, _batches) = network
            .create(PrivateKey::new().public_key(), EncryptionKey::random())
            .unwrap();
        let table = CommandTable::room();
        let valid = vec![
            table.encode(room::CREATE_ROOM, &garden("Garden")).unwrap(),
            table
                .encode(
                    room::CREATE_CATEGORY,
                    &Category {
                        id: "c1".into(),
                        room_id: "garden".into(),
                        name: "Chat".into(),
                        position: 0,
                    },
                )
                .unwrap(),
        ];

        // Scenario: one replica sees a garbled entry in front of the valid ones.
        let ant_store = MemoryStore::new();
        let (mut ant, _) = reducer(&ant_store);
        let mut with_garbage = vec![vec![], vec![200, 1], vec![3, 0xff]];
        with_garbage.extend(valid.clone());
        let report = ant.apply(entries(with_garbage), &log).await;
        assert_eq!(report.skipped, 3);
        assert_eq!(report.applied, 2);
        assert_eq!(ant.state(), ReducerState::Idle);

        let bat_store = MemoryStore::new();
        let (mut bat, _) = reducer(&bat_store);
        bat.apply(entries(valid), &log).await;

        for domain in [Domain::Room, Domain::Categories] {
            assert_eq!(ant.cache.rows(domain), bat.cache.rows(domain));
        }
        assert_eq!(ant.cache.rows(Domain::Categories).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_previous_row() {
        let network = MemoryLogNetwork::new();
        let (log, _batches) = network
            .create(PrivateKey::new().public_key(), EncryptionKey::random())
            .unwrap();
        let table = CommandTable::room();
        let store = MemoryStore::new();
        let (mut reducer, _) = reducer(&store);

        // Update without a prior create.
        let first = garden("First");
        reducer
            .apply(
                entries(vec![table.encode(room::UPDATE_ROOM, &first).unwrap()]),
                &log,
            )
            .await;
        assert_eq!(store.len::<Room>(), 1);

        let second = garden("Second");
        let bytes = table.encode(room::UPDATE_ROOM, &second).unwrap();
        reducer.apply(entries(vec![bytes.clone(), bytes]), &log).await;
        assert_eq!(store.len::<Room>(), 1);
        assert_eq!(store.get::<Room>("garden").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn events_after_batch() {
        let network = MemoryLogNetwork::new();
        let (log, _batches) = network
            .create(PrivateKey::new().public_key(), EncryptionKey::random())
            .unwrap();
        let table = CommandTable::room();
        let store = MemoryStore::new();
        let (mut reducer, mut rx) = reducer(&store);

        let room = garden("Garden");
        reducer
            .apply(
                entries(vec![table.encode(room::CREATE_ROOM, &room).unwrap()]),
                &log,
            )
            .await;

        assert_eq!(
            rx.recv().await.unwrap(),
            Event::Applied {
                command: room::CREATE_ROOM,
                seq: 0
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Event::Updated {
                domain: Domain::Room,
                rows: Some(vec![Row::Room(room)]),
            }
        );
        assert_eq!(rx.recv().await.unwrap(), Event::Update);
        assert_eq!(
            rx.recv().await.unwrap(),
            Event::UpdateComplete {
                domains: vec![Domain::Room]
            }
        );

        // A batch without applied entries is silent.
        reducer.apply(entries(vec![vec![]]), &log).await;
        assert!(rx.try_recv().is_err());
    }

    /// Writes a category without reading the store first.
    struct InsertCategory;

    #[async_trait]
    impl Handler<MemoryStore> for InsertCategory {
        async fn apply(
            &self,
            command: Command<'_>,
            cx: &mut ApplyContext<'_, MemoryStore>,
        ) -> Result<Outcome, HandlerError> {
            let category: Category = command.decode_payload()?;
            cx.tx.insert(&category).await?;
            Ok(Outcome::Applied)
        }
    }

    fn category(id: &str) -> Category {
        Category {
            id: id.into(),
            room_id: "garden".into(),
            name: id.into(),
            position: 0,
        }
    }

    #[tokio::test]
    async fn failed_refresh_sends_no_rows() {
        let network = MemoryLogNetwork::new();
        let (log, _batches) = network
            .create(PrivateKey::new().public_key(), EncryptionKey::random())
            .unwrap();
        let table = CommandTable::room();
        let store = MemoryStore::new();
        let (events, mut rx) = broadcast::channel(64);

        let mut router = Router::new(CommandTable::room());
        router
            .register(room::CREATE_CATEGORY, InsertCategory)
            .unwrap();
        let mut cache = ViewCache::new(store.clone(), events.clone());
        cache.register_table::<Category>(Domain::Categories);
        let mut reducer = Reducer::new(store.clone(), router, Arc::new(cache), events);
        let before = reducer.cache.rows(Domain::Categories);

        // Scenario: the batch is written but the views can not be reloaded.
        store.fail_reads(true);
        let report = reducer
            .apply(
                entries(vec![table.encode(room::CREATE_CATEGORY, &category("c1")).unwrap()]),
                &log,
            )
            .await;
        store.fail_reads(false);
        assert_eq!(report.applied, 1);

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert!(received.iter().any(|event| matches!(event, Event::Error(_))));
        assert!(!received.iter().any(|event| matches!(event, Event::Updated { .. })));
        assert_eq!(reducer.cache.rows(Domain::Categories), before);

        // The next refresh sends what it loaded.
        reducer
            .apply(
                entries(vec![table.encode(room::CREATE_CATEGORY, &category("c2")).unwrap()]),
                &log,
            )
            .await;
        let rows = loop {
            match rx.recv().await.unwrap() {
                Event::Updated { rows, .. } => break rows.unwrap(),
                _ => continue,
            }
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(reducer.cache.rows(Domain::Categories), Some(rows));
    }
}
