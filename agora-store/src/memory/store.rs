// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory table store.
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use agora_core::Record;
use agora_core::cbor::{decode_cbor, encode_cbor};
use futures_util::{StreamExt, stream};

use crate::traits::{RecordStream, StoreError, TableStore, Transaction};

type Rows = BTreeMap<String, Vec<u8>>;

/// Pending writes of a transaction, `None` marks a deletion.
type Overlay = BTreeMap<String, Option<Vec<u8>>>;

#[derive(Debug, Default)]
pub struct InnerMemoryStore {
    tables: HashMap<&'static str, Rows>,
    #[cfg(feature = "test_utils")]
    fail_reads: bool,
}

impl InnerMemoryStore {
    fn check_available(&self) -> Result<(), StoreError> {
        #[cfg(feature = "test_utils")]
        if self.fail_reads {
            return Err(StoreError::Unavailable("reads are disabled".into()));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Option<&Rows> {
        self.tables.get(name)
    }
}

/// An in-memory store for materialized records.
///
/// Records are kept CBOR-encoded, one table per record type. `MemoryStore` can be cloned and
/// shared across tasks, all clones operate on the same tables.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<InnerMemoryStore>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain a read-lock on the store.
    fn read_store(&self) -> RwLockReadGuard<'_, InnerMemoryStore> {
        self.inner
            .read()
            .expect("acquire shared read access on store")
    }

    /// Obtain a write-lock on the store.
    fn write_store(&self) -> RwLockWriteGuard<'_, InnerMemoryStore> {
        self.inner
            .write()
            .expect("acquire exclusive write access on store")
    }

    /// Number of flushed records in the table of `R`.
    pub fn len<R: Record>(&self) -> usize {
        self.read_store().table(R::TABLE).map_or(0, |rows| rows.len())
    }

    /// Make every following read fail with [`StoreError::Unavailable`] until reset.
    #[cfg(feature = "test_utils")]
    pub fn fail_reads(&self, fail: bool) {
        self.write_store().fail_reads = fail;
    }
}

fn encode<R: Record>(record: &R) -> Result<Vec<u8>, StoreError> {
    encode_cbor(record).map_err(|err| StoreError::Encode(R::TABLE, err))
}

fn decode<R: Record>(bytes: &[u8]) -> Result<R, StoreError> {
    decode_cbor(bytes).map_err(|err| StoreError::Decode(R::TABLE, err))
}

impl TableStore for MemoryStore {
    type Transaction = MemoryTransaction;

    fn transaction(&self) -> Self::Transaction {
        MemoryTransaction {
            store: self.clone(),
            pending: HashMap::new(),
        }
    }

    async fn get<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        let store = self.read_store();
        store.check_available()?;
        store
            .table(R::TABLE)
            .and_then(|rows| rows.get(id))
            .map(|bytes| decode(bytes))
            .transpose()
    }

    async fn find_one<R, F>(&self, predicate: F) -> Result<Option<R>, StoreError>
    where
        R: Record,
        F: Fn(&R) -> bool + Send,
    {
        let store = self.read_store();
        store.check_available()?;
        for bytes in store.table(R::TABLE).into_iter().flat_map(|rows| rows.values()) {
            let record: R = decode(bytes)?;
            if predicate(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn find<R: Record>(&self) -> RecordStream<R> {
        let store = self.clone();
        stream::unfold(Some(Bound::Unbounded), move |cursor: Option<Bound<String>>| {
            let store = store.clone();
            async move {
                let cursor = cursor?;
                let next = {
                    let inner = store.read_store();
                    if let Err(err) = inner.check_available() {
                        return Some((Err(err), None));
                    }
                    inner.table(R::TABLE).and_then(|rows| {
                        rows.range((cursor, Bound::Unbounded))
                            .next()
                            .map(|(id, bytes)| (id.clone(), bytes.clone()))
                    })
                };
                let (id, bytes) = next?;
                Some((decode::<R>(&bytes), Some(Bound::Excluded(id))))
            }
        })
        .boxed()
    }
}

/// Transaction on a [`MemoryStore`] collecting writes in an overlay until it gets flushed.
#[derive(Debug)]
pub struct MemoryTransaction {
    store: MemoryStore,
    pending: HashMap<&'static str, Overlay>,
}

impl MemoryTransaction {
    fn get_bytes<R: Record>(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(pending) = self.pending.get(R::TABLE).and_then(|overlay| overlay.get(id)) {
            return Ok(pending.clone());
        }
        let store = self.store.read_store();
        store.check_available()?;
        Ok(store.table(R::TABLE).and_then(|rows| rows.get(id)).cloned())
    }

    /// Flushed rows of the table merged with the pending writes.
    fn rows<R: Record>(&self) -> Result<Rows, StoreError> {
        let mut rows = {
            let store = self.store.read_store();
            store.check_available()?;
            store.table(R::TABLE).cloned().unwrap_or_default()
        };
        for (id, value) in self.pending.get(R::TABLE).into_iter().flatten() {
            match value {
                Some(bytes) => rows.insert(id.clone(), bytes.clone()),
                None => rows.remove(id),
            };
        }
        Ok(rows)
    }

    fn overlay<R: Record>(&mut self) -> &mut Overlay {
        self.pending.entry(R::TABLE).or_default()
    }
}

impl Transaction for MemoryTransaction {
    async fn insert<R: Record>(&mut self, record: &R) -> Result<(), StoreError> {
        let bytes = encode(record)?;
        self.overlay::<R>().insert(record.id(), Some(bytes));
        Ok(())
    }

    async fn delete<R: Record>(&mut self, id: &str) -> Result<bool, StoreError> {
        let existed = self.get_bytes::<R>(id)?.is_some();
        self.overlay::<R>().insert(id.to_string(), None);
        Ok(existed)
    }

    async fn delete_where<R, F>(&mut self, predicate: F) -> Result<usize, StoreError>
    where
        R: Record,
        F: Fn(&R) -> bool + Send,
    {
        let mut removed = Vec::new();
        for (id, bytes) in self.rows::<R>()? {
            let record: R = decode(&bytes)?;
            if predicate(&record) {
                removed.push(id);
            }
        }
        let count = removed.len();
        let overlay = self.overlay::<R>();
        for id in removed {
            overlay.insert(id, None);
        }
        Ok(count)
    }

    async fn get<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        self.get_bytes::<R>(id)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn find_one<R, F>(&self, predicate: F) -> Result<Option<R>, StoreError>
    where
        R: Record,
        F: Fn(&R) -> bool + Send,
    {
        for bytes in self.rows::<R>()?.values() {
            let record: R = decode(bytes)?;
            if predicate(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn find<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        self.rows::<R>()?
            .values()
            .map(|bytes| decode(bytes))
            .collect()
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        let mut store = self.store.write_store();
        for (table, overlay) in pending {
            let rows = store.tables.entry(table).or_default();
            for (id, value) in overlay {
                match value {
                    Some(bytes) => rows.insert(id, bytes),
                    None => rows.remove(&id),
                };
            }
        }
        Ok(())
    }
}
