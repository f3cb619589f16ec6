// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process multi-writer logs, shared between all replicas opened on the same network.
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use agora_core::{EncryptionKey, Hash, PublicKey};
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::log::{Batches, Log, LogEntry, LogError, SeqNum, Writers};

const BATCH_CHANNEL_CAPACITY: usize = 64;

const DISCOVERY_CONTEXT: &[u8] = b"discovery";

#[derive(Debug)]
struct SharedLog {
    key: Hash,
    discovery_key: Hash,
    encryption_key: EncryptionKey,
    bootstrap: PublicKey,
    entries: RwLock<Vec<LogEntry>>,
    len: watch::Sender<u64>,
}

/// Registry of all logs living in this process.
///
/// Every log is a single totally ordered list of entries. Replicas opened on the same log each
/// keep their own cursor into it and their own view of the writer set, which they build up by
/// applying the log's `add-writer` and `remove-writer` commands.
#[derive(Clone, Debug, Default)]
pub struct MemoryLogNetwork {
    logs: Arc<Mutex<HashMap<Hash, Arc<SharedLog>>>>,
}

impl MemoryLogNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key of the log bootstrapped by the given writer.
    pub fn log_key(bootstrap: &PublicKey) -> Hash {
        Hash::new(bootstrap.as_bytes())
    }

    /// Create a new log with the local key as its first writer, or re-open it when it already
    /// exists.
    pub fn create(
        &self,
        local_key: PublicKey,
        encryption_key: EncryptionKey,
    ) -> Result<(MemoryLog, Batches), LogError> {
        let key = Self::log_key(&local_key);
        {
            let mut logs = self.logs.lock().expect("acquire lock on log registry");
            logs.entry(key).or_insert_with(|| {
                debug!(%key, "create log");
                let (len, _) = watch::channel(0);
                Arc::new(SharedLog {
                    key,
                    discovery_key: Hash::from_parts([key.as_bytes().as_slice(), DISCOVERY_CONTEXT]),
                    encryption_key,
                    bootstrap: local_key,
                    entries: RwLock::new(Vec::new()),
                    len,
                })
            });
        }
        self.open(key, local_key, encryption_key)
    }

    /// Open a replica of an existing log.
    pub fn open(
        &self,
        key: Hash,
        local_key: PublicKey,
        encryption_key: EncryptionKey,
    ) -> Result<(MemoryLog, Batches), LogError> {
        let shared = {
            let logs = self.logs.lock().expect("acquire lock on log registry");
            logs.get(&key).cloned().ok_or(LogError::UnknownLog(key))?
        };
        if shared.encryption_key != encryption_key {
            return Err(LogError::EncryptionKeyMismatch(key));
        }
        debug!(%key, local_key = %local_key, "open log replica");
        Ok(MemoryLog::spawn(shared, local_key))
    }

    /// Returns true if a log with this key exists.
    pub fn contains(&self, key: &Hash) -> bool {
        self.logs
            .lock()
            .expect("acquire lock on log registry")
            .contains_key(key)
    }
}

/// Replica of a log living on a [`MemoryLogNetwork`].
#[derive(Debug)]
pub struct MemoryLog {
    shared: Arc<SharedLog>,
    local_key: PublicKey,
    writers: RwLock<BTreeSet<PublicKey>>,
    token: CancellationToken,
}

impl MemoryLog {
    fn spawn(shared: Arc<SharedLog>, local_key: PublicKey) -> (Self, Batches) {
        let (tx, rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let token = CancellationToken::new();

        tokio::spawn(deliver(shared.clone(), tx, token.clone()));

        let log = Self {
            writers: RwLock::new(BTreeSet::from([shared.bootstrap])),
            shared,
            local_key,
            token,
        };
        (log, rx)
    }
}

/// Forward new entries of the shared log to the replica's batch channel.
async fn deliver(shared: Arc<SharedLog>, tx: mpsc::Sender<Vec<LogEntry>>, token: CancellationToken) {
    let mut len = shared.len.subscribe();
    let mut cursor: u64 = 0;

    loop {
        let known = *len.borrow_and_update();
        if known > cursor {
            let batch = {
                let entries = shared.entries.read().expect("acquire read access on log");
                entries[cursor as usize..known as usize].to_vec()
            };
            trace!(key = %shared.key, from = cursor, to = known, "deliver batch");
            cursor = known;

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = tx.send(batch) => {
                    if result.is_err() {
                        break;
                    }
                }
            }
            continue;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = len.changed() => {
                if result.is_err() {
                    break;
                }
            }
        }
    }

    debug!(key = %shared.key, "stopped delivering batches");
}

#[async_trait]
impl Writers for MemoryLog {
    async fn add_writer(&self, key: PublicKey) -> Result<(), LogError> {
        let mut writers = self.writers.write().expect("acquire write access on writers");
        if writers.insert(key) {
            debug!(log = %self.shared.key, writer = %key, "added writer");
        }
        Ok(())
    }

    async fn remove_writer(&self, key: PublicKey) -> Result<(), LogError> {
        let mut writers = self.writers.write().expect("acquire write access on writers");
        if writers.remove(&key) {
            debug!(log = %self.shared.key, writer = %key, "removed writer");
        }
        Ok(())
    }
}

impl Log for MemoryLog {
    fn key(&self) -> Hash {
        self.shared.key
    }

    fn discovery_key(&self) -> Hash {
        self.shared.discovery_key
    }

    fn encryption_key(&self) -> EncryptionKey {
        self.shared.encryption_key
    }

    fn local_key(&self) -> PublicKey {
        self.local_key
    }

    fn is_writable(&self) -> bool {
        self.writers
            .read()
            .expect("acquire read access on writers")
            .contains(&self.local_key)
    }

    fn len(&self) -> u64 {
        *self.shared.len.borrow()
    }

    fn writers(&self) -> Vec<PublicKey> {
        self.writers
            .read()
            .expect("acquire read access on writers")
            .iter()
            .copied()
            .collect()
    }

    async fn append(&self, value: Vec<u8>) -> Result<SeqNum, LogError> {
        if self.token.is_cancelled() {
            return Err(LogError::Closed);
        }
        if !self.is_writable() {
            return Err(LogError::NotWritable(self.local_key));
        }

        let mut entries = self.shared.entries.write().expect("acquire write access on log");
        let seq = entries.len() as SeqNum;
        entries.push(LogEntry {
            seq,
            writer: self.local_key,
            value,
        });
        self.shared.len.send_replace(entries.len() as u64);
        trace!(key = %self.shared.key, seq, "appended entry");

        Ok(seq)
    }

    async fn close(&self) {
        self.token.cancel();
    }
}

impl Drop for MemoryLog {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use agora_core::{EncryptionKey, PrivateKey};
    use assert_matches::assert_matches;

    use crate::log::{Log, LogError, Writers};

    use super::MemoryLogNetwork;

    #[tokio::test]
    async fn replicas_receive_same_order() {
        let network = MemoryLogNetwork::new();
        let encryption_key = EncryptionKey::random();

        let ant = PrivateKey::new().public_key();
        let bat = PrivateKey::new().public_key();

        let (ant_log, mut ant_batches) = network.create(ant, encryption_key).unwrap();
        let (bat_log, mut bat_batches) = network.open(ant_log.key(), bat, encryption_key).unwrap();

        assert!(ant_log.is_writable());
        assert!(!bat_log.is_writable());
        assert_matches!(
            bat_log.append(b"hi".to_vec()).await,
            Err(LogError::NotWritable(key)) if key == bat
        );

        assert_eq!(ant_log.append(b"one".to_vec()).await.unwrap(), 0);
        bat_log.add_writer(bat).await.unwrap();
        assert!(bat_log.is_writable());
        assert_eq!(bat_log.append(b"two".to_vec()).await.unwrap(), 1);

        let mut ant_seen = Vec::new();
        while ant_seen.len() < 2 {
            ant_seen.extend(ant_batches.recv().await.unwrap());
        }
        let mut bat_seen = Vec::new();
        while bat_seen.len() < 2 {
            bat_seen.extend(bat_batches.recv().await.unwrap());
        }
        assert_eq!(ant_seen, bat_seen);
        assert_eq!(ant_seen[1].writer, bat);
        assert_eq!(ant_log.len(), 2);
    }

    #[tokio::test]
    async fn open_requires_encryption_key() {
        let network = MemoryLogNetwork::new();
        let ant = PrivateKey::new().public_key();
        let (log, _batches) = network.create(ant, EncryptionKey::random()).unwrap();

        assert_matches!(
            network.open(log.key(), ant, EncryptionKey::random()),
            Err(LogError::EncryptionKeyMismatch(_))
        );
        assert_matches!(
            network.open(agora_core::Hash::new(b"nope"), ant, log.encryption_key()),
            Err(LogError::UnknownLog(_))
        );
    }

    #[tokio::test]
    async fn close_stops_delivery() {
        let network = MemoryLogNetwork::new();
        let ant = PrivateKey::new().public_key();
        let (log, mut batches) = network.create(ant, EncryptionKey::random()).unwrap();

        log.close().await;
        assert_matches!(log.append(vec![1]).await, Err(LogError::Closed));

        let closed = tokio::time::timeout(Duration::from_secs(1), batches.recv())
            .await
            .unwrap();
        assert!(closed.is_none());
    }
}
