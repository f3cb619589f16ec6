// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interface of the multi-writer, append-only log every replica materializes its state from.
use agora_core::{EncryptionKey, Hash, PublicKey};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub type SeqNum = u64;

/// Entry of a log, as delivered to the replica applying it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Position of the entry in the totally ordered log.
    pub seq: SeqNum,

    /// Writer key of the replica which appended this entry.
    pub writer: PublicKey,

    pub value: Vec<u8>,
}

/// Ordered batches of new entries, delivered to exactly one consumer per replica.
pub type Batches = mpsc::Receiver<Vec<LogEntry>>;

/// Privileged operations on the writer set of a log.
///
/// These are only invoked while applying the `add-writer` and `remove-writer` commands, which
/// keeps the writer set a deterministic function of the log.
#[async_trait]
pub trait Writers: Send + Sync {
    async fn add_writer(&self, key: PublicKey) -> Result<(), LogError>;

    async fn remove_writer(&self, key: PublicKey) -> Result<(), LogError>;
}

/// Local replica of a multi-writer log.
pub trait Log: Writers + 'static {
    /// Key identifying the log.
    fn key(&self) -> Hash;

    /// Topic on which replicas of this log find each other.
    fn discovery_key(&self) -> Hash;

    fn encryption_key(&self) -> EncryptionKey;

    /// Writer key of this replica.
    fn local_key(&self) -> PublicKey;

    /// Returns true if the local key is part of this replica's view of the writer set.
    fn is_writable(&self) -> bool;

    /// Number of entries known to this replica.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writer set as currently seen by this replica.
    fn writers(&self) -> Vec<PublicKey>;

    /// Append an entry and return its sequence number.
    fn append(&self, value: Vec<u8>) -> impl Future<Output = Result<SeqNum, LogError>> + Send;

    /// Stop delivering batches and reject further appends.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("local key {0} is not a writer of this log")]
    NotWritable(PublicKey),

    #[error("log {0} is unknown")]
    UnknownLog(Hash),

    #[error("encryption key does not match log {0}")]
    EncryptionKeyMismatch(Hash),

    #[error("log is closed")]
    Closed,
}
