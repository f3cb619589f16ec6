// SPDX-License-Identifier: MIT OR Apache-2.0

use agora_core::Record;
use agora_core::cbor::{DecodeError, EncodeError};
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Lazy stream over all records of one table, ordered by id.
pub type RecordStream<R> = BoxStream<'static, Result<R, StoreError>>;

/// Interface for keyed tables of materialized records.
///
/// Reads on the store itself only ever observe flushed state. All writes go through a
/// [`Transaction`] which becomes visible to the store once it was flushed.
pub trait TableStore: Clone + Send + Sync + 'static {
    type Transaction: Transaction;

    /// Begins a new transaction.
    fn transaction(&self) -> Self::Transaction;

    /// Get a record by id.
    fn get<R: Record>(&self, id: &str) -> impl Future<Output = Result<Option<R>, StoreError>> + Send;

    /// Get the first record (ordered by id) matching the predicate.
    fn find_one<R, F>(
        &self,
        predicate: F,
    ) -> impl Future<Output = Result<Option<R>, StoreError>> + Send
    where
        R: Record,
        F: Fn(&R) -> bool + Send;

    /// Stream all records of a table.
    ///
    /// The stream is lazy, rows are read and decoded one by one while it is polled.
    fn find<R: Record>(&self) -> RecordStream<R>;
}

/// Batch of writes against a [`TableStore`].
///
/// Reads through a transaction observe its own pending writes.
pub trait Transaction: Send + Sync {
    /// Insert a record, replacing any record with the same id.
    fn insert<R: Record>(&mut self, record: &R) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete a record by id.
    ///
    /// Returns `true` when a record was removed and `false` when none was found.
    fn delete<R: Record>(&mut self, id: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Delete all records matching the predicate and return how many were removed.
    fn delete_where<R, F>(
        &mut self,
        predicate: F,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send
    where
        R: Record,
        F: Fn(&R) -> bool + Send;

    fn get<R: Record>(&self, id: &str) -> impl Future<Output = Result<Option<R>, StoreError>> + Send;

    fn find_one<R, F>(
        &self,
        predicate: F,
    ) -> impl Future<Output = Result<Option<R>, StoreError>> + Send
    where
        R: Record,
        F: Fn(&R) -> bool + Send;

    /// All records of a table, including pending writes, ordered by id.
    fn find<R: Record>(&self) -> impl Future<Output = Result<Vec<R>, StoreError>> + Send;

    /// Make all pending writes visible to the store.
    fn flush(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not encode record for table {0}: {1}")]
    Encode(&'static str, EncodeError),

    #[error("could not decode record from table {0}: {1}")]
    Decode(&'static str, DecodeError),

    #[error("store is unavailable: {0}")]
    Unavailable(String),
}
