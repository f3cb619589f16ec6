// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces shared by every record kept in a table store.
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Record which can be persisted in a keyed table.
///
/// Every record type lives in its own table and is uniquely identified by a string id within it.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name of the table holding records of this type.
    const TABLE: &'static str;

    /// Unique key of this record within its table.
    fn id(&self) -> String;

    /// Primary sort key used when listing records. Ties are broken by id.
    fn order(&self) -> u64 {
        0
    }
}
