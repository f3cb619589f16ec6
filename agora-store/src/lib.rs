// SPDX-License-Identifier: MIT OR Apache-2.0

#![cfg_attr(doctest, doc=include_str!("../README.md"))]

//! Persistence interfaces for agora replicas.
//!
//! Every replica materializes its state from a multi-writer, append-only [`Log`] into a keyed
//! [`TableStore`]. Writes happen inside a [`Transaction`] which is flushed once per applied batch
//! of log entries, reads on the store itself only observe flushed state.
//!
//! In-memory implementations of both interfaces are gated by the `memory` feature flag, which is
//! enabled by default.
pub mod log;
#[cfg(feature = "memory")]
pub mod memory;
mod traits;

pub use log::{Batches, Log, LogEntry, LogError, SeqNum, Writers};
#[cfg(feature = "memory")]
pub use memory::{MemoryLog, MemoryLogNetwork, MemoryStore, MemoryTransaction};
pub use traits::{RecordStream, StoreError, TableStore, Transaction};
