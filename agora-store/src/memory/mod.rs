// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementations of the table store and log interfaces.
//!
//! Nothing is persisted permanently, all state is lost when the process ends. Use these only in
//! development or test contexts.
mod log;
mod store;

pub use log::{MemoryLog, MemoryLogNetwork};
pub use store::{InnerMemoryStore, MemoryStore, MemoryTransaction};
