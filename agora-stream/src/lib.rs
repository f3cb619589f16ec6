// SPDX-License-Identifier: MIT OR Apache-2.0

#![cfg_attr(doctest, doc=include_str!("../README.md"))]

//! Materialization of agora logs into keyed views.
//!
//! Every log is driven by an [`Engine`] which hands each delivered batch to a [`Reducer`]. The
//! reducer decodes every entry, dispatches it through the [`Router`] to the handler registered
//! for its command and records which entity domains were touched. Once the batch was flushed to
//! the table store, all touched domains are refreshed in the [`ViewCache`] and [`Event`]s are
//! emitted to subscribers.
//!
//! Mutations of messages pass the authorization checks in [`auth`] first, a failing mutation is
//! dropped without stopping the batch.
pub mod auth;
pub mod cache;
pub mod engine;
pub mod event;
pub mod handlers;
pub mod reconcile;
pub mod reducer;
pub mod router;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use auth::Rejection;
pub use cache::{TableView, View, ViewCache};
pub use engine::{Engine, EngineConfig, EngineError};
pub use event::Event;
pub use handlers::{AddInvite, AddWriter, Remove, RemoveById, RemoveWriter, Upsert};
pub use reconcile::{DEFAULT_RECONCILE_INTERVAL, Reconciler};
pub use reducer::{ApplyReport, Reducer, ReducerState};
pub use router::{
    ApplyContext, DispatchError, Dispatched, Handler, HandlerError, Outcome, Router, RouterError,
};
