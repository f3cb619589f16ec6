// SPDX-License-Identifier: MIT OR Apache-2.0

use agora_core::{Domain, Row};
use agora_store::SeqNum;

use crate::auth::Rejection;

/// Events emitted by an engine and the aggregates built on top of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Rows of a domain were refreshed. `rows` is `None` when the domain is not cached.
    Updated {
        domain: Domain,
        rows: Option<Vec<Row>>,
    },

    /// A log entry was applied to the local state.
    Applied { command: &'static str, seq: SeqNum },

    /// A log entry was dropped by the authorization checks.
    ///
    /// This is a local diagnostic and never part of the replicated state.
    Rejected {
        command: &'static str,
        seq: SeqNum,
        reason: Rejection,
    },

    /// A batch of log entries was applied.
    Update,

    /// All views touched by a batch were refreshed.
    UpdateComplete { domains: Vec<Domain> },

    /// The reconciliation timer re-checked stale domains.
    PeriodicUpdate { domains: Vec<Domain> },

    Created { domain: Domain, id: String },

    Edited { domain: Domain, id: String },

    Deleted { domain: Domain, id: String },

    /// Event of one of the user's rooms.
    Room { room_id: String, event: Box<Event> },

    RoomJoined { room_id: String },

    RoomInitialized { room_id: String },

    RoomLeft { room_id: String },

    Error(String),
}
