// SPDX-License-Identifier: MIT OR Apache-2.0

#![cfg_attr(doctest, doc=include_str!("../README.md"))]

//! Capability-based admission of new writers to a shared log.
//!
//! An inviting replica creates an [`invite`](create_invite) and stores its public key. The
//! [`Member`] listens on the discovery topic of the log and admits every [`Candidate`] which
//! proves possession of a redeemable invite by adding the presented key to the writer set. The
//! [`Pairer`] drives the candidate side until the admitted key is effective in the local replica.
//!
//! Requests travel over a topic-scoped [`Transport`], [`MemoryTransport`] connects replicas
//! within one process.
pub mod candidate;
mod error;
pub mod invite;
pub mod member;
pub mod message;
pub mod pairer;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
#[cfg(test)]
mod tests;
pub mod transport;

pub use candidate::{Candidate, CandidateState};
pub use error::PairingError;
pub use invite::{
    CreatedInvite, DEFAULT_INVITE_LIFETIME, InviteCode, InviteError, create_invite, namespace,
};
pub use member::{Admission, CandidateRequest, Member};
pub use message::{Confirmation, PairingRequest, PairingResponse};
pub use pairer::{Bound, Pairer};
pub use transport::{
    IncomingRequest, Listener, MemoryListener, MemoryTransport, Topic, Transport, TransportError,
};
