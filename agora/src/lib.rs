// SPDX-License-Identifier: MIT OR Apache-2.0

#![cfg_attr(doctest, doc=include_str!("../README.md"))]

//! Peer-to-peer group messaging rooms and user identities on top of multi-writer logs.
//!
//! A [`Room`] is a shared log every member can write to. Its state (channels, members, roles,
//! signed messages and more) is materialized by an engine and exposed through cached views. New
//! replicas join with an invite code, an existing member admits their writer key and the room
//! is returned once the local replica is writable.
//!
//! A [`User`] is a log shared between the devices of one identity. The identity keys are derived
//! from a seed phrase, the log keeps the profile, the settings and the list of rooms to re-open
//! on every device. Devices pair with invite codes just like rooms, a device knowing only the
//! seed phrase can ask the other devices for a pairing invite through [`recovery`].
//!
//! Logs, stores and the transport are provided by a [`Backend`], [`MemoryNetwork`] connects
//! devices within one process.
pub mod admission;
pub mod backend;
pub mod config;
pub mod recovery;
pub mod room;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod user;

pub use admission::{AdmissionError, InviteOptions, LogAdmission};
pub use backend::{Backend, MemoryBackend, MemoryNetwork, OpenedLog, USER_NAMESPACE};
pub use config::{
    DEFAULT_JOIN_TIMEOUT, DEFAULT_PAIR_TIMEOUT, DEFAULT_RECOVERY_TIMEOUT, RoomConfig, UserConfig,
};
pub use recovery::{RecoveryError, RecoveryRequest, RecoveryResponder, RecoveryResponse};
pub use room::{
    Author, DEFAULT_MESSAGE_LIMIT, MessageOptions, MessageQuery, NewChannel, NewFile, NewMember,
    NewRole, NewRoom, Room, RoomError, RoomUpdate,
};
pub use user::{ProfileUpdate, User, UserError};
