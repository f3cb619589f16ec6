// SPDX-License-Identifier: MIT OR Apache-2.0

use agora_core::cbor::{DecodeError, EncodeError};
use thiserror::Error;

use crate::invite::InviteError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("pairing did not complete in time")]
    Timeout,

    #[error("invite was rejected")]
    Rejected,

    #[error("pairing was closed")]
    Closed,

    #[error("failed opening the confirmed log: {0}")]
    Bind(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Invite(#[from] InviteError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
