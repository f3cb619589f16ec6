// SPDX-License-Identifier: MIT OR Apache-2.0

//! Invite capabilities.
//!
//! An invite carries the discovery topic of a log together with the seed of a fresh key pair.
//! Whoever holds the invite can sign pairing requests with that key, the inviting side only keeps
//! the public key and the invite id derived from it.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use agora_core::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use agora_core::identity::PRIVATE_KEY_LEN;
use agora_core::{Hash, PrivateKey, PublicKey, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of hex characters of a room namespace derived from an invite code.
const NAMESPACE_LEN: usize = 16;

/// Default lifetime of newly created invites.
pub const DEFAULT_INVITE_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Decoded form of an invite code.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCode {
    /// Topic the inviting replicas listen on.
    pub discovery_key: Hash,

    #[serde(with = "serde_bytes")]
    seed: [u8; PRIVATE_KEY_LEN],
}

impl InviteCode {
    fn new(discovery_key: Hash, private_key: &PrivateKey) -> Self {
        Self {
            discovery_key,
            seed: *private_key.as_bytes(),
        }
    }

    /// Key pair proving possession of the invite.
    pub fn private_key(&self) -> PrivateKey {
        PrivateKey::from_bytes(&self.seed)
    }

    pub fn public_key(&self) -> PublicKey {
        self.private_key().public_key()
    }

    /// Id under which the inviting side stores the invite.
    pub fn id(&self) -> Hash {
        invite_id(&self.public_key())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InviteError> {
        Ok(decode_cbor(bytes)?)
    }

    /// Hex-encoded invite which can be handed out to other users.
    pub fn to_code(&self) -> Result<String, EncodeError> {
        Ok(hex::encode(self.to_bytes()?))
    }
}

impl FromStr for InviteCode {
    type Err = InviteError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(code.trim())?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InviteCode")
            .field("discovery_key", &self.discovery_key)
            .field("id", &self.id())
            .finish()
    }
}

/// Id of the invite with this public key.
pub fn invite_id(public_key: &PublicKey) -> Hash {
    Hash::new(public_key.as_bytes())
}

/// Namespace of a room joined with this invite code.
pub fn namespace(code: &str) -> String {
    let mut hex = Hash::new(code.trim().as_bytes()).to_hex();
    hex.truncate(NAMESPACE_LEN);
    hex
}

/// Newly created invite, as stored by the inviting side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedInvite {
    pub id: Hash,

    /// Encoded [`InviteCode`].
    pub invite: Vec<u8>,

    pub public_key: PublicKey,

    pub expires: Timestamp,
}

impl CreatedInvite {
    /// Hex-encoded invite code.
    pub fn code(&self) -> String {
        hex::encode(&self.invite)
    }
}

/// Create an invite for the log discovered under `discovery_key`, valid for `lifetime`.
pub fn create_invite(discovery_key: Hash, lifetime: Duration) -> Result<CreatedInvite, InviteError> {
    let private_key = PrivateKey::new();
    let code = InviteCode::new(discovery_key, &private_key);
    let public_key = private_key.public_key();

    Ok(CreatedInvite {
        id: invite_id(&public_key),
        invite: code.to_bytes()?,
        public_key,
        expires: Timestamp::now() + lifetime,
    })
}

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("invite code is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
