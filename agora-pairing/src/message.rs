// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messages exchanged between a candidate and an inviting member.
use agora_core::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use agora_core::{EncryptionKey, Hash, PublicKey, Signature};
use serde::{Deserialize, Serialize};

use crate::invite::InviteCode;

/// Request of a candidate to be admitted as a writer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRequest {
    pub invite_id: Hash,

    /// Writer key the candidate wants to be admitted with.
    pub user_data: PublicKey,

    /// Signature over id and user data by the invite key.
    pub signature: Signature,
}

impl PairingRequest {
    pub fn new(invite: &InviteCode, user_data: PublicKey) -> Result<Self, EncodeError> {
        let invite_id = invite.id();
        let bytes = signable_bytes(&invite_id, &user_data)?;
        Ok(Self {
            invite_id,
            user_data,
            signature: invite.private_key().sign(&bytes),
        })
    }

    /// Returns true if the request was signed with the invite key `public_key`.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        match signable_bytes(&self.invite_id, &self.user_data) {
            Ok(bytes) => public_key.verify(&bytes, &self.signature),
            Err(_) => false,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_cbor(bytes)
    }
}

fn signable_bytes(invite_id: &Hash, user_data: &PublicKey) -> Result<Vec<u8>, EncodeError> {
    encode_cbor(&(invite_id, user_data))
}

/// Everything a candidate needs to open its replica of the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub key: Hash,
    pub encryption_key: EncryptionKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingResponse {
    Confirmed(Confirmation),
    Rejected,
}

impl PairingResponse {
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use agora_core::{Hash, PrivateKey};

    use crate::invite::{InviteCode, create_invite};

    use super::PairingRequest;

    #[test]
    fn request_proves_invite_possession() {
        let created = create_invite(Hash::new(b"garden"), Duration::from_secs(60)).unwrap();
        let code: InviteCode = created.code().parse().unwrap();
        let user_data = PrivateKey::new().public_key();

        let request = PairingRequest::new(&code, user_data).unwrap();
        assert_eq!(request.invite_id, created.id);
        assert!(request.verify(&created.public_key));

        let decoded = PairingRequest::from_bytes(&request.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, request);

        // Swapping the presented key invalidates the proof.
        let mut swapped = request.clone();
        swapped.user_data = PrivateKey::new().public_key();
        assert!(!swapped.verify(&created.public_key));

        let other = create_invite(Hash::new(b"garden"), Duration::from_secs(60)).unwrap();
        assert!(!request.verify(&other.public_key));
    }
}
