// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic key derivation from a user's seed phrase.
//!
//! Every key of an identity is derived from a single master hash over the seed phrase, which
//! makes it possible to recover the same identity on a fresh device.
use crate::hash::Hash;
use crate::identity::{EncryptionKey, PrivateKey, PublicKey};

const DISCOVERY_CONTEXT: &[u8] = b"discovery";

const ENCRYPTION_CONTEXT: &[u8] = b"encryption";

/// Keys derived from a seed phrase.
#[derive(Clone, Debug)]
pub struct SeedKeys {
    /// Signing key of the identity.
    pub private_key: PrivateKey,

    /// Public key of the identity.
    pub public_key: PublicKey,

    /// Topic on which other devices of the same identity answer recovery requests.
    pub discovery_key: Hash,

    /// Key for encrypting the identity's own log.
    pub encryption_key: EncryptionKey,
}

impl SeedKeys {
    /// Derive all keys from the given seed phrase.
    pub fn derive(seed: &str) -> Self {
        let master = Hash::new(seed.as_bytes());
        let private_key = PrivateKey::from_bytes(master.as_bytes());
        let public_key = private_key.public_key();
        let discovery_key = Hash::from_parts([master.as_bytes().as_slice(), DISCOVERY_CONTEXT]);
        let encryption_key = EncryptionKey::from_bytes(
            *Hash::from_parts([master.as_bytes().as_slice(), ENCRYPTION_CONTEXT]).as_bytes(),
        );

        Self {
            private_key,
            public_key,
            discovery_key,
            encryption_key,
        }
    }
}

/// Join seed words into the phrase keys are derived from.
pub fn seed_phrase<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(" ")
}
