// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical byte representation of messages for signing and verification.
//!
//! The signature covers a fixed-order subset of the message fields. Fields which change as a
//! side-effect of replication or deletion (`signature`, `deleted*`, `edited_at`, `sender_name`)
//! are not part of it.
use serde::Serialize;

use crate::cbor::{EncodeError, encode_cbor};
use crate::identity::PrivateKey;
use crate::model::Message;

#[derive(Serialize)]
struct SignableMessage<'a> {
    id: &'a str,
    room_id: &'a str,
    channel_id: &'a str,
    kind: &'a str,
    content: &'a str,
    sender: String,
    timestamp: u64,
    thread_root_id: Option<&'a str>,
    reply_to_id: Option<&'a str>,
    edited: bool,
}

impl Message {
    /// Bytes covered by the message signature.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(&SignableMessage {
            id: &self.id,
            room_id: &self.room_id,
            channel_id: &self.channel_id,
            kind: self.kind.as_str(),
            content: &self.content,
            sender: self.sender.to_hex(),
            timestamp: self.timestamp.as_millis(),
            thread_root_id: self.thread_root_id.as_deref(),
            reply_to_id: self.reply_to_id.as_deref(),
            edited: self.edited,
        })
    }

    /// Sign the message with the author's key and attach the signature.
    pub fn sign(&mut self, private_key: &PrivateKey) -> Result<(), EncodeError> {
        let bytes = self.signable_bytes()?;
        self.signature = Some(private_key.sign(&bytes));
        Ok(())
    }

    /// Returns true if the message carries a signature by its sender over its current content.
    pub fn verify_signature(&self) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        match self.signable_bytes() {
            Ok(bytes) => self.sender.verify(&bytes, signature),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::identity::PrivateKey;
    use crate::model::{Message, MessageKind};
    use crate::timestamp::Timestamp;

    fn message(private_key: &PrivateKey, content: &str) -> Message {
        Message {
            id: "m1".into(),
            room_id: "garden".into(),
            channel_id: "general".into(),
            kind: MessageKind::Text,
            sender: private_key.public_key(),
            sender_name: "ant".into(),
            content: content.into(),
            timestamp: Timestamp::new(1_700_000_000_000),
            signature: None,
            edited: false,
            edited_at: None,
            deleted: false,
            deleted_by: None,
            deleted_at: None,
            thread_root_id: None,
            reply_to_id: None,
        }
    }

    #[test]
    fn tampered_content_fails_verification() {
        let private_key = PrivateKey::new();
        let mut original = message(&private_key, "hello");
        original.sign(&private_key).unwrap();
        assert!(original.verify_signature());

        let mut tampered = original.clone();
        tampered.content = "HELLO".into();
        assert!(!tampered.verify_signature());
        assert!(original.verify_signature());
    }

    #[test]
    fn unsigned_or_foreign_signature() {
        let private_key = PrivateKey::new();
        let unsigned = message(&private_key, "hello");
        assert!(!unsigned.verify_signature());

        // Signed by someone else than the claimed sender.
        let mut forged = message(&private_key, "hello");
        forged.sign(&PrivateKey::new()).unwrap();
        assert!(!forged.verify_signature());
    }

    #[test]
    fn unsigned_fields_do_not_matter() {
        let private_key = PrivateKey::new();
        let mut message = message(&private_key, "hello");
        message.sign(&private_key).unwrap();

        message.sender_name = "renamed".into();
        message.edited_at = Some(Timestamp::new(5));
        assert!(message.verify_signature());
    }
}
