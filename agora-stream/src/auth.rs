// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authorship checks gating in-place mutations of messages.
//!
//! A message can only be created with a valid signature of its sender, and only be edited or
//! deleted by that same sender. Mutations failing these checks are dropped from the replicated
//! state.
use agora_core::PublicKey;
use agora_core::model::Message;
use thiserror::Error;

/// Reason for dropping a mutation while applying it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("signature is missing or does not match the sender")]
    InvalidSignature,

    #[error("author does not match the original sender")]
    NotAuthor,

    #[error("original message does not exist")]
    MissingOriginal,

    #[error("message was deleted")]
    Deleted,

    #[error("edit moves the message to another channel")]
    ChannelMismatch,
}

/// Verify the signature of a message against its own `sender`.
pub fn verify_message(message: &Message) -> Result<(), Rejection> {
    if message.verify_signature() {
        Ok(())
    } else {
        Err(Rejection::InvalidSignature)
    }
}

/// Check that `author` byte-equals the sender of the original message.
pub fn verify_author(original: &Message, author: &PublicKey) -> Result<(), Rejection> {
    if original.sender.as_bytes() == author.as_bytes() {
        Ok(())
    } else {
        Err(Rejection::NotAuthor)
    }
}

/// Authorize an edit against the stored original message.
///
/// The edit is stored as signed, it has to stay in the channel of the original.
pub fn authorize_edit(original: Option<&Message>, edit: &Message) -> Result<(), Rejection> {
    verify_message(edit)?;
    let original = original.ok_or(Rejection::MissingOriginal)?;
    if original.deleted {
        return Err(Rejection::Deleted);
    }
    verify_author(original, &edit.sender)?;
    if original.channel_id != edit.channel_id {
        return Err(Rejection::ChannelMismatch);
    }
    Ok(())
}

/// Authorize a deletion by `deleted_by` against the stored original message.
pub fn authorize_delete(original: Option<&Message>, deleted_by: &PublicKey) -> Result<(), Rejection> {
    let original = original.ok_or(Rejection::MissingOriginal)?;
    if original.deleted {
        return Err(Rejection::Deleted);
    }
    verify_author(original, deleted_by)
}

#[cfg(test)]
mod tests {
    use agora_core::PrivateKey;
    use agora_core::model::{Message, MessageKind};
    use agora_core::timestamp::Timestamp;

    use super::{Rejection, authorize_delete, authorize_edit, verify_message};

    fn signed(private_key: &PrivateKey, content: &str) -> Message {
        let mut message = Message {
            id: "m1".into(),
            room_id: "garden".into(),
            channel_id: "general".into(),
            kind: MessageKind::Text,
            sender: private_key.public_key(),
            sender_name: "ant".into(),
            content: content.into(),
            timestamp: Timestamp::new(10),
            signature: None,
            edited: false,
            edited_at: None,
            deleted: false,
            deleted_by: None,
            deleted_at: None,
            thread_root_id: None,
            reply_to_id: None,
        };
        message.sign(private_key).unwrap();
        message
    }

    #[test]
    fn edits_by_sender_only() {
        let ant = PrivateKey::new();
        let bat = PrivateKey::new();
        let original = signed(&ant, "hello");

        let mut edit = signed(&ant, "hello again");
        edit.edited = true;
        edit.sign(&ant).unwrap();
        assert_eq!(authorize_edit(Some(&original), &edit), Ok(()));

        // Validly signed by bat, but the original belongs to ant.
        let forged = signed(&bat, "hijacked");
        assert_eq!(
            authorize_edit(Some(&original), &forged),
            Err(Rejection::NotAuthor)
        );
        assert_eq!(
            authorize_edit(None, &edit),
            Err(Rejection::MissingOriginal)
        );

        let mut tampered = edit.clone();
        tampered.content = "HELLO".into();
        assert_eq!(verify_message(&tampered), Err(Rejection::InvalidSignature));

        let mut moved = edit.clone();
        moved.channel_id = "random".into();
        moved.sign(&ant).unwrap();
        assert_eq!(
            authorize_edit(Some(&original), &moved),
            Err(Rejection::ChannelMismatch)
        );
    }

    #[test]
    fn deletions_by_sender_only() {
        let ant = PrivateKey::new();
        let bat = PrivateKey::new();
        let mut original = signed(&ant, "hello");

        assert_eq!(
            authorize_delete(Some(&original), &bat.public_key()),
            Err(Rejection::NotAuthor)
        );
        assert_eq!(authorize_delete(Some(&original), &ant.public_key()), Ok(()));

        original.deleted = true;
        assert_eq!(
            authorize_delete(Some(&original), &ant.public_key()),
            Err(Rejection::Deleted)
        );
    }
}
