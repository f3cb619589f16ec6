// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signed messages and their reactions.
use agora_core::command::room::{
    ADD_MESSAGE, ADD_REACTION, DELETE_MESSAGE, EDIT_MESSAGE, REMOVE_REACTION,
};
use agora_core::model::{Message, MessageKind, Reaction, random_id};
use agora_core::{Domain, Timestamp};
use agora_store::TableStore;
use agora_stream::Event;
use tracing::debug;

use crate::backend::Backend;
use crate::room::handlers::{MessageDeletion, is_own_message};
use crate::room::{Room, RoomError};

/// Number of messages returned by a query without an explicit limit.
pub const DEFAULT_MESSAGE_LIMIT: usize = 50;

/// Sender name of messages whose author has no display name.
const UNKNOWN_SENDER: &str = "Unknown User";

/// Options of a sent message.
#[derive(Clone, Debug, Default)]
pub struct MessageOptions {
    pub kind: MessageKind,
    pub reply_to_id: Option<String>,

    /// Defaults to `reply_to_id`.
    pub thread_root_id: Option<String>,
}

/// Window of messages returned by a query.
///
/// Both bounds are exclusive. The newest `limit` messages of the window are returned, oldest
/// first. Without `before` the window is open towards the future.
#[derive(Clone, Debug)]
pub struct MessageQuery {
    pub limit: usize,

    pub before: Option<Timestamp>,

    pub after: Timestamp,
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_MESSAGE_LIMIT,
            before: None,
            after: Timestamp::default(),
        }
    }
}

impl MessageQuery {
    fn select(&self, messages: impl Iterator<Item = Message>) -> Vec<Message> {
        let mut selected: Vec<Message> = messages
            .filter(|message| {
                !message.deleted
                    && message.timestamp > self.after
                    && self.before.is_none_or(|before| message.timestamp < before)
            })
            .collect();
        selected.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let skip = selected.len().saturating_sub(self.limit);
        selected.split_off(skip)
    }
}

impl<B: Backend> Room<B> {
    /// Sign and send a message to a channel, returns the message id.
    pub async fn send_message(
        &self,
        channel_id: &str,
        content: impl Into<String>,
        options: MessageOptions,
    ) -> Result<String, RoomError> {
        let content = content.into();
        if channel_id.trim().is_empty() {
            return Err(RoomError::MissingField("channel_id"));
        }
        if content.is_empty() {
            return Err(RoomError::MissingField("content"));
        }
        let author = self.require_author()?;

        let sender_name = if author.display_name.trim().is_empty() {
            UNKNOWN_SENDER.to_string()
        } else {
            author.display_name.clone()
        };
        let mut message = Message {
            id: random_id(),
            room_id: self.id().to_string(),
            channel_id: channel_id.to_string(),
            kind: options.kind,
            sender: author.public_key(),
            sender_name,
            content,
            timestamp: Timestamp::now(),
            signature: None,
            edited: false,
            edited_at: None,
            deleted: false,
            deleted_by: None,
            deleted_at: None,
            thread_root_id: options.thread_root_id.or_else(|| options.reply_to_id.clone()),
            reply_to_id: options.reply_to_id,
        };
        message.sign(&author.private_key)?;

        self.inner.engine.append(ADD_MESSAGE, &message).await?;
        self.inner.engine.emit(Event::Created {
            domain: Domain::Messages,
            id: message.id.clone(),
        });
        Ok(message.id)
    }

    /// Replace the content of one of the author's own messages.
    pub async fn edit_message(&self, id: &str, content: impl Into<String>) -> Result<(), RoomError> {
        let content = content.into();
        if content.is_empty() {
            return Err(RoomError::MissingField("content"));
        }
        let author = self.require_author()?;

        let mut message = match self.get_message(id).await? {
            Some(message) if !message.deleted => message,
            _ => return Err(RoomError::NotFound("message", id.to_string())),
        };
        if !is_own_message(&message, &author.public_key()) {
            return Err(RoomError::NotAuthorized("message", id.to_string()));
        }

        message.content = content;
        message.edited = true;
        message.edited_at = Some(Timestamp::now());
        message.sign(&author.private_key)?;

        self.inner.engine.append(EDIT_MESSAGE, &message).await?;
        self.inner.engine.emit(Event::Edited {
            domain: Domain::Messages,
            id: id.to_string(),
        });
        Ok(())
    }

    /// Turn a message into a tombstone.
    ///
    /// With `force` the local authorship check is skipped, replicas still drop deletions of
    /// messages by other senders.
    pub async fn delete_message(&self, id: &str, force: bool) -> Result<(), RoomError> {
        let author = self.require_author()?;

        let message = match self.get_message(id).await? {
            Some(message) if !message.deleted => message,
            _ => return Err(RoomError::NotFound("message", id.to_string())),
        };
        if !force && !is_own_message(&message, &author.public_key()) {
            return Err(RoomError::NotAuthorized("message", id.to_string()));
        }

        let deletion = MessageDeletion {
            id: id.to_string(),
            deleted_by: author.public_key(),
            deleted_at: Timestamp::now(),
        };
        self.inner.engine.append(DELETE_MESSAGE, &deletion).await?;
        debug!(id, force, "deleted message");
        self.inner.engine.emit(Event::Deleted {
            domain: Domain::Messages,
            id: id.to_string(),
        });
        Ok(())
    }

    /// Stored message, including tombstones.
    pub async fn get_message(&self, id: &str) -> Result<Option<Message>, RoomError> {
        Ok(self.inner.engine.store().get::<Message>(id).await?)
    }

    /// Messages of a channel, oldest first.
    pub fn get_messages(&self, channel_id: &str, query: &MessageQuery) -> Vec<Message> {
        query.select(
            self.records::<Message>(Domain::Messages)
                .into_iter()
                .filter(|message| message.channel_id == channel_id),
        )
    }

    /// Messages of the thread started by `thread_root_id`, oldest first.
    pub fn get_thread_messages(&self, thread_root_id: &str, query: &MessageQuery) -> Vec<Message> {
        query.select(
            self.records::<Message>(Domain::Messages)
                .into_iter()
                .filter(|message| message.thread_root_id.as_deref() == Some(thread_root_id)),
        )
    }

    /// React to a message, returns the reaction id.
    pub async fn add_reaction(&self, message_id: &str, emoji: &str) -> Result<String, RoomError> {
        if message_id.trim().is_empty() {
            return Err(RoomError::MissingField("message_id"));
        }
        if emoji.is_empty() {
            return Err(RoomError::MissingField("emoji"));
        }
        let author = self.require_author()?;

        let reaction = Reaction {
            id: random_id(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            user: author.public_key(),
            timestamp: Timestamp::now(),
        };
        self.inner.engine.append(ADD_REACTION, &reaction).await?;
        Ok(reaction.id)
    }

    /// Remove the author's own reaction with this emoji from a message.
    pub async fn remove_reaction(&self, message_id: &str, emoji: &str) -> Result<(), RoomError> {
        let author = self.require_author()?;
        let user = author.public_key();

        let reaction = self
            .get_reactions(message_id)
            .into_iter()
            .find(|reaction| reaction.emoji == emoji && reaction.user == user)
            .ok_or_else(|| RoomError::NotFound("reaction", format!("{message_id} {emoji}")))?;

        self.inner.engine.append(REMOVE_REACTION, &reaction).await?;
        Ok(())
    }

    pub fn get_reactions(&self, message_id: &str) -> Vec<Reaction> {
        self.records::<Reaction>(Domain::Reactions)
            .into_iter()
            .filter(|reaction| reaction.message_id == message_id)
            .collect()
    }
}
