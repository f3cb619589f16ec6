// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command handlers and cached views of room logs.
use agora_core::command::{Command, CommandTable, room};
use agora_core::model::{
    Category, Channel, FileRecord, Invite, Member, Mention, Message, PermissionOverride, Reaction,
    Role, Room, Thread, Writer,
};
use agora_core::{Domain, PublicKey, Timestamp};
use agora_store::{TableStore, Transaction};
use agora_stream::auth::{authorize_delete, authorize_edit, verify_author, verify_message};
use agora_stream::{
    AddInvite, AddWriter, ApplyContext, Event, Handler, HandlerError, Outcome, Rejection, Remove,
    RemoveWriter, Router, RouterError, Upsert, ViewCache,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Payload of `delete-message`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeletion {
    pub id: String,
    pub deleted_by: PublicKey,
    pub deleted_at: Timestamp,
}

/// Inserts a message signed by its sender.
///
/// A message can not be re-added over a tombstone or over a message of another sender.
pub struct AddMessage;

#[async_trait]
impl<S: TableStore> Handler<S> for AddMessage {
    async fn apply(
        &self,
        command: Command<'_>,
        cx: &mut ApplyContext<'_, S>,
    ) -> Result<Outcome, HandlerError> {
        let message: Message = command.decode_payload()?;
        if let Err(reason) = verify_message(&message) {
            return Ok(Outcome::Rejected(reason));
        }

        if let Some(existing) = cx.tx.get::<Message>(&message.id).await? {
            if let Err(reason) = authorize_edit(Some(&existing), &message) {
                return Ok(Outcome::Rejected(reason));
            }
        }

        cx.tx.delete::<Message>(&message.id).await?;
        cx.tx.insert(&message).await?;
        trace!(id = %message.id, channel = %message.channel_id, "added message");
        Ok(Outcome::Applied)
    }
}

/// Replaces a message with an edit signed by the original sender.
///
/// Edits moving the message to another channel are dropped.
pub struct EditMessage;

#[async_trait]
impl<S: TableStore> Handler<S> for EditMessage {
    async fn apply(
        &self,
        command: Command<'_>,
        cx: &mut ApplyContext<'_, S>,
    ) -> Result<Outcome, HandlerError> {
        let edit: Message = command.decode_payload()?;
        let original = cx.tx.get::<Message>(&edit.id).await?;
        if let Err(reason) = authorize_edit(original.as_ref(), &edit) {
            return Ok(Outcome::Rejected(reason));
        }

        cx.tx.delete::<Message>(&edit.id).await?;
        cx.tx.insert(&edit).await?;
        trace!(id = %edit.id, "edited message");
        Ok(Outcome::Applied)
    }
}

/// Turns a message of the deleting sender into a tombstone without content.
pub struct DeleteMessage;

#[async_trait]
impl<S: TableStore> Handler<S> for DeleteMessage {
    async fn apply(
        &self,
        command: Command<'_>,
        cx: &mut ApplyContext<'_, S>,
    ) -> Result<Outcome, HandlerError> {
        let deletion: MessageDeletion = command.decode_payload()?;
        let original = cx.tx.get::<Message>(&deletion.id).await?;
        if let Err(reason) = authorize_delete(original.as_ref(), &deletion.deleted_by) {
            return Ok(Outcome::Rejected(reason));
        }
        let Some(mut tombstone) = original else {
            return Ok(Outcome::Applied);
        };

        tombstone.content.clear();
        tombstone.deleted = true;
        tombstone.deleted_by = Some(deletion.deleted_by);
        tombstone.deleted_at = Some(deletion.deleted_at);

        cx.tx.delete::<Message>(&tombstone.id).await?;
        cx.tx.insert(&tombstone).await?;
        trace!(id = %tombstone.id, "deleted message");
        Ok(Outcome::Applied)
    }
}

/// Removes a reaction.
///
/// The payload is the full reaction, removals by anyone else than the reacting user are dropped.
pub struct RemoveReaction;

#[async_trait]
impl<S: TableStore> Handler<S> for RemoveReaction {
    async fn apply(
        &self,
        command: Command<'_>,
        cx: &mut ApplyContext<'_, S>,
    ) -> Result<Outcome, HandlerError> {
        let reaction: Reaction = command.decode_payload()?;
        if let Some(stored) = cx.tx.get::<Reaction>(&reaction.id).await? {
            if stored.user != reaction.user {
                return Ok(Outcome::Rejected(Rejection::NotAuthor));
            }
        }
        cx.tx.delete::<Reaction>(&reaction.id).await?;
        Ok(Outcome::Applied)
    }
}

/// Router with handlers for every command of room logs.
pub fn router<S: TableStore>() -> Result<Router<S>, RouterError> {
    let mut router = Router::new(CommandTable::room());
    router
        .register(room::REMOVE_WRITER, RemoveWriter)?
        .register(room::ADD_WRITER, AddWriter)?
        .register(room::ADD_INVITE, AddInvite)?
        .register(room::CREATE_ROOM, Upsert::<Room>::new())?
        .register(room::UPDATE_ROOM, Upsert::<Room>::new())?
        .register(room::ADD_MEMBER, Upsert::<Member>::new())?
        .register(room::UPDATE_MEMBER, Upsert::<Member>::new())?
        .register(room::REMOVE_MEMBER, Remove::<Member>::new())?
        .register(room::CREATE_ROLE, Upsert::<Role>::new())?
        .register(room::UPDATE_ROLE, Upsert::<Role>::new())?
        .register(room::DELETE_ROLE, Remove::<Role>::new())?
        .register(room::SET_PERMISSION_OVERRIDE, Upsert::<PermissionOverride>::new())?
        .register(room::CREATE_CHANNEL, Upsert::<Channel>::new())?
        .register(room::UPDATE_CHANNEL, Upsert::<Channel>::new())?
        .register(room::DELETE_CHANNEL, Remove::<Channel>::new())?
        .register(room::CREATE_CATEGORY, Upsert::<Category>::new())?
        .register(room::UPDATE_CATEGORY, Upsert::<Category>::new())?
        .register(room::DELETE_CATEGORY, Remove::<Category>::new())?
        .register(room::CREATE_THREAD, Upsert::<Thread>::new())?
        .register(room::UPDATE_THREAD, Upsert::<Thread>::new())?
        .register(room::ADD_MESSAGE, AddMessage)?
        .register(room::EDIT_MESSAGE, EditMessage)?
        .register(room::DELETE_MESSAGE, DeleteMessage)?
        .register(room::ADD_REACTION, Upsert::<Reaction>::new())?
        .register(room::REMOVE_REACTION, RemoveReaction)?
        .register(room::ADD_FILE, Upsert::<FileRecord>::new())?
        .register(room::ADD_MENTION, Upsert::<Mention>::new())?;
    Ok(router)
}

/// View cache with a table view for every domain of room logs.
pub fn cache<S: TableStore>(store: S, events: broadcast::Sender<Event>) -> ViewCache<S> {
    let mut cache = ViewCache::new(store, events);
    cache
        .register_table::<Room>(Domain::Room)
        .register_table::<Member>(Domain::Members)
        .register_table::<Channel>(Domain::Channels)
        .register_table::<Category>(Domain::Categories)
        .register_table::<Role>(Domain::Roles)
        .register_table::<PermissionOverride>(Domain::Permissions)
        .register_table::<Thread>(Domain::Threads)
        .register_table::<Message>(Domain::Messages)
        .register_table::<Reaction>(Domain::Reactions)
        .register_table::<FileRecord>(Domain::Files)
        .register_table::<Mention>(Domain::Mentions)
        .register_table::<Invite>(Domain::Invites)
        .register_table::<Writer>(Domain::Writers);
    cache
}

/// Returns true if `author` may edit or delete the message.
pub(crate) fn is_own_message(message: &Message, author: &PublicKey) -> bool {
    verify_author(message, author).is_ok()
}

#[cfg(test)]
mod tests {
    use agora_core::command::room;
    use agora_core::model::{Message, MessageKind, Reaction};
    use agora_core::{EncryptionKey, PrivateKey, Timestamp};
    use agora_store::{MemoryLog, MemoryLogNetwork, MemoryStore, TableStore, Transaction};
    use agora_stream::{ApplyContext, Outcome, Rejection, Router};

    use super::{MessageDeletion, router};

    fn message(private_key: &PrivateKey, id: &str, content: &str) -> Message {
        let mut message = Message {
            id: id.into(),
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

    struct Harness {
        log: MemoryLog,
        store: MemoryStore,
        router: Router<MemoryStore>,
        seq: u64,
    }

    impl Harness {
        fn new() -> Self {
            let network = MemoryLogNetwork::new();
            let (log, _batches) = network
                .create(PrivateKey::new().public_key(), EncryptionKey::random())
                .unwrap();
            Self {
                log,
                store: MemoryStore::new(),
                router: router().unwrap(),
                seq: 0,
            }
        }

        async fn apply<T: serde::Serialize>(&mut self, name: &str, payload: &T) -> Outcome {
            let bytes = self.router.table().encode(name, payload).unwrap();
            let mut tx = self.store.transaction();
            let mut cx = ApplyContext::<MemoryStore> {
                tx: &mut tx,
                writers: &self.log,
                seq: self.seq,
                writer: PrivateKey::new().public_key(),
            };
            let dispatched = self.router.dispatch(&bytes, &mut cx).await.unwrap();
            tx.flush().await.unwrap();
            self.seq += 1;
            dispatched.outcome
        }

        async fn message(&self, id: &str) -> Option<Message> {
            self.store.get::<Message>(id).await.unwrap()
        }
    }

    #[tokio::test]
    async fn unsigned_messages_are_dropped() {
        let mut harness = Harness::new();
        let ant = PrivateKey::new();

        let mut unsigned = message(&ant, "m1", "hello");
        unsigned.signature = None;
        assert_eq!(
            harness.apply(room::ADD_MESSAGE, &unsigned).await,
            Outcome::Rejected(Rejection::InvalidSignature)
        );
        assert!(harness.message("m1").await.is_none());

        let mut tampered = message(&ant, "m1", "hello");
        tampered.content = "HELLO".into();
        assert_eq!(
            harness.apply(room::ADD_MESSAGE, &tampered).await,
            Outcome::Rejected(Rejection::InvalidSignature)
        );

        let signed = message(&ant, "m1", "hello");
        assert_eq!(harness.apply(room::ADD_MESSAGE, &signed).await, Outcome::Applied);
        assert_eq!(harness.message("m1").await, Some(signed));
    }

    #[tokio::test]
    async fn edits_by_other_senders_leave_message_unchanged() {
        let mut harness = Harness::new();
        let ant = PrivateKey::new();
        let bat = PrivateKey::new();

        let original = message(&ant, "m1", "hello");
        harness.apply(room::ADD_MESSAGE, &original).await;

        // Scenario: bat signs a valid edit of ant's message.
        let mut forged = message(&bat, "m1", "hijacked");
        forged.edited = true;
        forged.sign(&bat).unwrap();
        assert_eq!(
            harness.apply(room::EDIT_MESSAGE, &forged).await,
            Outcome::Rejected(Rejection::NotAuthor)
        );
        assert_eq!(
            harness.apply(room::ADD_MESSAGE, &forged).await,
            Outcome::Rejected(Rejection::NotAuthor)
        );
        assert_eq!(harness.message("m1").await, Some(original.clone()));

        // Edits can not move the message to another channel.
        let mut moved = message(&ant, "m1", "hello again");
        moved.channel_id = "random".into();
        moved.edited = true;
        moved.sign(&ant).unwrap();
        assert_eq!(
            harness.apply(room::EDIT_MESSAGE, &moved).await,
            Outcome::Rejected(Rejection::ChannelMismatch)
        );
        assert_eq!(harness.message("m1").await, Some(original.clone()));

        let mut edit = message(&ant, "m1", "hello again");
        edit.edited = true;
        edit.edited_at = Some(Timestamp::new(20));
        edit.sign(&ant).unwrap();
        assert_eq!(harness.apply(room::EDIT_MESSAGE, &edit).await, Outcome::Applied);

        // The stored record is the signed edit and still verifies against its sender.
        let stored = harness.message("m1").await.unwrap();
        assert_eq!(stored.content, "hello again");
        assert_eq!(stored.channel_id, "general");
        assert!(stored.edited);
        assert!(stored.verify_signature());

        assert_eq!(
            harness
                .apply(room::EDIT_MESSAGE, &message(&ant, "m2", "nothing"))
                .await,
            Outcome::Rejected(Rejection::MissingOriginal)
        );
    }

    #[tokio::test]
    async fn deleted_messages_stay_tombstones() {
        let mut harness = Harness::new();
        let ant = PrivateKey::new();
        let bat = PrivateKey::new();

        let original = message(&ant, "m1", "hello");
        harness.apply(room::ADD_MESSAGE, &original).await;

        let by_bat = MessageDeletion {
            id: "m1".into(),
            deleted_by: bat.public_key(),
            deleted_at: Timestamp::new(30),
        };
        assert_eq!(
            harness.apply(room::DELETE_MESSAGE, &by_bat).await,
            Outcome::Rejected(Rejection::NotAuthor)
        );

        let by_ant = MessageDeletion {
            deleted_by: ant.public_key(),
            ..by_bat
        };
        assert_eq!(harness.apply(room::DELETE_MESSAGE, &by_ant).await, Outcome::Applied);

        let tombstone = harness.message("m1").await.unwrap();
        assert!(tombstone.deleted);
        assert!(tombstone.content.is_empty());
        assert_eq!(tombstone.deleted_by, Some(ant.public_key()));
        assert_eq!(tombstone.deleted_at, Some(Timestamp::new(30)));

        // Neither a second deletion nor re-adding the message revives it.
        assert_eq!(
            harness.apply(room::DELETE_MESSAGE, &by_ant).await,
            Outcome::Rejected(Rejection::Deleted)
        );
        assert_eq!(
            harness.apply(room::ADD_MESSAGE, &original).await,
            Outcome::Rejected(Rejection::Deleted)
        );
        assert_eq!(harness.message("m1").await, Some(tombstone));
    }

    #[tokio::test]
    async fn reactions_are_removed_by_their_user() {
        let mut harness = Harness::new();
        let ant = PrivateKey::new().public_key();
        let bat = PrivateKey::new().public_key();

        let reaction = Reaction {
            id: "r1".into(),
            message_id: "m1".into(),
            emoji: "🌱".into(),
            user: ant,
            timestamp: Timestamp::new(10),
        };
        harness.apply(room::ADD_REACTION, &reaction).await;

        let by_bat = Reaction {
            user: bat,
            ..reaction.clone()
        };
        assert_eq!(
            harness.apply(room::REMOVE_REACTION, &by_bat).await,
            Outcome::Rejected(Rejection::NotAuthor)
        );
        assert!(harness.store.get::<Reaction>("r1").await.unwrap().is_some());

        assert_eq!(
            harness.apply(room::REMOVE_REACTION, &reaction).await,
            Outcome::Applied
        );
        assert!(harness.store.get::<Reaction>("r1").await.unwrap().is_none());
    }
}
