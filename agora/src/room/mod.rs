// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rooms materialized from a shared multi-writer log.
//!
//! A [`Room`] owns the engine applying its log, the member listener admitting new writers and
//! the cached views of all room domains. Every mutating operation appends one command to the log
//! and returns once the command was applied locally, so the cached views already reflect it.
mod handlers;
mod messages;
mod structure;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use agora_core::cbor::EncodeError;
use agora_core::command::room::{
    ADD_MEMBER, ADD_WRITER, CREATE_ROOM, REMOVE_MEMBER, REMOVE_WRITER, UPDATE_MEMBER, UPDATE_ROOM,
};
use agora_core::model::{self, Invite, Member as MemberRecord, MemberStatus, RoomKind, Writer, random_id};
use agora_core::{Domain, EncryptionKey, Hash, PrivateKey, PublicKey, Timestamp};
use agora_pairing::{
    Bound, Candidate, Confirmation, InviteCode, Member, Pairer, PairingError,
};
use agora_store::{Log, LogError, StoreError, TableStore};
use agora_stream::{Engine, EngineError, Event, RemoveById, RouterError};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use crate::admission::{self, AdmissionError, InviteOptions, LogAdmission};
use crate::backend::{Backend, OpenedLog};
use crate::config::RoomConfig;

pub use handlers::{
    AddMessage, DeleteMessage, EditMessage, MessageDeletion, RemoveReaction, cache, router,
};
pub use messages::{DEFAULT_MESSAGE_LIMIT, MessageOptions, MessageQuery};
pub use structure::{NewChannel, NewFile, NewRole};

/// Display name of a room creator without a name of its own.
const CREATOR_DISPLAY_NAME: &str = "Admin";

/// Display name of members added without one.
const MEMBER_DISPLAY_NAME: &str = "Member";

/// Display name of a joining user without a name of its own.
const JOINER_DISPLAY_NAME: &str = "New Member";

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),

    #[error("no author key to sign with")]
    NotAuthenticated,

    #[error("{0} {1} not found")]
    NotFound(&'static str, String),

    #[error("only the author can change {0} {1}")]
    NotAuthorized(&'static str, String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Identity signing messages and creating records in a room.
#[derive(Clone, Debug)]
pub struct Author {
    pub private_key: PrivateKey,
    pub display_name: String,
}

impl Author {
    pub fn new(private_key: PrivateKey, display_name: impl Into<String>) -> Self {
        Self {
            private_key,
            display_name: display_name.into(),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.private_key.public_key()
    }

    fn display_name_or(&self, fallback: &str) -> String {
        if self.display_name.trim().is_empty() {
            fallback.to_string()
        } else {
            self.display_name.clone()
        }
    }
}

/// Parameters of a new room.
#[derive(Clone, Debug, Default)]
pub struct NewRoom {
    pub name: String,
    pub description: String,
    pub kind: RoomKind,
    pub avatar: Option<String>,
    pub is_private: bool,
    pub is_encrypted: bool,
    pub settings: BTreeMap<String, String>,
}

impl NewRoom {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Partial update of the room record, unset fields keep their current value.
#[derive(Clone, Debug, Default)]
pub struct RoomUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<RoomKind>,
    pub avatar: Option<String>,
    pub is_private: Option<bool>,
    pub is_encrypted: Option<bool>,

    /// Merged into the current settings.
    pub settings: BTreeMap<String, String>,
}

/// Parameters of a new member.
#[derive(Clone, Debug)]
pub struct NewMember {
    pub user_key: PublicKey,
    pub display_name: Option<String>,

    /// Defaults to the plain member role when empty.
    pub roles: Vec<String>,

    pub invited_by: Option<PublicKey>,
}

impl NewMember {
    pub fn new(user_key: PublicKey) -> Self {
        Self {
            user_key,
            display_name: None,
            roles: Vec::new(),
            invited_by: None,
        }
    }
}

struct RoomInner<B: Backend> {
    id: OnceLock<String>,
    namespace: String,
    author: Option<Author>,
    engine: Engine<B::Log, B::Store>,
    member: Mutex<Option<Member>>,
    config: RoomConfig,
}

/// Handle to an open room.
///
/// Handles are cheap to clone, all clones refer to the same replica.
pub struct Room<B: Backend> {
    inner: Arc<RoomInner<B>>,
}

impl<B: Backend> Clone for Room<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for Room<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id())
            .field("key", &self.key())
            .field("local_key", &self.local_key())
            .finish()
    }
}

impl<B: Backend> Room<B> {
    /// Create a room on a new log, with the author as its first admin.
    pub async fn create(
        backend: &B,
        params: NewRoom,
        author: Author,
        config: RoomConfig,
    ) -> Result<Self, RoomError> {
        if params.name.trim().is_empty() {
            return Err(RoomError::MissingField("name"));
        }

        let id = random_id();
        let opened = backend.create_log(&id, EncryptionKey::random()).await?;
        let room = Self::from_log(
            opened,
            id.clone(),
            Some(id.clone()),
            Some(author.clone()),
            config,
        )?;

        let log = room.inner.engine.log();
        let record = model::Room {
            id: id.clone(),
            kind: params.kind,
            name: params.name,
            description: params.description,
            avatar: params.avatar,
            created_at: Timestamp::now(),
            created_by: author.public_key(),
            discovery_key: log.discovery_key(),
            key: log.key(),
            is_private: params.is_private,
            is_encrypted: params.is_encrypted,
            settings: params.settings,
        };
        let created = async {
            room.inner.engine.append(CREATE_ROOM, &record).await?;
            room.add_member(NewMember {
                display_name: Some(author.display_name_or(CREATOR_DISPLAY_NAME)),
                roles: vec![MemberRecord::ADMIN_ROLE.to_string()],
                ..NewMember::new(author.public_key())
            })
            .await?;
            room.start_member(backend).await
        }
        .await;
        if let Err(err) = created {
            room.close().await;
            return Err(err);
        }
        info!(room = %id, key = %log.key(), "created room");
        Ok(room)
    }

    /// Open a replica of a room this device already knows the log of.
    pub async fn open(
        backend: &B,
        namespace: &str,
        room_id: String,
        key: Hash,
        encryption_key: EncryptionKey,
        author: Option<Author>,
        config: RoomConfig,
    ) -> Result<Self, RoomError> {
        let opened = backend.open_log(namespace, key, encryption_key).await?;
        let room = Self::from_log(opened, namespace.to_string(), Some(room_id), author, config)?;
        if let Err(err) = room.start_member(backend).await {
            room.close().await;
            return Err(err);
        }
        debug!(room = %room.id(), %key, "opened room");
        Ok(room)
    }

    /// Join a room with an invite code and add the author as a member.
    ///
    /// The whole admission flow is bounded by the join timeout, the room is only returned once
    /// the local replica is writable.
    pub async fn join(
        backend: &B,
        namespace: String,
        code: &str,
        author: Author,
        config: RoomConfig,
    ) -> Result<Self, RoomError> {
        let invite: InviteCode = code.parse().map_err(PairingError::from)?;
        let candidate = Candidate::new(
            backend.transport().clone(),
            invite,
            backend.local_key(&namespace),
        );

        let mut pairer = Pairer::spawn(candidate, config.join_timeout, {
            let backend = backend.clone();
            let namespace = namespace.clone();
            let author = author.clone();
            let config = config.clone();
            move |confirmation: Confirmation| async move {
                let opened = backend
                    .open_log(&namespace, confirmation.key, confirmation.encryption_key)
                    .await?;
                Self::from_log(opened, namespace, None, Some(author), config)
            }
        });
        let room = pairer.finished().await?;

        // The admission of the local writer key comes after the room record in the log.
        let Some(record) = room.room() else {
            room.close().await;
            return Err(RoomError::NotFound("room", namespace));
        };
        let _ = room.inner.id.set(record.id.clone());

        let joined = async {
            room.add_member(NewMember {
                display_name: Some(author.display_name_or(JOINER_DISPLAY_NAME)),
                ..NewMember::new(author.public_key())
            })
            .await?;
            room.start_member(backend).await
        }
        .await;
        if let Err(err) = joined {
            room.close().await;
            return Err(err);
        }
        info!(room = %record.id, %namespace, "joined room");
        Ok(room)
    }

    fn from_log(
        opened: OpenedLog<B::Log, B::Store>,
        namespace: String,
        id: Option<String>,
        author: Option<Author>,
        config: RoomConfig,
    ) -> Result<Self, RoomError> {
        let engine_config = config.engine();
        let events = Engine::<B::Log, B::Store>::events_channel(&engine_config);
        let cache = handlers::cache(opened.store.clone(), events.clone());
        let router = handlers::router()?;
        let engine = Engine::spawn(
            opened.log,
            opened.batches,
            opened.store,
            router,
            cache,
            events,
            engine_config,
        );

        let cell = OnceLock::new();
        if let Some(id) = id {
            let _ = cell.set(id);
        }

        Ok(Self {
            inner: Arc::new(RoomInner {
                id: cell,
                namespace,
                author,
                engine,
                member: Mutex::new(None),
                config,
            }),
        })
    }

    async fn start_member(&self, backend: &B) -> Result<(), RoomError> {
        if !self.inner.config.replicate {
            return Ok(());
        }
        let topic = self.inner.engine.log().discovery_key();
        let member = Member::spawn(
            backend.transport(),
            topic,
            LogAdmission::new(self.inner.engine.clone()),
        )
        .await?;
        let previous = self
            .inner
            .member
            .lock()
            .expect("acquire lock on room member")
            .replace(member);
        drop(previous);
        Ok(())
    }

    /// Id of the room, known once the room record was created or replicated.
    pub fn id(&self) -> &str {
        self.inner
            .id
            .get()
            .map(String::as_str)
            .unwrap_or(&self.inner.namespace)
    }

    /// Local namespace the log of this room is stored under.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn key(&self) -> Hash {
        self.inner.engine.log().key()
    }

    pub fn discovery_key(&self) -> Hash {
        self.inner.engine.log().discovery_key()
    }

    pub fn encryption_key(&self) -> EncryptionKey {
        self.inner.engine.log().encryption_key()
    }

    /// Writer key of the local replica.
    pub fn local_key(&self) -> PublicKey {
        self.inner.engine.log().local_key()
    }

    pub fn author(&self) -> Option<&Author> {
        self.inner.author.as_ref()
    }

    pub fn engine(&self) -> &Engine<B::Log, B::Store> {
        &self.inner.engine
    }

    pub fn config(&self) -> &RoomConfig {
        &self.inner.config
    }

    pub fn is_writable(&self) -> bool {
        self.inner.engine.is_writable()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.engine.subscribe()
    }

    pub fn stream(&self) -> BroadcastStream<Event> {
        self.inner.engine.stream()
    }

    /// Refresh all cached views and emit their rows.
    pub async fn update(&self) {
        self.inner.engine.update().await;
    }

    fn require_author(&self) -> Result<&Author, RoomError> {
        self.inner.author.as_ref().ok_or(RoomError::NotAuthenticated)
    }

    fn records<R: TryFrom<agora_core::Row>>(&self, domain: Domain) -> Vec<R> {
        self.inner.engine.cache().records(domain)
    }

    /// Stop the reconciler, the member listener and finally the log.
    pub async fn close(&self) {
        self.inner.engine.stop_reconciler();
        let member = self
            .inner
            .member
            .lock()
            .expect("acquire lock on room member")
            .take();
        if let Some(member) = member {
            member.close().await;
        }
        self.inner.engine.close().await;
    }
}

/// Room record and writers.
impl<B: Backend> Room<B> {
    /// Cached room record, `None` until `create-room` was applied.
    pub fn room(&self) -> Option<model::Room> {
        self.records::<model::Room>(Domain::Room).into_iter().next()
    }

    pub async fn update_room(&self, update: RoomUpdate) -> Result<(), RoomError> {
        let mut record = self
            .inner
            .engine
            .store()
            .get::<model::Room>(self.id())
            .await?
            .ok_or_else(|| RoomError::NotFound("room", self.id().to_string()))?;

        if let Some(name) = update.name {
            record.name = name;
        }
        if let Some(description) = update.description {
            record.description = description;
        }
        if let Some(kind) = update.kind {
            record.kind = kind;
        }
        if let Some(avatar) = update.avatar {
            record.avatar = Some(avatar);
        }
        if let Some(is_private) = update.is_private {
            record.is_private = is_private;
        }
        if let Some(is_encrypted) = update.is_encrypted {
            record.is_encrypted = is_encrypted;
        }
        record.settings.extend(update.settings);

        self.inner.engine.append(UPDATE_ROOM, &record).await?;
        self.inner.engine.emit(Event::Edited {
            domain: Domain::Room,
            id: record.id,
        });
        Ok(())
    }

    /// Writer set of the local replica.
    pub fn writers(&self) -> Vec<PublicKey> {
        self.inner.engine.log().writers()
    }

    pub async fn add_writer(&self, key: PublicKey) -> Result<(), RoomError> {
        self.inner.engine.append(ADD_WRITER, &Writer { key }).await?;
        Ok(())
    }

    pub async fn remove_writer(&self, key: PublicKey) -> Result<(), RoomError> {
        self.inner
            .engine
            .append(REMOVE_WRITER, &Writer { key })
            .await?;
        Ok(())
    }
}

/// Invites.
impl<B: Backend> Room<B> {
    pub fn invites(&self) -> Vec<Invite> {
        self.records(Domain::Invites)
    }

    /// Create an invite to this room and return its code.
    pub async fn create_invite(&self, options: InviteOptions) -> Result<String, RoomError> {
        let code = admission::store_invite(
            &self.inner.engine,
            Some(self.id().to_string()),
            self.inner.config.invite_lifetime,
            options,
        )
        .await?;
        Ok(code)
    }

    pub async fn revoke_invite(&self, id: &Hash) -> Result<(), RoomError> {
        if !admission::revoke_invite(&self.inner.engine, id).await? {
            return Err(RoomError::NotFound("invite", id.to_hex()));
        }
        Ok(())
    }
}

/// Members.
impl<B: Backend> Room<B> {
    pub fn members(&self) -> Vec<MemberRecord> {
        self.records(Domain::Members)
    }

    /// Member row of the given user, if any.
    pub fn member(&self, user_key: &PublicKey) -> Option<MemberRecord> {
        self.members()
            .into_iter()
            .find(|member| &member.user_key == user_key)
    }

    /// Add a member and grant its key write access, returns the member id.
    pub async fn add_member(&self, params: NewMember) -> Result<String, RoomError> {
        let roles = if params.roles.is_empty() {
            vec![MemberRecord::DEFAULT_ROLE.to_string()]
        } else {
            params.roles
        };
        let member = MemberRecord {
            id: random_id(),
            room_id: self.id().to_string(),
            user_key: params.user_key,
            display_name: params
                .display_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| MEMBER_DISPLAY_NAME.to_string()),
            roles,
            joined_at: Timestamp::now(),
            invited_by: params.invited_by,
            status: MemberStatus::Active,
        };

        self.inner.engine.append(ADD_MEMBER, &member).await?;
        self.add_writer(member.user_key).await?;
        self.inner.engine.emit(Event::Created {
            domain: Domain::Members,
            id: member.id.clone(),
        });
        Ok(member.id)
    }

    pub async fn update_member(&self, member: MemberRecord) -> Result<(), RoomError> {
        self.inner.engine.append(UPDATE_MEMBER, &member).await?;
        self.inner.engine.emit(Event::Edited {
            domain: Domain::Members,
            id: member.id,
        });
        Ok(())
    }

    pub async fn remove_member(&self, id: &str) -> Result<(), RoomError> {
        if self
            .inner
            .engine
            .store()
            .get::<MemberRecord>(id)
            .await?
            .is_none()
        {
            return Err(RoomError::NotFound("member", id.to_string()));
        }
        self.inner
            .engine
            .append(REMOVE_MEMBER, &RemoveById { id: id.to_string() })
            .await?;
        self.inner.engine.emit(Event::Deleted {
            domain: Domain::Members,
            id: id.to_string(),
        });
        Ok(())
    }
}

impl<B: Backend> Bound for Room<B> {
    fn writable(&self) -> watch::Receiver<bool> {
        self.inner.engine.writable()
    }

    async fn close(&self) {
        Room::close(self).await;
    }
}
