// SPDX-License-Identifier: MIT OR Apache-2.0

//! Users: an identity derived from a seed phrase, its profile, devices and rooms.
//!
//! The user log is shared between all devices of an identity. Besides the profile and settings
//! it keeps the list of rooms the user is a member of, which is what every device opens its
//! [`Room`] instances from.
mod handlers;

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use agora_core::cbor::{DecodeError, EncodeError};
use agora_core::command::user::{
    ADD_WRITER, REMOVE_WRITER, SET_IDENTITY, SET_PROFILE, UPDATE_DEVICES, UPDATE_ROOMS,
    UPDATE_SETTINGS,
};
use agora_core::model::{
    Device, DeviceList, Identity, Invite, Profile, RoomList, RoomMembership, Settings, Writer,
};
use agora_core::{Domain, Hash, PublicKey, SeedKeys, Timestamp};
use agora_pairing::{
    Bound, Candidate, Confirmation, InviteCode, Member, Pairer, PairingError, namespace,
};
use agora_store::{Log, LogError, StoreError, TableStore};
use agora_stream::{Engine, EngineError, Event, RouterError};
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admission::{self, AdmissionError, InviteOptions, LogAdmission};
use crate::backend::{Backend, OpenedLog, USER_NAMESPACE};
use crate::config::UserConfig;
use crate::recovery::{self, RecoveryError, RecoveryResponder};
use crate::room::{Author, NewRoom, Room, RoomError};

pub use handlers::{cache, router};

/// Number of public key hex characters in the default display name.
const DEFAULT_NAME_KEY_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),

    #[error("user log has no identity")]
    IdentityMissing,

    #[error("{0} {1} not found")]
    NotFound(&'static str, String),

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
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Partial update of the profile, unset fields keep their current value.
#[derive(Clone, Debug, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub status: Option<String>,

    /// Merged into the current metadata.
    pub metadata: BTreeMap<String, String>,
}

/// Entry of the rooms list with only the id set, for partial updates.
pub fn membership(room_id: impl Into<String>) -> RoomMembership {
    let now = Timestamp::now();
    RoomMembership {
        room_id: room_id.into(),
        name: String::new(),
        description: String::new(),
        key: None,
        discovery_key: None,
        encryption_key: None,
        namespace: String::new(),
        invite_code: None,
        invite_hash: None,
        created_at: now,
        last_accessed: now,
    }
}

/// Room opened by this user and the task forwarding its events.
struct OpenRoom<B: Backend> {
    room: Room<B>,
    forward: CancellationToken,
}

struct UserInner<B: Backend> {
    backend: B,
    config: UserConfig,
    engine: Engine<B::Log, B::Store>,
    keys: OnceLock<SeedKeys>,
    rooms: Mutex<HashMap<String, OpenRoom<B>>>,
    member: Mutex<Option<Member>>,
    recovery: Mutex<Option<RecoveryResponder>>,
    shutdown: CancellationToken,
}

/// Handle to the user log of this device.
///
/// Handles are cheap to clone, all clones refer to the same replica.
pub struct User<B: Backend> {
    inner: Arc<UserInner<B>>,
}

impl<B: Backend> Clone for User<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for User<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("key", &self.key())
            .field("local_key", &self.local_key())
            .finish_non_exhaustive()
    }
}

impl<B: Backend> User<B> {
    /// Create a user log for the identity derived from `seed`.
    pub async fn create(backend: &B, seed: &str, config: UserConfig) -> Result<Self, UserError> {
        if seed.trim().is_empty() {
            return Err(UserError::MissingField("seed"));
        }
        let keys = SeedKeys::derive(seed);
        let opened = backend
            .create_log(USER_NAMESPACE, keys.encryption_key)
            .await?;
        let user = Self::from_log(backend, opened, config)?;

        let identity = Identity {
            public_key: keys.public_key,
            discovery_key: keys.discovery_key,
            seed: seed.to_string(),
        };
        user.inner.engine.append(SET_IDENTITY, &identity).await?;

        let hex = keys.public_key.to_hex();
        let profile = Profile {
            key: keys.public_key,
            display_name: format!("User-{}", &hex[..DEFAULT_NAME_KEY_LEN]),
            avatar: None,
            status: Profile::DEFAULT_STATUS.to_string(),
            metadata: BTreeMap::new(),
        };
        user.inner.engine.append(SET_PROFILE, &profile).await?;

        let _ = user.inner.keys.set(keys);
        user.start_listeners().await?;
        info!(public_key = %identity.public_key, "created user");
        Ok(user)
    }

    /// Pair this device with an existing device of the user, using a pairing invite code.
    pub async fn pair_device(backend: &B, code: &str, config: UserConfig) -> Result<Self, UserError> {
        let invite: InviteCode = code.parse().map_err(PairingError::from)?;
        let candidate = Candidate::new(
            backend.transport().clone(),
            invite,
            backend.local_key(USER_NAMESPACE),
        );

        let mut pairer = Pairer::spawn(candidate, config.pair_timeout, {
            let backend = backend.clone();
            let config = config.clone();
            move |confirmation: Confirmation| async move {
                let opened = backend
                    .open_log(USER_NAMESPACE, confirmation.key, confirmation.encryption_key)
                    .await?;
                Self::from_log(&backend, opened, config)
            }
        });
        let user = pairer.finished().await?;

        // The identity is the first entry of every user log.
        let Some(identity) = user.identity() else {
            user.close().await;
            return Err(UserError::IdentityMissing);
        };
        let _ = user.inner.keys.set(SeedKeys::derive(&identity.seed));

        user.start_listeners().await?;
        info!(public_key = %identity.public_key, "paired device");
        Ok(user)
    }

    /// Recover the user log of the identity derived from `seed`.
    ///
    /// Other devices of the identity are asked for a pairing invite. When none answers in time,
    /// a fresh user log is created for the identity.
    pub async fn recover_from_seed(
        backend: &B,
        seed: &str,
        config: UserConfig,
    ) -> Result<Self, UserError> {
        let keys = SeedKeys::derive(seed);
        let request = recovery::request_invite(backend.transport(), &keys);
        match tokio::time::timeout(config.recovery_timeout, request).await {
            Ok(code) => {
                let code = code?;
                debug!(public_key = %keys.public_key, "received recovery invite");
                Self::pair_device(backend, &code, config).await
            }
            Err(_) => {
                info!(public_key = %keys.public_key, "no device answered, creating user log");
                Self::create(backend, seed, config).await
            }
        }
    }

    fn from_log(
        backend: &B,
        opened: OpenedLog<B::Log, B::Store>,
        config: UserConfig,
    ) -> Result<Self, UserError> {
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

        Ok(Self {
            inner: Arc::new(UserInner {
                backend: backend.clone(),
                config,
                engine,
                keys: OnceLock::new(),
                rooms: Mutex::new(HashMap::new()),
                member: Mutex::new(None),
                recovery: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    async fn start_listeners(&self) -> Result<(), UserError> {
        if !self.inner.config.replicate {
            return Ok(());
        }
        let transport = self.inner.backend.transport();

        let member = Member::spawn(
            transport,
            self.inner.engine.log().discovery_key(),
            LogAdmission::new(self.inner.engine.clone()),
        )
        .await?;
        let previous = self
            .inner
            .member
            .lock()
            .expect("acquire lock on user member")
            .replace(member);
        drop(previous);

        if let Some(keys) = self.inner.keys.get() {
            let responder = RecoveryResponder::spawn(
                transport,
                keys,
                self.inner.engine.clone(),
                self.inner.config.invite_lifetime,
            )
            .await?;
            let previous = self
                .inner
                .recovery
                .lock()
                .expect("acquire lock on recovery responder")
                .replace(responder);
            drop(previous);
        }
        Ok(())
    }

    pub fn engine(&self) -> &Engine<B::Log, B::Store> {
        &self.inner.engine
    }

    pub fn config(&self) -> &UserConfig {
        &self.inner.config
    }

    pub fn key(&self) -> Hash {
        self.inner.engine.log().key()
    }

    pub fn discovery_key(&self) -> Hash {
        self.inner.engine.log().discovery_key()
    }

    /// Writer key of this device.
    pub fn local_key(&self) -> PublicKey {
        self.inner.engine.log().local_key()
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

    /// Stop the reconciler, the listeners and all rooms, then the user log itself.
    pub async fn close(&self) {
        self.inner.engine.stop_reconciler();

        let member = self
            .inner
            .member
            .lock()
            .expect("acquire lock on user member")
            .take();
        if let Some(member) = member {
            member.close().await;
        }
        let recovery = self
            .inner
            .recovery
            .lock()
            .expect("acquire lock on recovery responder")
            .take();
        if let Some(recovery) = recovery {
            recovery.close().await;
        }

        self.close_all_rooms().await;
        self.inner.shutdown.cancel();
        self.inner.engine.close().await;
    }

    fn records<R: TryFrom<agora_core::Row>>(&self, domain: Domain) -> Vec<R> {
        self.inner.engine.cache().records(domain)
    }
}

/// Identity, profile and writers.
impl<B: Backend> User<B> {
    pub fn identity(&self) -> Option<Identity> {
        self.records::<Identity>(Domain::Identity).into_iter().next()
    }

    /// Keys derived from the seed of the identity.
    pub fn keys(&self) -> Option<&SeedKeys> {
        self.inner.keys.get()
    }

    pub fn public_key(&self) -> Result<PublicKey, UserError> {
        self.keys()
            .map(|keys| keys.public_key)
            .ok_or(UserError::IdentityMissing)
    }

    pub fn profile(&self) -> Option<Profile> {
        let public_key = self.public_key().ok()?;
        self.records::<Profile>(Domain::Profile)
            .into_iter()
            .find(|profile| profile.key == public_key)
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, UserError> {
        let public_key = self.public_key()?;
        let mut profile = self.profile().unwrap_or_else(|| Profile {
            key: public_key,
            display_name: String::new(),
            avatar: None,
            status: Profile::DEFAULT_STATUS.to_string(),
            metadata: BTreeMap::new(),
        });

        if let Some(display_name) = update.display_name {
            profile.display_name = display_name;
        }
        if let Some(avatar) = update.avatar {
            profile.avatar = Some(avatar);
        }
        if let Some(status) = update.status {
            profile.status = status;
        }
        profile.metadata.extend(update.metadata);

        self.inner.engine.append(SET_PROFILE, &profile).await?;
        self.inner.engine.emit(Event::Edited {
            domain: Domain::Profile,
            id: public_key.to_hex(),
        });
        Ok(profile)
    }

    /// Author signing room messages in the name of this user.
    pub fn author(&self) -> Result<Author, UserError> {
        let keys = self.keys().ok_or(UserError::IdentityMissing)?;
        let display_name = self
            .profile()
            .map(|profile| profile.display_name)
            .unwrap_or_default();
        Ok(Author::new(keys.private_key.clone(), display_name))
    }

    /// Writer set of the user log, one key per paired device.
    pub fn writers(&self) -> Vec<PublicKey> {
        self.inner.engine.log().writers()
    }

    pub async fn add_writer(&self, key: PublicKey) -> Result<(), UserError> {
        self.inner.engine.append(ADD_WRITER, &Writer { key }).await?;
        Ok(())
    }

    pub async fn remove_writer(&self, key: PublicKey) -> Result<(), UserError> {
        self.inner
            .engine
            .append(REMOVE_WRITER, &Writer { key })
            .await?;
        Ok(())
    }

    pub fn invites(&self) -> Vec<Invite> {
        self.records(Domain::Invites)
    }

    /// Create an invite for pairing another device with this user log.
    pub async fn create_pairing_invite(&self, options: InviteOptions) -> Result<String, UserError> {
        let code = admission::store_invite(
            &self.inner.engine,
            None,
            self.inner.config.invite_lifetime,
            options,
        )
        .await?;
        Ok(code)
    }

    pub async fn revoke_pairing_invite(&self, id: &Hash) -> Result<(), UserError> {
        if !admission::revoke_invite(&self.inner.engine, id).await? {
            return Err(UserError::NotFound("invite", id.to_hex()));
        }
        Ok(())
    }
}

/// Rooms list.
impl<B: Backend> User<B> {
    /// Rooms the user is a member of.
    pub fn rooms(&self) -> Vec<RoomMembership> {
        let Ok(public_key) = self.public_key() else {
            return Vec::new();
        };
        self.records::<RoomList>(Domain::Rooms)
            .into_iter()
            .find(|list| list.key == public_key)
            .map(|list| list.rooms)
            .unwrap_or_default()
    }

    async fn room_list(&self) -> Result<RoomList, UserError> {
        let public_key = self.public_key()?;
        let list = self
            .inner
            .engine
            .store()
            .get::<RoomList>(&public_key.to_hex())
            .await?;
        Ok(list.unwrap_or_else(|| RoomList::new(public_key)))
    }

    /// Add a room or merge the set fields into the known entry.
    pub async fn add_room(&self, mut room: RoomMembership) -> Result<Vec<RoomMembership>, UserError> {
        if room.room_id.trim().is_empty() {
            return Err(UserError::MissingField("room_id"));
        }
        let mut list = self.room_list().await?;
        if list.get(&room.room_id).is_none() && room.namespace.is_empty() {
            room.namespace = room.room_id.clone();
        }
        list.upsert(room, Timestamp::now());

        self.inner.engine.append(UPDATE_ROOMS, &list).await?;
        Ok(list.rooms)
    }

    pub async fn remove_room(&self, room_id: &str) -> Result<Vec<RoomMembership>, UserError> {
        let mut list = self.room_list().await?;
        if list.remove(room_id) {
            self.inner.engine.append(UPDATE_ROOMS, &list).await?;
        }
        Ok(list.rooms)
    }

    /// Replace the whole rooms list.
    pub async fn update_rooms(&self, rooms: Vec<RoomMembership>) -> Result<(), UserError> {
        let list = RoomList {
            key: self.public_key()?,
            rooms,
        };
        self.inner.engine.append(UPDATE_ROOMS, &list).await?;
        Ok(())
    }
}

/// Devices and settings.
impl<B: Backend> User<B> {
    pub fn devices(&self) -> Vec<Device> {
        let Ok(public_key) = self.public_key() else {
            return Vec::new();
        };
        self.records::<DeviceList>(Domain::Devices)
            .into_iter()
            .find(|list| list.key == public_key)
            .map(|list| list.devices)
            .unwrap_or_default()
    }

    async fn device_list(&self) -> Result<DeviceList, UserError> {
        let public_key = self.public_key()?;
        let list = self
            .inner
            .engine
            .store()
            .get::<DeviceList>(&public_key.to_hex())
            .await?;
        Ok(list.unwrap_or_else(|| DeviceList::new(public_key)))
    }

    /// Add a device or refresh when it was last seen.
    pub async fn add_device(
        &self,
        public_key: PublicKey,
        name: impl Into<String>,
    ) -> Result<Vec<Device>, UserError> {
        let mut list = self.device_list().await?;
        list.upsert(Device {
            public_key,
            name: name.into(),
            last_seen: Timestamp::now(),
        });
        self.inner.engine.append(UPDATE_DEVICES, &list).await?;
        Ok(list.devices)
    }

    pub async fn remove_device(&self, public_key: &PublicKey) -> Result<Vec<Device>, UserError> {
        let mut list = self.device_list().await?;
        if list.remove(public_key) {
            self.inner.engine.append(UPDATE_DEVICES, &list).await?;
        }
        Ok(list.devices)
    }

    pub fn settings(&self) -> BTreeMap<String, String> {
        let Ok(public_key) = self.public_key() else {
            return BTreeMap::new();
        };
        self.records::<Settings>(Domain::Settings)
            .into_iter()
            .find(|settings| settings.key == public_key)
            .map(|settings| settings.values)
            .unwrap_or_default()
    }

    /// Merge the given values into the settings.
    pub async fn update_settings(
        &self,
        values: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, UserError> {
        let key = self.public_key()?;
        let mut settings = Settings {
            key,
            values: self.settings(),
        };
        settings.merge(values);
        self.inner.engine.append(UPDATE_SETTINGS, &settings).await?;
        Ok(settings.values)
    }
}

/// Room instances.
impl<B: Backend> User<B> {
    /// Create a room owned by this user and add it to the rooms list.
    pub async fn create_room(&self, params: NewRoom) -> Result<Room<B>, UserError> {
        let author = self.author()?;
        let room = Room::create(
            &self.inner.backend,
            params,
            author,
            self.inner.config.room.clone(),
        )
        .await?;

        let record = room.room();
        let entry = RoomMembership {
            name: record.as_ref().map(|room| room.name.clone()).unwrap_or_default(),
            description: record.map(|room| room.description).unwrap_or_default(),
            key: Some(room.key()),
            discovery_key: Some(room.discovery_key()),
            encryption_key: Some(room.encryption_key()),
            namespace: room.namespace().to_string(),
            ..membership(room.id())
        };
        self.add_room(entry).await?;

        let room = self.track_room(room).await;
        self.inner.engine.emit(Event::Created {
            domain: Domain::Rooms,
            id: room.id().to_string(),
        });
        Ok(room)
    }

    /// Join a room with an invite code and add it to the rooms list.
    pub async fn join_room(&self, code: &str) -> Result<Room<B>, UserError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(UserError::MissingField("invite"));
        }
        let author = self.author()?;
        let namespace = namespace(code);
        let room = Room::join(
            &self.inner.backend,
            namespace.clone(),
            code,
            author,
            self.inner.config.room.clone(),
        )
        .await?;

        let record = room.room();
        let entry = RoomMembership {
            name: record.as_ref().map(|room| room.name.clone()).unwrap_or_default(),
            description: record.map(|room| room.description).unwrap_or_default(),
            key: Some(room.key()),
            discovery_key: Some(room.discovery_key()),
            encryption_key: Some(room.encryption_key()),
            namespace,
            invite_code: Some(code.to_string()),
            invite_hash: Some(Hash::new(code.as_bytes())),
            ..membership(room.id())
        };
        self.add_room(entry).await?;

        let room = self.track_room(room).await;
        self.inner.engine.emit(Event::RoomJoined {
            room_id: room.id().to_string(),
        });
        Ok(room)
    }

    /// Open room instance, opened from the rooms list if needed.
    ///
    /// Rooms can be looked up by id or by namespace.
    pub async fn get_room(&self, room_id: &str) -> Result<Room<B>, UserError> {
        if let Some(room) = self.open_room(room_id) {
            return Ok(room);
        }

        let entry = self
            .rooms()
            .into_iter()
            .find(|room| room.room_id == room_id || room.namespace == room_id)
            .ok_or_else(|| UserError::NotFound("room", room_id.to_string()))?;
        if let Some(room) = self.open_room(&entry.room_id) {
            return Ok(room);
        }
        let (Some(key), Some(encryption_key)) = (entry.key, entry.encryption_key) else {
            return Err(UserError::NotFound("room", room_id.to_string()));
        };

        let room = Room::open(
            &self.inner.backend,
            &entry.namespace,
            entry.room_id.clone(),
            key,
            encryption_key,
            self.author().ok(),
            self.inner.config.room.clone(),
        )
        .await?;

        let room = self.track_room(room).await;
        self.inner.engine.emit(Event::RoomInitialized {
            room_id: entry.room_id,
        });
        Ok(room)
    }

    /// Leave a room: remove the own member row, close the instance and forget the room.
    pub async fn leave_room(&self, room_id: &str) -> Result<(), UserError> {
        match self.get_room(room_id).await {
            Ok(room) => {
                if let Some(member) = self
                    .public_key()
                    .ok()
                    .and_then(|public_key| room.member(&public_key))
                {
                    if let Err(err) = room.remove_member(&member.id).await {
                        warn!(%err, room = %room.id(), "failed removing own member row");
                    }
                }
                let open = self
                    .inner
                    .rooms
                    .lock()
                    .expect("acquire lock on open rooms")
                    .remove(room.id());
                if let Some(open) = open {
                    open.forward.cancel();
                }
                room.close().await;
            }
            Err(err) => debug!(%err, room = room_id, "leaving room which can not be opened"),
        }

        self.remove_room(room_id).await?;
        self.inner.engine.emit(Event::RoomLeft {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    /// Close every open room instance.
    pub async fn close_all_rooms(&self) {
        let rooms: Vec<OpenRoom<B>> = self
            .inner
            .rooms
            .lock()
            .expect("acquire lock on open rooms")
            .drain()
            .map(|(_, open)| open)
            .collect();
        join_all(rooms.into_iter().map(|open| async move {
            open.forward.cancel();
            open.room.close().await;
        }))
        .await;
    }

    fn open_room(&self, room_id: &str) -> Option<Room<B>> {
        let rooms = self.inner.rooms.lock().expect("acquire lock on open rooms");
        rooms.get(room_id).map(|open| open.room.clone())
    }

    /// Keep the room open and forward its events, returns the instance already open under the
    /// same id if there is one.
    async fn track_room(&self, room: Room<B>) -> Room<B> {
        let existing = {
            let mut rooms = self.inner.rooms.lock().expect("acquire lock on open rooms");
            match rooms.entry(room.id().to_string()) {
                Entry::Occupied(entry) => Some(entry.get().room.clone()),
                Entry::Vacant(entry) => {
                    let forward = self.inner.shutdown.child_token();
                    tokio::spawn(forward_events(
                        room.id().to_string(),
                        room.subscribe(),
                        self.inner.engine.clone(),
                        forward.clone(),
                    ));
                    entry.insert(OpenRoom {
                        room: room.clone(),
                        forward,
                    });
                    None
                }
            }
        };

        match existing {
            Some(existing) => {
                room.close().await;
                existing
            }
            None => room,
        }
    }
}

async fn forward_events<L, S>(
    room_id: String,
    mut events: broadcast::Receiver<Event>,
    engine: Engine<L, S>,
    token: CancellationToken,
) where
    L: Log,
    S: TableStore,
{
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => engine.emit(Event::Room {
                    room_id: room_id.clone(),
                    event: Box::new(event),
                }),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(room = %room_id, skipped, "room events lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

impl<B: Backend> Bound for User<B> {
    fn writable(&self) -> watch::Receiver<bool> {
        self.inner.engine.writable()
    }

    async fn close(&self) {
        User::close(self).await;
    }
}
