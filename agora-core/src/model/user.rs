// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::Hash;
use crate::identity::{EncryptionKey, PublicKey};
use crate::timestamp::Timestamp;
use crate::traits::Record;

/// Identity shared by all devices of a user.
///
/// The seed phrase travels inside the user's own encrypted log so that every paired device can
/// act as the same identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub public_key: PublicKey,
    pub discovery_key: Hash,
    pub seed: String,
}

impl Record for Identity {
    const TABLE: &'static str = "identity";

    fn id(&self) -> String {
        self.public_key.to_hex()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Owner of this profile.
    pub key: PublicKey,
    pub display_name: String,
    pub avatar: Option<String>,
    pub status: String,
    pub metadata: BTreeMap<String, String>,
}

impl Profile {
    pub const DEFAULT_STATUS: &'static str = "Available";
}

impl Record for Profile {
    const TABLE: &'static str = "profile";

    fn id(&self) -> String {
        self.key.to_hex()
    }
}

/// Entry of a user's room list, holding everything needed to re-open a room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMembership {
    pub room_id: String,
    pub name: String,
    pub description: String,
    pub key: Option<Hash>,
    pub discovery_key: Option<Hash>,
    pub encryption_key: Option<EncryptionKey>,
    /// Name of the local storage namespace holding the room's state.
    pub namespace: String,
    pub invite_code: Option<String>,
    pub invite_hash: Option<Hash>,
    pub created_at: Timestamp,
    pub last_accessed: Timestamp,
}

impl RoomMembership {
    /// Overwrite fields with the ones given in the update, keeping what the update leaves empty.
    fn merge(&mut self, update: RoomMembership, now: Timestamp) {
        if !update.name.is_empty() {
            self.name = update.name;
        }
        if !update.description.is_empty() {
            self.description = update.description;
        }
        if !update.namespace.is_empty() {
            self.namespace = update.namespace;
        }
        self.key = update.key.or(self.key);
        self.discovery_key = update.discovery_key.or(self.discovery_key);
        self.encryption_key = update.encryption_key.or(self.encryption_key.take());
        self.invite_code = update.invite_code.or(self.invite_code.take());
        self.invite_hash = update.invite_hash.or(self.invite_hash);
        self.last_accessed = now;
    }
}

/// All rooms a user is a member of.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomList {
    pub key: PublicKey,
    pub rooms: Vec<RoomMembership>,
}

impl RoomList {
    pub fn new(key: PublicKey) -> Self {
        Self {
            key,
            rooms: Vec::new(),
        }
    }

    pub fn get(&self, room_id: &str) -> Option<&RoomMembership> {
        self.rooms.iter().find(|room| room.room_id == room_id)
    }

    /// Merge the membership into an existing entry with the same room id or append it.
    pub fn upsert(&mut self, mut membership: RoomMembership, now: Timestamp) {
        match self
            .rooms
            .iter_mut()
            .find(|room| room.room_id == membership.room_id)
        {
            Some(existing) => existing.merge(membership, now),
            None => {
                membership.last_accessed = now;
                self.rooms.push(membership);
            }
        }
    }

    /// Removes the room with the given id, returns true if it was present.
    pub fn remove(&mut self, room_id: &str) -> bool {
        let len = self.rooms.len();
        self.rooms.retain(|room| room.room_id != room_id);
        self.rooms.len() != len
    }
}

impl Record for RoomList {
    const TABLE: &'static str = "rooms";

    fn id(&self) -> String {
        self.key.to_hex()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub public_key: PublicKey,
    pub name: String,
    pub last_seen: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceList {
    pub key: PublicKey,
    pub devices: Vec<Device>,
}

impl DeviceList {
    pub fn new(key: PublicKey) -> Self {
        Self {
            key,
            devices: Vec::new(),
        }
    }

    /// Insert the device or replace an existing one with the same key.
    pub fn upsert(&mut self, device: Device) {
        match self
            .devices
            .iter_mut()
            .find(|existing| existing.public_key == device.public_key)
        {
            Some(existing) => *existing = device,
            None => self.devices.push(device),
        }
    }

    pub fn remove(&mut self, public_key: &PublicKey) -> bool {
        let len = self.devices.len();
        self.devices.retain(|device| &device.public_key != public_key);
        self.devices.len() != len
    }
}

impl Record for DeviceList {
    const TABLE: &'static str = "devices";

    fn id(&self) -> String {
        self.key.to_hex()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub key: PublicKey,
    pub values: BTreeMap<String, String>,
}

impl Settings {
    pub fn merge(&mut self, values: BTreeMap<String, String>) {
        self.values.extend(values);
    }
}

impl Record for Settings {
    const TABLE: &'static str = "settings";

    fn id(&self) -> String {
        self.key.to_hex()
    }
}
