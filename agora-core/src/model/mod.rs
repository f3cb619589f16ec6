// SPDX-License-Identifier: MIT OR Apache-2.0

//! Records materialized from room and user logs.
mod room;
mod row;
mod user;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::hash::Hash;
use crate::identity::PublicKey;
use crate::timestamp::Timestamp;
use crate::traits::Record;

pub use room::{
    Category, Channel, ChannelKind, FileRecord, Member, MemberStatus, Mention, Message,
    MessageKind, PermissionOverride, Reaction, Role, Room, RoomKind, Thread,
};
pub use row::Row;
pub use user::{
    Device, DeviceList, Identity, Profile, RoomList, RoomMembership, Settings,
};

/// Generate a random 8-byte, hex-encoded record id.
pub fn random_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Key which was granted write access to a log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Writer {
    pub key: PublicKey,
}

impl Record for Writer {
    const TABLE: &'static str = "writers";

    fn id(&self) -> String {
        self.key.to_hex()
    }
}

/// Capability to join a log, stored by the member which created it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: Hash,

    /// Encoded invite handed out to the candidate.
    #[serde(with = "serde_bytes")]
    pub invite: Vec<u8>,

    /// Key the candidate proves possession of when redeeming the invite.
    pub public_key: PublicKey,

    pub expires: Timestamp,

    pub room_id: Option<String>,

    /// Maximum number of redemptions, zero means unlimited.
    pub max_uses: u32,

    pub use_count: u32,

    pub is_revoked: bool,
}

impl Invite {
    /// Returns true if the invite can still be redeemed at the given time.
    pub fn is_redeemable(&self, now: Timestamp) -> bool {
        !self.is_revoked && now < self.expires && (self.max_uses == 0 || self.use_count < self.max_uses)
    }
}

impl Record for Invite {
    const TABLE: &'static str = "invites";

    fn id(&self) -> String {
        self.id.to_hex()
    }
}
