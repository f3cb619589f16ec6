// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::Hash;
use crate::identity::{PublicKey, Signature};
use crate::timestamp::Timestamp;
use crate::traits::Record;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    #[default]
    Community,
    Channel,
    Direct,
}

/// Metadata of a room, there is exactly one row of this kind per room log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub kind: RoomKind,
    pub name: String,
    pub description: String,
    pub avatar: Option<String>,
    pub created_at: Timestamp,
    pub created_by: PublicKey,
    pub discovery_key: Hash,
    /// Key of the room's log.
    pub key: Hash,
    pub is_private: bool,
    pub is_encrypted: bool,
    pub settings: BTreeMap<String, String>,
}

impl Record for Room {
    const TABLE: &'static str = "room";

    fn id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    #[default]
    Active,
    Away,
    Banned,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub room_id: String,
    pub user_key: PublicKey,
    pub display_name: String,
    pub roles: Vec<String>,
    pub joined_at: Timestamp,
    pub invited_by: Option<PublicKey>,
    pub status: MemberStatus,
}

impl Member {
    pub const DEFAULT_ROLE: &'static str = "member";

    pub const ADMIN_ROLE: &'static str = "admin";
}

impl Record for Member {
    const TABLE: &'static str = "members";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn order(&self) -> u64 {
        self.joined_at.as_millis()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Text,
    Voice,
    Announcement,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub room_id: String,
    pub kind: ChannelKind,
    pub name: String,
    pub topic: String,
    /// Ordering hint, several channels may share the same position.
    pub position: u32,
    pub category_id: Option<String>,
    pub created_at: Timestamp,
    pub created_by: PublicKey,
    pub is_default: bool,
}

impl Record for Channel {
    const TABLE: &'static str = "channels";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn order(&self) -> u64 {
        self.position as u64
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub room_id: String,
    pub name: String,
    pub position: u32,
}

impl Record for Category {
    const TABLE: &'static str = "categories";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn order(&self) -> u64 {
        self.position as u64
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub room_id: String,
    pub name: String,
    pub color: String,
    pub position: u32,
    pub permissions: Vec<String>,
}

impl Record for Role {
    const TABLE: &'static str = "roles";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn order(&self) -> u64 {
        self.position as u64
    }
}

/// Per-channel permission adjustments for a role or member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverride {
    pub id: String,
    pub channel_id: String,
    /// Id of the role or member the override applies to.
    pub target_id: String,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl Record for PermissionOverride {
    const TABLE: &'static str = "permissions";

    fn id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub channel_id: String,
    pub root_message_id: String,
    pub name: String,
    pub created_at: Timestamp,
    pub created_by: PublicKey,
}

impl Record for Thread {
    const TABLE: &'static str = "threads";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn order(&self) -> u64 {
        self.created_at.as_millis()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::File => "file",
            MessageKind::System => "system",
        }
    }
}

/// Chat message authored and signed by `sender`.
///
/// Messages are never removed from the table. Deleting one replaces it with a tombstone which has
/// its content cleared and `deleted` set, tombstones can not be edited or revived afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub channel_id: String,
    pub kind: MessageKind,
    pub sender: PublicKey,
    pub sender_name: String,
    pub content: String,
    pub timestamp: Timestamp,
    pub signature: Option<Signature>,
    pub edited: bool,
    pub edited_at: Option<Timestamp>,
    pub deleted: bool,
    pub deleted_by: Option<PublicKey>,
    pub deleted_at: Option<Timestamp>,
    pub thread_root_id: Option<String>,
    pub reply_to_id: Option<String>,
}

impl Record for Message {
    const TABLE: &'static str = "messages";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn order(&self) -> u64 {
        self.timestamp.as_millis()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: String,
    pub message_id: String,
    pub emoji: String,
    pub user: PublicKey,
    pub timestamp: Timestamp,
}

impl Record for Reaction {
    const TABLE: &'static str = "reactions";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn order(&self) -> u64 {
        self.timestamp.as_millis()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub room_id: String,
    pub channel_id: String,
    pub message_id: Option<String>,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub uploaded_by: PublicKey,
    pub uploaded_at: Timestamp,
}

impl Record for FileRecord {
    const TABLE: &'static str = "files";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn order(&self) -> u64 {
        self.uploaded_at.as_millis()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub message_id: String,
    pub channel_id: String,
    pub user_key: PublicKey,
    pub timestamp: Timestamp,
}

impl Record for Mention {
    const TABLE: &'static str = "mentions";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn order(&self) -> u64 {
        self.timestamp.as_millis()
    }
}
