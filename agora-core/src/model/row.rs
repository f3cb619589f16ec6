// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::traits::Record;

use super::{
    Category, Channel, DeviceList, FileRecord, Identity, Invite, Member, Mention, Message,
    PermissionOverride, Profile, Reaction, Role, Room, RoomList, Settings, Thread, Writer,
};

/// Any materialized record, tagged by the domain it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Row {
    Room(Room),
    Member(Member),
    Channel(Channel),
    Category(Category),
    Role(Role),
    Permission(PermissionOverride),
    Thread(Thread),
    Message(Message),
    Reaction(Reaction),
    File(FileRecord),
    Mention(Mention),
    Invite(Invite),
    Writer(Writer),
    Identity(Identity),
    Profile(Profile),
    Rooms(RoomList),
    Devices(DeviceList),
    Settings(Settings),
}

macro_rules! rows {
    ($($variant:ident($ty:ty) => $domain:ident),* $(,)?) => {
        impl Row {
            pub fn id(&self) -> String {
                match self {
                    $(Row::$variant(record) => record.id(),)*
                }
            }

            /// Sort key of the wrapped record, ties are broken by id.
            pub fn order_key(&self) -> (u64, String) {
                match self {
                    $(Row::$variant(record) => (record.order(), record.id()),)*
                }
            }

            pub fn domain(&self) -> Domain {
                match self {
                    $(Row::$variant(_) => Domain::$domain,)*
                }
            }
        }

        $(
            impl From<$ty> for Row {
                fn from(record: $ty) -> Self {
                    Row::$variant(record)
                }
            }

            impl TryFrom<Row> for $ty {
                type Error = Row;

                fn try_from(row: Row) -> Result<Self, Self::Error> {
                    match row {
                        Row::$variant(record) => Ok(record),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

rows! {
    Room(Room) => Room,
    Member(Member) => Members,
    Channel(Channel) => Channels,
    Category(Category) => Categories,
    Role(Role) => Roles,
    Permission(PermissionOverride) => Permissions,
    Thread(Thread) => Threads,
    Message(Message) => Messages,
    Reaction(Reaction) => Reactions,
    File(FileRecord) => Files,
    Mention(Mention) => Mentions,
    Invite(Invite) => Invites,
    Writer(Writer) => Writers,
    Identity(Identity) => Identity,
    Profile(Profile) => Profile,
    Rooms(RoomList) => Rooms,
    Devices(DeviceList) => Devices,
    Settings(Settings) => Settings,
}
