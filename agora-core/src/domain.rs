// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

/// Named category of entities which scopes view refreshes and change events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Domain {
    Room,
    Members,
    Channels,
    Categories,
    Roles,
    Permissions,
    Threads,
    Messages,
    Reactions,
    Files,
    Mentions,
    Invites,
    Writers,
    Identity,
    Profile,
    Rooms,
    Devices,
    Settings,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Room => "room",
            Domain::Members => "members",
            Domain::Channels => "channels",
            Domain::Categories => "categories",
            Domain::Roles => "roles",
            Domain::Permissions => "permissions",
            Domain::Threads => "threads",
            Domain::Messages => "messages",
            Domain::Reactions => "reactions",
            Domain::Files => "files",
            Domain::Mentions => "mentions",
            Domain::Invites => "invites",
            Domain::Writers => "writers",
            Domain::Identity => "identity",
            Domain::Profile => "profile",
            Domain::Rooms => "rooms",
            Domain::Devices => "devices",
            Domain::Settings => "settings",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
