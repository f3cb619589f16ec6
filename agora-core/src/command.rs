// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command tables mapping symbolic command names to stable numeric ids and entity domains.
//!
//! An encoded command is a single byte holding the command id, followed by the CBOR-encoded
//! payload:
//!
//! ```text
//! +----+---------------------------+
//! | id | payload (CBOR)            |
//! +----+---------------------------+
//! ```
//!
//! Ids are part of the replicated history and must never be reassigned once used.
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::domain::Domain;

/// Numeric identifier of a command, written as the first byte of every log entry.
pub type CommandId = u8;

/// Names of the commands appended to room logs.
pub mod room {
    pub const REMOVE_WRITER: &str = "remove-writer";
    pub const ADD_WRITER: &str = "add-writer";
    pub const ADD_INVITE: &str = "add-invite";
    pub const CREATE_ROOM: &str = "create-room";
    pub const UPDATE_ROOM: &str = "update-room";
    pub const ADD_MEMBER: &str = "add-member";
    pub const UPDATE_MEMBER: &str = "update-member";
    pub const REMOVE_MEMBER: &str = "remove-member";
    pub const CREATE_ROLE: &str = "create-role";
    pub const UPDATE_ROLE: &str = "update-role";
    pub const DELETE_ROLE: &str = "delete-role";
    pub const SET_PERMISSION_OVERRIDE: &str = "set-permission-override";
    pub const CREATE_CHANNEL: &str = "create-channel";
    pub const UPDATE_CHANNEL: &str = "update-channel";
    pub const DELETE_CHANNEL: &str = "delete-channel";
    pub const CREATE_CATEGORY: &str = "create-category";
    pub const UPDATE_CATEGORY: &str = "update-category";
    pub const DELETE_CATEGORY: &str = "delete-category";
    pub const CREATE_THREAD: &str = "create-thread";
    pub const UPDATE_THREAD: &str = "update-thread";
    pub const ADD_MESSAGE: &str = "add-message";
    pub const EDIT_MESSAGE: &str = "edit-message";
    pub const DELETE_MESSAGE: &str = "delete-message";
    pub const ADD_REACTION: &str = "add-reaction";
    pub const REMOVE_REACTION: &str = "remove-reaction";
    pub const ADD_FILE: &str = "add-file";
    pub const ADD_MENTION: &str = "add-mention";
}

/// Names of the commands appended to user logs.
pub mod user {
    pub const REMOVE_WRITER: &str = "remove-writer";
    pub const ADD_WRITER: &str = "add-writer";
    pub const ADD_INVITE: &str = "add-invite";
    pub const SET_PROFILE: &str = "set-profile";
    pub const UPDATE_ROOMS: &str = "update-rooms";
    pub const UPDATE_DEVICES: &str = "update-devices";
    pub const UPDATE_SETTINGS: &str = "update-settings";
    pub const SET_IDENTITY: &str = "set-identity";
}

/// Static description of a command kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub id: CommandId,
    pub name: &'static str,
    /// Entity domains touched when a command of this kind is applied.
    pub domains: &'static [Domain],
}

impl CommandSpec {
    pub const fn new(id: CommandId, name: &'static str, domains: &'static [Domain]) -> Self {
        Self { id, name, domains }
    }
}

/// Commands of room logs.
pub const ROOM_COMMANDS: &[CommandSpec] = &[
    CommandSpec::new(0, room::REMOVE_WRITER, &[Domain::Writers]),
    CommandSpec::new(1, room::ADD_WRITER, &[Domain::Writers]),
    CommandSpec::new(2, room::ADD_INVITE, &[Domain::Invites]),
    CommandSpec::new(3, room::CREATE_ROOM, &[Domain::Room]),
    CommandSpec::new(4, room::UPDATE_ROOM, &[Domain::Room]),
    CommandSpec::new(5, room::ADD_MEMBER, &[Domain::Members]),
    CommandSpec::new(6, room::UPDATE_MEMBER, &[Domain::Members]),
    CommandSpec::new(7, room::REMOVE_MEMBER, &[Domain::Members]),
    CommandSpec::new(8, room::CREATE_ROLE, &[Domain::Roles]),
    CommandSpec::new(9, room::UPDATE_ROLE, &[Domain::Roles]),
    CommandSpec::new(10, room::DELETE_ROLE, &[Domain::Roles]),
    CommandSpec::new(11, room::SET_PERMISSION_OVERRIDE, &[Domain::Permissions]),
    CommandSpec::new(12, room::CREATE_CHANNEL, &[Domain::Channels]),
    CommandSpec::new(13, room::UPDATE_CHANNEL, &[Domain::Channels]),
    CommandSpec::new(14, room::DELETE_CHANNEL, &[Domain::Channels]),
    CommandSpec::new(15, room::CREATE_CATEGORY, &[Domain::Categories]),
    CommandSpec::new(16, room::UPDATE_CATEGORY, &[Domain::Categories]),
    CommandSpec::new(17, room::DELETE_CATEGORY, &[Domain::Categories]),
    CommandSpec::new(18, room::CREATE_THREAD, &[Domain::Threads]),
    CommandSpec::new(19, room::UPDATE_THREAD, &[Domain::Threads]),
    CommandSpec::new(20, room::ADD_MESSAGE, &[Domain::Messages]),
    CommandSpec::new(21, room::EDIT_MESSAGE, &[Domain::Messages]),
    CommandSpec::new(22, room::DELETE_MESSAGE, &[Domain::Messages]),
    CommandSpec::new(23, room::ADD_REACTION, &[Domain::Reactions]),
    CommandSpec::new(24, room::REMOVE_REACTION, &[Domain::Reactions]),
    CommandSpec::new(25, room::ADD_FILE, &[Domain::Files]),
    CommandSpec::new(26, room::ADD_MENTION, &[Domain::Mentions]),
];

/// Commands of user logs.
pub const USER_COMMANDS: &[CommandSpec] = &[
    CommandSpec::new(0, user::REMOVE_WRITER, &[Domain::Writers]),
    CommandSpec::new(1, user::ADD_WRITER, &[Domain::Writers]),
    CommandSpec::new(2, user::ADD_INVITE, &[Domain::Invites]),
    CommandSpec::new(3, user::SET_PROFILE, &[Domain::Profile]),
    CommandSpec::new(4, user::UPDATE_ROOMS, &[Domain::Rooms]),
    CommandSpec::new(5, user::UPDATE_DEVICES, &[Domain::Devices]),
    CommandSpec::new(6, user::UPDATE_SETTINGS, &[Domain::Settings]),
    CommandSpec::new(7, user::SET_IDENTITY, &[Domain::Identity]),
];

/// Lookup table between command names, ids and domains.
///
/// Tables can be extended with further command kinds at runtime, as long as neither the id nor
/// the name is taken yet.
#[derive(Clone, Debug, Default)]
pub struct CommandTable {
    by_id: BTreeMap<CommandId, CommandSpec>,
    by_name: HashMap<&'static str, CommandId>,
}

impl CommandTable {
    /// Build a table from a list of specs, rejecting duplicate ids or names.
    pub fn new(specs: &[CommandSpec]) -> Result<Self, CommandError> {
        let mut table = Self::default();
        for spec in specs {
            table.insert(*spec)?;
        }
        Ok(table)
    }

    /// Table of all room commands.
    pub fn room() -> Self {
        Self::from_unique(ROOM_COMMANDS)
    }

    /// Table of all user commands.
    pub fn user() -> Self {
        Self::from_unique(USER_COMMANDS)
    }

    fn from_unique(specs: &[CommandSpec]) -> Self {
        let mut table = Self::default();
        for spec in specs {
            table.by_name.insert(spec.name, spec.id);
            table.by_id.insert(spec.id, *spec);
        }
        table
    }

    /// Add a new command kind to the table.
    pub fn insert(&mut self, spec: CommandSpec) -> Result<(), CommandError> {
        if self.by_id.contains_key(&spec.id) || self.by_name.contains_key(spec.name) {
            return Err(CommandError::Duplicate(spec.id, spec.name));
        }
        self.by_name.insert(spec.name, spec.id);
        self.by_id.insert(spec.id, spec);
        Ok(())
    }

    pub fn get(&self, id: CommandId) -> Option<&CommandSpec> {
        self.by_id.get(&id)
    }

    pub fn lookup(&self, name: &str) -> Option<&CommandSpec> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// All command kinds ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.by_id.values()
    }

    /// Encode a command with the given name and payload.
    pub fn encode<T: Serialize>(&self, name: &str, payload: &T) -> Result<Vec<u8>, CommandError> {
        let spec = self
            .lookup(name)
            .ok_or_else(|| CommandError::UnknownName(name.to_string()))?;
        let mut bytes = vec![spec.id];
        bytes.extend(encode_cbor(payload)?);
        Ok(bytes)
    }

    /// Split raw entry bytes into the command kind and its still encoded payload.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Command<'a>, CommandError> {
        let (id, payload) = bytes.split_first().ok_or(CommandError::Empty)?;
        let spec = self.get(*id).ok_or(CommandError::UnknownId(*id))?;
        Ok(Command {
            spec: *spec,
            payload,
        })
    }
}

/// Command kind together with its encoded payload.
#[derive(Clone, Copy, Debug)]
pub struct Command<'a> {
    pub spec: CommandSpec,
    pub payload: &'a [u8],
}

impl Command<'_> {
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Decode the payload into the expected type.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, CommandError> {
        Ok(decode_cbor(self.payload)?)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("entry is empty and holds no command id")]
    Empty,

    #[error("unknown command id {0}")]
    UnknownId(CommandId),

    #[error("unknown command name \"{0}\"")]
    UnknownName(String),

    #[error("command id {0} or name \"{1}\" is already in use")]
    Duplicate(CommandId, &'static str),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use crate::domain::Domain;

    use super::{
        CommandError, CommandSpec, CommandTable, ROOM_COMMANDS, USER_COMMANDS, room, user,
    };

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Removal {
        id: String,
    }

    #[test]
    fn builtin_tables_are_unique() {
        assert!(CommandTable::new(ROOM_COMMANDS).is_ok());
        assert!(CommandTable::new(USER_COMMANDS).is_ok());
        assert_eq!(CommandTable::room().iter().count(), 27);
        assert_eq!(CommandTable::user().iter().count(), 8);
    }

    #[test]
    fn stable_ids() {
        let table = CommandTable::room();
        assert_eq!(table.lookup(room::ADD_MESSAGE).unwrap().id, 20);
        assert_eq!(table.lookup(room::ADD_MENTION).unwrap().id, 26);
        assert_eq!(
            table.get(12).unwrap().domains,
            &[Domain::Channels] as &[Domain]
        );

        let table = CommandTable::user();
        assert_eq!(table.lookup(user::SET_IDENTITY).unwrap().id, 7);
    }

    #[test]
    fn encode_and_decode() {
        let table = CommandTable::room();
        let removal = Removal {
            id: "general".into(),
        };

        let bytes = table.encode(room::DELETE_CHANNEL, &removal).unwrap();
        assert_eq!(bytes[0], 14);

        let command = table.decode(&bytes).unwrap();
        assert_eq!(command.name(), room::DELETE_CHANNEL);
        assert_eq!(command.decode_payload::<Removal>().unwrap(), removal);
    }

    #[test]
    fn malformed_entries() {
        let table = CommandTable::room();
        assert!(matches!(table.decode(&[]), Err(CommandError::Empty)));
        assert!(matches!(
            table.decode(&[200, 1, 2]),
            Err(CommandError::UnknownId(200))
        ));

        // Known id, garbled payload.
        let command = table.decode(&[20, 0xff, 0xff]).unwrap();
        assert!(command.decode_payload::<Removal>().is_err());

        assert!(matches!(
            table.encode("no-such-command", &()),
            Err(CommandError::UnknownName(_))
        ));
    }

    #[test]
    fn extend_table() {
        let mut table = CommandTable::room();
        table
            .insert(CommandSpec::new(27, "pin-message", &[Domain::Messages]))
            .unwrap();
        assert_eq!(table.lookup("pin-message").unwrap().id, 27);

        assert!(matches!(
            table.insert(CommandSpec::new(27, "other", &[])),
            Err(CommandError::Duplicate(27, "other"))
        ));
        assert!(matches!(
            table.insert(CommandSpec::new(28, room::ADD_MESSAGE, &[])),
            Err(CommandError::Duplicate(28, _))
        ));
    }
}
