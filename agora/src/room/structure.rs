// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channels, categories, roles, permission overrides, threads, files and mentions.
use agora_core::command::room::{
    ADD_FILE, ADD_MENTION, CREATE_CATEGORY, CREATE_CHANNEL, CREATE_ROLE, CREATE_THREAD,
    DELETE_CATEGORY, DELETE_CHANNEL, DELETE_ROLE, SET_PERMISSION_OVERRIDE, UPDATE_CATEGORY,
    UPDATE_CHANNEL, UPDATE_ROLE, UPDATE_THREAD,
};
use agora_core::model::{
    Category, Channel, ChannelKind, FileRecord, Mention, PermissionOverride, Role, Thread,
    random_id,
};
use agora_core::{Domain, PublicKey, Timestamp};
use agora_stream::{Event, RemoveById};

use crate::backend::Backend;
use crate::room::{Room, RoomError};

/// Parameters of a new channel.
#[derive(Clone, Debug, Default)]
pub struct NewChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub topic: String,

    /// Defaults to the position after the last channel.
    pub position: Option<u32>,

    pub category_id: Option<String>,
    pub is_default: bool,
}

impl NewChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Parameters of a new role.
#[derive(Clone, Debug, Default)]
pub struct NewRole {
    pub name: String,
    pub color: String,
    pub permissions: Vec<String>,

    /// Defaults to the position after the last role.
    pub position: Option<u32>,
}

/// Metadata of a shared file.
#[derive(Clone, Debug, Default)]
pub struct NewFile {
    pub channel_id: String,
    pub message_id: Option<String>,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

fn next_position(positions: impl Iterator<Item = u32>) -> u32 {
    positions.max().map_or(0, |max| max + 1)
}

fn require(value: &str, field: &'static str) -> Result<(), RoomError> {
    if value.trim().is_empty() {
        Err(RoomError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Channels.
impl<B: Backend> Room<B> {
    /// Channels ordered by position, ties broken by id.
    pub fn channels(&self) -> Vec<Channel> {
        self.records(Domain::Channels)
    }

    pub async fn create_channel(&self, params: NewChannel) -> Result<String, RoomError> {
        require(&params.name, "name")?;
        let author = self.require_author()?;

        let position = match params.position {
            Some(position) => position,
            None => next_position(self.channels().iter().map(|channel| channel.position)),
        };
        let channel = Channel {
            id: random_id(),
            room_id: self.id().to_string(),
            kind: params.kind,
            name: params.name,
            topic: params.topic,
            position,
            category_id: params.category_id,
            created_at: Timestamp::now(),
            created_by: author.public_key(),
            is_default: params.is_default,
        };

        self.inner.engine.append(CREATE_CHANNEL, &channel).await?;
        self.inner.engine.emit(Event::Created {
            domain: Domain::Channels,
            id: channel.id.clone(),
        });
        Ok(channel.id)
    }

    pub async fn update_channel(&self, channel: Channel) -> Result<(), RoomError> {
        require(&channel.name, "name")?;
        self.inner.engine.append(UPDATE_CHANNEL, &channel).await?;
        self.inner.engine.emit(Event::Edited {
            domain: Domain::Channels,
            id: channel.id,
        });
        Ok(())
    }

    pub async fn delete_channel(&self, id: &str) -> Result<(), RoomError> {
        self.inner
            .engine
            .append(DELETE_CHANNEL, &RemoveById { id: id.to_string() })
            .await?;
        self.inner.engine.emit(Event::Deleted {
            domain: Domain::Channels,
            id: id.to_string(),
        });
        Ok(())
    }
}

/// Categories.
impl<B: Backend> Room<B> {
    pub fn categories(&self) -> Vec<Category> {
        self.records(Domain::Categories)
    }

    pub async fn create_category(
        &self,
        name: impl Into<String>,
        position: Option<u32>,
    ) -> Result<String, RoomError> {
        let name = name.into();
        require(&name, "name")?;

        let position = match position {
            Some(position) => position,
            None => next_position(self.categories().iter().map(|category| category.position)),
        };
        let category = Category {
            id: random_id(),
            room_id: self.id().to_string(),
            name,
            position,
        };
        self.inner.engine.append(CREATE_CATEGORY, &category).await?;
        Ok(category.id)
    }

    pub async fn update_category(&self, category: Category) -> Result<(), RoomError> {
        require(&category.name, "name")?;
        self.inner.engine.append(UPDATE_CATEGORY, &category).await?;
        Ok(())
    }

    pub async fn delete_category(&self, id: &str) -> Result<(), RoomError> {
        self.inner
            .engine
            .append(DELETE_CATEGORY, &RemoveById { id: id.to_string() })
            .await?;
        Ok(())
    }
}

/// Roles and permission overrides.
impl<B: Backend> Room<B> {
    pub fn roles(&self) -> Vec<Role> {
        self.records(Domain::Roles)
    }

    pub async fn create_role(&self, params: NewRole) -> Result<String, RoomError> {
        require(&params.name, "name")?;

        let position = match params.position {
            Some(position) => position,
            None => next_position(self.roles().iter().map(|role| role.position)),
        };
        let role = Role {
            id: random_id(),
            room_id: self.id().to_string(),
            name: params.name,
            color: params.color,
            position,
            permissions: params.permissions,
        };
        self.inner.engine.append(CREATE_ROLE, &role).await?;
        Ok(role.id)
    }

    pub async fn update_role(&self, role: Role) -> Result<(), RoomError> {
        require(&role.name, "name")?;
        self.inner.engine.append(UPDATE_ROLE, &role).await?;
        Ok(())
    }

    pub async fn delete_role(&self, id: &str) -> Result<(), RoomError> {
        self.inner
            .engine
            .append(DELETE_ROLE, &RemoveById { id: id.to_string() })
            .await?;
        Ok(())
    }

    pub fn permission_overrides(&self) -> Vec<PermissionOverride> {
        self.records(Domain::Permissions)
    }

    /// Set the allowed and denied permissions of a role or member in a channel.
    pub async fn set_permission_override(
        &self,
        permission: PermissionOverride,
    ) -> Result<(), RoomError> {
        require(&permission.channel_id, "channel_id")?;
        require(&permission.target_id, "target_id")?;
        self.inner
            .engine
            .append(SET_PERMISSION_OVERRIDE, &permission)
            .await?;
        Ok(())
    }
}

/// Threads, files and mentions.
impl<B: Backend> Room<B> {
    pub fn threads(&self) -> Vec<Thread> {
        self.records(Domain::Threads)
    }

    pub async fn create_thread(
        &self,
        channel_id: &str,
        root_message_id: &str,
        name: impl Into<String>,
    ) -> Result<String, RoomError> {
        require(channel_id, "channel_id")?;
        require(root_message_id, "root_message_id")?;
        let author = self.require_author()?;

        let thread = Thread {
            id: random_id(),
            channel_id: channel_id.to_string(),
            root_message_id: root_message_id.to_string(),
            name: name.into(),
            created_at: Timestamp::now(),
            created_by: author.public_key(),
        };
        self.inner.engine.append(CREATE_THREAD, &thread).await?;
        self.inner.engine.emit(Event::Created {
            domain: Domain::Threads,
            id: thread.id.clone(),
        });
        Ok(thread.id)
    }

    pub async fn update_thread(&self, thread: Thread) -> Result<(), RoomError> {
        self.inner.engine.append(UPDATE_THREAD, &thread).await?;
        Ok(())
    }

    pub fn files(&self) -> Vec<FileRecord> {
        self.records(Domain::Files)
    }

    pub async fn add_file(&self, params: NewFile) -> Result<String, RoomError> {
        require(&params.channel_id, "channel_id")?;
        require(&params.name, "name")?;
        let author = self.require_author()?;

        let file = FileRecord {
            id: random_id(),
            room_id: self.id().to_string(),
            channel_id: params.channel_id,
            message_id: params.message_id,
            name: params.name,
            mime_type: params.mime_type,
            size: params.size,
            uploaded_by: author.public_key(),
            uploaded_at: Timestamp::now(),
        };
        self.inner.engine.append(ADD_FILE, &file).await?;
        Ok(file.id)
    }

    pub fn mentions(&self) -> Vec<Mention> {
        self.records(Domain::Mentions)
    }

    /// Mentions of the given user, oldest first.
    pub fn mentions_of(&self, user_key: &PublicKey) -> Vec<Mention> {
        self.mentions()
            .into_iter()
            .filter(|mention| &mention.user_key == user_key)
            .collect()
    }

    pub async fn add_mention(
        &self,
        message_id: &str,
        channel_id: &str,
        user_key: PublicKey,
    ) -> Result<String, RoomError> {
        require(message_id, "message_id")?;
        require(channel_id, "channel_id")?;

        let mention = Mention {
            id: random_id(),
            message_id: message_id.to_string(),
            channel_id: channel_id.to_string(),
            user_key,
            timestamp: Timestamp::now(),
        };
        self.inner.engine.append(ADD_MENTION, &mention).await?;
        Ok(mention.id)
    }
}

#[cfg(test)]
mod tests {
    use super::next_position;

    #[test]
    fn positions_follow_the_last_one() {
        assert_eq!(next_position([].into_iter()), 0);
        assert_eq!(next_position([0, 4, 2].into_iter()), 5);
    }
}
