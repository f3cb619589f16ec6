// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command handlers and cached views of user logs.
//!
//! Every user command replaces a single record, there are no authorship checks beyond the writer
//! set of the log. Invites are merged so revocations stick.
use agora_core::command::{CommandTable, user};
use agora_core::model::{DeviceList, Identity, Invite, Profile, RoomList, Settings, Writer};
use agora_core::Domain;
use agora_store::TableStore;
use agora_stream::{
    AddInvite, AddWriter, Event, RemoveWriter, Router, RouterError, Upsert, ViewCache,
};
use tokio::sync::broadcast;

/// Router with handlers for every command of user logs.
pub fn router<S: TableStore>() -> Result<Router<S>, RouterError> {
    let mut router = Router::new(CommandTable::user());
    router
        .register(user::REMOVE_WRITER, RemoveWriter)?
        .register(user::ADD_WRITER, AddWriter)?
        .register(user::ADD_INVITE, AddInvite)?
        .register(user::SET_PROFILE, Upsert::<Profile>::new())?
        .register(user::UPDATE_ROOMS, Upsert::<RoomList>::new())?
        .register(user::UPDATE_DEVICES, Upsert::<DeviceList>::new())?
        .register(user::UPDATE_SETTINGS, Upsert::<Settings>::new())?
        .register(user::SET_IDENTITY, Upsert::<Identity>::new())?;
    Ok(router)
}

/// View cache with a table view for every domain of user logs.
pub fn cache<S: TableStore>(store: S, events: broadcast::Sender<Event>) -> ViewCache<S> {
    let mut cache = ViewCache::new(store, events);
    cache
        .register_table::<Identity>(Domain::Identity)
        .register_table::<Profile>(Domain::Profile)
        .register_table::<RoomList>(Domain::Rooms)
        .register_table::<DeviceList>(Domain::Devices)
        .register_table::<Settings>(Domain::Settings)
        .register_table::<Invite>(Domain::Invites)
        .register_table::<Writer>(Domain::Writers);
    cache
}
