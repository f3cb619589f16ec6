// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use agora::test_utils::{room_config, setup_logging, wait_for_event};
use agora::{
    Author, InviteOptions, MemoryBackend, MemoryNetwork, MessageOptions, MessageQuery, NewChannel,
    NewRoom, Room, RoomConfig, RoomError,
};
use agora_core::command::room::EDIT_MESSAGE;
use agora_core::model::Member;
use agora_core::{Domain, PrivateKey, Timestamp};
use agora_pairing::{PairingError, namespace};
use agora_stream::{Event, Rejection};
use assert_matches::assert_matches;

struct Garden {
    network: MemoryNetwork,
    ant: Author,
    room: Room<MemoryBackend>,
    channel: String,
}

async fn garden(config: RoomConfig) -> Garden {
    let network = MemoryNetwork::new();
    let ant = Author::new(PrivateKey::new(), "ant");
    let room = Room::create(&network.device(), NewRoom::new("garden"), ant.clone(), config)
        .await
        .unwrap();
    let channel = room.create_channel(NewChannel::new("general")).await.unwrap();
    Garden {
        network,
        ant,
        room,
        channel,
    }
}

async fn join(
    network: &MemoryNetwork,
    code: &str,
    author: &Author,
) -> Result<Room<MemoryBackend>, RoomError> {
    Room::join(
        &network.device(),
        namespace(code),
        code,
        author.clone(),
        room_config(),
    )
    .await
}

#[tokio::test]
async fn joined_replica_sees_channels_and_writes() {
    setup_logging();

    // Scenario: ant creates a room with a channel and invites bat.
    let Garden {
        network,
        ant,
        room,
        channel,
    } = garden(room_config()).await;
    let code = room.create_invite(InviteOptions::default()).await.unwrap();

    let bat = Author::new(PrivateKey::new(), "bat");
    let joined = join(&network, &code, &bat).await.unwrap();

    // The writer key of bat's replica was admitted by ant.
    assert!(joined.is_writable());
    assert!(room.writers().contains(&joined.local_key()));
    assert_eq!(joined.id(), room.id());
    assert_eq!(joined.key(), room.key());

    let channels = joined.channels();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].id, channel);
    assert_eq!(channels[0].name, "general");

    let member = joined.member(&bat.public_key()).unwrap();
    assert_eq!(member.display_name, "bat");
    assert_eq!(member.roles, [Member::DEFAULT_ROLE]);
    assert_eq!(room.invites()[0].use_count, 1);

    // Messages by bat reach ant.
    let mut events = room.subscribe();
    let id = joined
        .send_message(&channel, "hi ant", MessageOptions::default())
        .await
        .unwrap();
    wait_for_event(&mut events, |event| {
        matches!(event, Event::Updated { domain: Domain::Messages, .. })
    })
    .await;
    let messages = room.get_messages(&channel, &MessageQuery::default());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, id);
    assert_eq!(messages[0].sender, bat.public_key());
    assert!(room.member(&bat.public_key()).is_some());
    assert_ne!(ant.public_key(), bat.public_key());

    joined.close().await;
    room.close().await;
}

#[tokio::test]
async fn edits_by_other_members_are_dropped() {
    setup_logging();

    let Garden {
        network,
        room,
        channel,
        ..
    } = garden(room_config()).await;
    let code = room.create_invite(InviteOptions::default()).await.unwrap();
    let bat = Author::new(PrivateKey::new(), "bat");
    let joined = join(&network, &code, &bat).await.unwrap();

    let mut bat_events = joined.subscribe();
    let id = room
        .send_message(&channel, "hello", MessageOptions::default())
        .await
        .unwrap();
    wait_for_event(&mut bat_events, |event| {
        matches!(event, Event::Updated { domain: Domain::Messages, .. })
    })
    .await;

    assert_matches!(
        joined.edit_message(&id, "HELLO").await,
        Err(RoomError::NotAuthorized("message", _))
    );

    // Scenario: bat bypasses the local checks and appends a forged edit.
    let mut forged = joined.get_message(&id).await.unwrap().unwrap();
    forged.content = "HELLO".into();
    forged.sender = bat.public_key();
    forged.edited = true;
    forged.edited_at = Some(Timestamp::now());
    forged.sign(&bat.private_key).unwrap();

    let mut ant_events = room.subscribe();
    joined.engine().append(EDIT_MESSAGE, &forged).await.unwrap();
    wait_for_event(&mut ant_events, |event| {
        matches!(
            event,
            Event::Rejected {
                command: EDIT_MESSAGE,
                reason: Rejection::NotAuthor,
                ..
            }
        )
    })
    .await;
    assert_eq!(room.get_message(&id).await.unwrap().unwrap().content, "hello");
    assert_eq!(joined.get_message(&id).await.unwrap().unwrap().content, "hello");

    // Forced deletions pass the local check but are dropped by every replica.
    joined.delete_message(&id, true).await.unwrap();
    wait_for_event(&mut ant_events, |event| {
        matches!(event, Event::Rejected { reason: Rejection::NotAuthor, .. })
    })
    .await;
    assert!(!room.get_message(&id).await.unwrap().unwrap().deleted);

    joined.close().await;
    room.close().await;
}

#[tokio::test]
async fn revoked_and_used_invites_are_rejected() {
    let Garden { network, room, .. } = garden(room_config()).await;
    let bat = Author::new(PrivateKey::new(), "bat");
    let cat = Author::new(PrivateKey::new(), "cat");

    let code = room.create_invite(InviteOptions::default()).await.unwrap();
    room.revoke_invite(&room.invites()[0].id).await.unwrap();
    assert_matches!(
        join(&network, &code, &bat).await,
        Err(RoomError::Pairing(PairingError::Rejected))
    );

    let single = room
        .create_invite(InviteOptions {
            max_uses: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    let joined = join(&network, &single, &bat).await.unwrap();
    assert_matches!(
        join(&network, &single, &cat).await,
        Err(RoomError::Pairing(PairingError::Rejected))
    );
    assert!(room.member(&cat.public_key()).is_none());

    assert_matches!(
        join(&network, "not an invite", &cat).await,
        Err(RoomError::Pairing(PairingError::Invite(_)))
    );

    joined.close().await;
    room.close().await;
}

#[tokio::test(start_paused = true)]
async fn join_times_out_without_members() {
    // Scenario: ant's room does not listen for candidates.
    let Garden { network, room, .. } = garden(RoomConfig {
        replicate: false,
        ..room_config()
    })
    .await;
    let code = room.create_invite(InviteOptions::default()).await.unwrap();

    let bat = Author::new(PrivateKey::new(), "bat");
    let result = Room::join(
        &network.device(),
        namespace(&code),
        &code,
        bat,
        RoomConfig {
            join_timeout: Duration::from_secs(1),
            ..room_config()
        },
    )
    .await;

    assert_matches!(result, Err(RoomError::Pairing(PairingError::Timeout)));
    assert_eq!(network.transport().listener_count(), 0);
    assert_eq!(network.transport().pending_count(), 0);

    room.close().await;
}
