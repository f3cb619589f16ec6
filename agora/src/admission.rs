// SPDX-License-Identifier: MIT OR Apache-2.0

//! Invites and writer admission on top of an engine.
//!
//! Room and user logs share the `add-writer` and `add-invite` commands, admitting a candidate is
//! the same on both.
use std::time::Duration;

use agora_core::command::room::{ADD_INVITE, ADD_WRITER};
use agora_core::model::{Invite, Writer};
use agora_core::{Hash, PublicKey, Timestamp};
use agora_pairing::{Admission, Confirmation, InviteError, create_invite};
use agora_store::{Log, StoreError, TableStore};
use agora_stream::{Engine, EngineError};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Invite(#[from] InviteError),

    #[error("invite {0} is revoked, expired or used up")]
    NotRedeemable(Hash),
}

/// Options of a new invite.
#[derive(Clone, Debug, Default)]
pub struct InviteOptions {
    /// Expiry of the invite, defaults to now plus the configured invite lifetime.
    pub expires: Option<Timestamp>,

    /// Number of times the invite can be redeemed, 0 means unlimited.
    pub max_uses: u32,
}

/// Create an invite for the log and store its public part, returns the invite code.
pub(crate) async fn store_invite<L, S>(
    engine: &Engine<L, S>,
    room_id: Option<String>,
    lifetime: Duration,
    options: InviteOptions,
) -> Result<String, AdmissionError>
where
    L: Log,
    S: TableStore,
{
    let created = create_invite(engine.log().discovery_key(), lifetime)?;
    let code = created.code();
    let invite = Invite {
        id: created.id,
        invite: created.invite,
        public_key: created.public_key,
        expires: options.expires.unwrap_or(created.expires),
        room_id,
        max_uses: options.max_uses,
        use_count: 0,
        is_revoked: false,
    };
    engine.append(ADD_INVITE, &invite).await?;
    debug!(invite = %invite.id, max_uses = invite.max_uses, "created invite");
    Ok(code)
}

/// Mark a stored invite as revoked, returns false if it is unknown.
pub(crate) async fn revoke_invite<L, S>(engine: &Engine<L, S>, id: &Hash) -> Result<bool, AdmissionError>
where
    L: Log,
    S: TableStore,
{
    let Some(mut invite) = engine.store().get::<Invite>(&id.to_hex()).await? else {
        return Ok(false);
    };
    invite.is_revoked = true;
    engine.append(ADD_INVITE, &invite).await?;
    Ok(true)
}

/// Admits candidates to the log driven by an engine.
pub struct LogAdmission<L, S: TableStore> {
    engine: Engine<L, S>,
}

impl<L, S> LogAdmission<L, S>
where
    L: Log,
    S: TableStore,
{
    pub fn new(engine: Engine<L, S>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<L, S> Admission for LogAdmission<L, S>
where
    L: Log,
    S: TableStore,
{
    type Error = AdmissionError;

    async fn find_invite(&self, id: &Hash) -> Result<Option<Invite>, Self::Error> {
        Ok(self.engine.store().get::<Invite>(&id.to_hex()).await?)
    }

    async fn admit(
        &self,
        invite: &Invite,
        candidate: PublicKey,
    ) -> Result<Confirmation, Self::Error> {
        // The invite might have been revoked or used up since it was looked up.
        let current = self.find_invite(&invite.id).await?;
        if !current.as_ref().unwrap_or(invite).is_redeemable(Timestamp::now()) {
            return Err(AdmissionError::NotRedeemable(invite.id));
        }

        self.engine
            .append(ADD_WRITER, &Writer { key: candidate })
            .await?;

        let mut invite = self
            .find_invite(&invite.id)
            .await?
            .unwrap_or_else(|| invite.clone());
        invite.use_count += 1;
        self.engine.append(ADD_INVITE, &invite).await?;

        let log = self.engine.log();
        Ok(Confirmation {
            key: log.key(),
            encryption_key: log.encryption_key(),
        })
    }
}

#[cfg(test)]
mod tests {
    use agora_core::PrivateKey;
    use agora_core::command::room::ADD_INVITE;
    use agora_pairing::Admission;
    use assert_matches::assert_matches;

    use crate::backend::MemoryNetwork;
    use crate::room::{Author, NewRoom, Room};
    use crate::test_utils::{room_config, setup_logging};

    use super::{AdmissionError, InviteOptions, LogAdmission};

    #[tokio::test]
    async fn revoked_while_admitting() {
        setup_logging();

        let network = MemoryNetwork::new();
        let ant = Author::new(PrivateKey::new(), "ant");
        let room = Room::create(&network.device(), NewRoom::new("garden"), ant, room_config())
            .await
            .unwrap();
        room.create_invite(InviteOptions::default()).await.unwrap();
        let id = room.invites()[0].id;

        let admission = LogAdmission::new(room.engine().clone());
        let looked_up = admission.find_invite(&id).await.unwrap().unwrap();

        // Scenario: ant revokes the invite after bat's request looked it up.
        room.revoke_invite(&id).await.unwrap();
        let bat = PrivateKey::new().public_key();
        assert_matches!(
            admission.admit(&looked_up, bat).await,
            Err(AdmissionError::NotRedeemable(invite)) if invite == id
        );
        assert!(!room.writers().contains(&bat));

        // A stale copy of the record does not revive the invite.
        room.engine().append(ADD_INVITE, &looked_up).await.unwrap();
        let stored = admission.find_invite(&id).await.unwrap().unwrap();
        assert!(stored.is_revoked);
        assert_eq!(stored.use_count, 0);

        room.close().await;
    }

    #[tokio::test]
    async fn admitting_counts_uses() {
        let network = MemoryNetwork::new();
        let ant = Author::new(PrivateKey::new(), "ant");
        let room = Room::create(&network.device(), NewRoom::new("garden"), ant, room_config())
            .await
            .unwrap();
        room.create_invite(InviteOptions {
            max_uses: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        let id = room.invites()[0].id;

        let admission = LogAdmission::new(room.engine().clone());
        let invite = admission.find_invite(&id).await.unwrap().unwrap();
        let bat = PrivateKey::new().public_key();
        let confirmation = admission.admit(&invite, bat).await.unwrap();
        assert_eq!(confirmation.key, room.key());
        assert!(room.writers().contains(&bat));

        let stored = admission.find_invite(&id).await.unwrap().unwrap();
        assert_eq!(stored.use_count, 1);

        // The second admission with the same stale record is refused.
        let cat = PrivateKey::new().public_key();
        assert_matches!(
            admission.admit(&invite, cat).await,
            Err(AdmissionError::NotRedeemable(_))
        );
        assert!(!room.writers().contains(&cat));

        room.close().await;
    }
}
