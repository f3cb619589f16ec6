// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handlers for commands which are plain writes to a single table.
use std::marker::PhantomData;

use agora_core::command::Command;
use agora_core::model::{Invite, Writer};
use agora_core::Record;
use agora_store::{TableStore, Transaction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::router::{ApplyContext, Handler, HandlerError, Outcome};

/// Payload of commands removing a record by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveById {
    pub id: String,
}

/// Replaces the record with the same id, if any, with the decoded payload.
///
/// Applying the same upsert twice leaves the table in the same state as applying it once, a
/// missing prior record is not an error.
pub struct Upsert<R>(PhantomData<fn() -> R>);

impl<R> Upsert<R> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<R> Default for Upsert<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S, R> Handler<S> for Upsert<R>
where
    S: TableStore,
    R: Record,
{
    async fn apply(
        &self,
        command: Command<'_>,
        cx: &mut ApplyContext<'_, S>,
    ) -> Result<Outcome, HandlerError> {
        let record: R = command.decode_payload()?;
        let id = record.id();
        cx.tx.delete::<R>(&id).await?;
        cx.tx.insert(&record).await?;
        trace!(table = R::TABLE, %id, "upserted record");
        Ok(Outcome::Applied)
    }
}

/// Deletes the record with the id given in a [`RemoveById`] payload.
pub struct Remove<R>(PhantomData<fn() -> R>);

impl<R> Remove<R> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<R> Default for Remove<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S, R> Handler<S> for Remove<R>
where
    S: TableStore,
    R: Record,
{
    async fn apply(
        &self,
        command: Command<'_>,
        cx: &mut ApplyContext<'_, S>,
    ) -> Result<Outcome, HandlerError> {
        let RemoveById { id } = command.decode_payload()?;
        cx.tx.delete::<R>(&id).await?;
        Ok(Outcome::Applied)
    }
}

/// Stores an invite record.
///
/// A revoked invite stays revoked and its use count never decreases, whatever copy of the record
/// is applied later.
pub struct AddInvite;

#[async_trait]
impl<S: TableStore> Handler<S> for AddInvite {
    async fn apply(
        &self,
        command: Command<'_>,
        cx: &mut ApplyContext<'_, S>,
    ) -> Result<Outcome, HandlerError> {
        let mut invite: Invite = command.decode_payload()?;
        let id = invite.id();
        if let Some(stored) = cx.tx.get::<Invite>(&id).await? {
            invite.is_revoked |= stored.is_revoked;
            invite.use_count = invite.use_count.max(stored.use_count);
        }
        cx.tx.delete::<Invite>(&id).await?;
        cx.tx.insert(&invite).await?;
        trace!(%id, revoked = invite.is_revoked, uses = invite.use_count, "stored invite");
        Ok(Outcome::Applied)
    }
}

/// Grants a key write access to the log and records it in the writers table.
pub struct AddWriter;

#[async_trait]
impl<S: TableStore> Handler<S> for AddWriter {
    async fn apply(
        &self,
        command: Command<'_>,
        cx: &mut ApplyContext<'_, S>,
    ) -> Result<Outcome, HandlerError> {
        let writer: Writer = command.decode_payload()?;
        cx.writers.add_writer(writer.key).await?;
        cx.tx.delete::<Writer>(&writer.id()).await?;
        cx.tx.insert(&writer).await?;
        Ok(Outcome::Applied)
    }
}

/// Revokes write access of a key.
pub struct RemoveWriter;

#[async_trait]
impl<S: TableStore> Handler<S> for RemoveWriter {
    async fn apply(
        &self,
        command: Command<'_>,
        cx: &mut ApplyContext<'_, S>,
    ) -> Result<Outcome, HandlerError> {
        let writer: Writer = command.decode_payload()?;
        cx.writers.remove_writer(writer.key).await?;
        cx.tx.delete::<Writer>(&writer.id()).await?;
        Ok(Outcome::Applied)
    }
}
