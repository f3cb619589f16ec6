// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch of encoded log entries to registered command handlers.
use std::collections::HashMap;
use std::fmt;

use agora_core::command::{Command, CommandError, CommandId, CommandSpec, CommandTable};
use agora_core::{Domain, PublicKey};
use agora_store::{LogError, SeqNum, StoreError, TableStore, Writers};
use async_trait::async_trait;
use thiserror::Error;

use crate::auth::Rejection;

/// Result of applying a single command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The command changed (or confirmed) the local state.
    Applied,

    /// The command failed an authorization check and was dropped.
    Rejected(Rejection),
}

/// Everything a handler may touch while applying a command.
pub struct ApplyContext<'a, S: TableStore> {
    pub tx: &'a mut S::Transaction,

    /// Privileged writer set operations of the log being applied.
    pub writers: &'a dyn Writers,

    /// Sequence number of the entry being applied.
    pub seq: SeqNum,

    /// Writer key of the replica which appended the entry.
    pub writer: PublicKey,
}

/// Applies one kind of command to the table store.
#[async_trait]
pub trait Handler<S: TableStore>: Send + Sync {
    async fn apply(
        &self,
        command: Command<'_>,
        cx: &mut ApplyContext<'_, S>,
    ) -> Result<Outcome, HandlerError>;
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Decode(#[from] CommandError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Log(#[from] LogError),
}

/// Command kind and outcome of a dispatched entry.
#[derive(Clone, Copy, Debug)]
pub struct Dispatched {
    pub spec: CommandSpec,
    pub outcome: Outcome,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("entry is empty")]
    Empty,

    #[error("unknown command id {0}")]
    UnknownCommand(CommandId),

    #[error("no handler registered for command \"{0}\"")]
    MissingHandler(&'static str),

    #[error("failed applying command \"{0}\": {1}")]
    Handler(&'static str, HandlerError),
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("command \"{0}\" is not part of the command table")]
    UnknownCommand(String),
}

/// Open set of command handlers keyed by command id.
///
/// New command kinds are added by extending the command table and registering a handler for
/// them, dispatching itself never changes.
pub struct Router<S: TableStore> {
    table: CommandTable,
    handlers: HashMap<CommandId, Box<dyn Handler<S>>>,
    domains: HashMap<CommandId, &'static [Domain]>,
}

impl<S: TableStore> fmt::Debug for Router<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<CommandId> = self.handlers.keys().copied().collect();
        handlers.sort_unstable();
        f.debug_struct("Router")
            .field("table", &self.table)
            .field("handlers", &handlers)
            .finish()
    }
}

impl<S: TableStore> Router<S> {
    pub fn new(table: CommandTable) -> Self {
        Self {
            table,
            handlers: HashMap::new(),
            domains: HashMap::new(),
        }
    }

    /// Register the handler for the command with this name.
    pub fn register<H>(&mut self, name: &str, handler: H) -> Result<&mut Self, RouterError>
    where
        H: Handler<S> + 'static,
    {
        let spec = *self
            .table
            .lookup(name)
            .ok_or_else(|| RouterError::UnknownCommand(name.to_string()))?;
        self.domains.insert(spec.id, spec.domains);
        self.handlers.insert(spec.id, Box::new(handler));
        Ok(self)
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Domains touched by the command with this id, empty for unknown or unregistered commands.
    pub fn domains(&self, id: CommandId) -> &'static [Domain] {
        self.domains.get(&id).copied().unwrap_or_default()
    }

    /// Decode the entry and apply it with the matching handler.
    pub async fn dispatch(
        &self,
        bytes: &[u8],
        cx: &mut ApplyContext<'_, S>,
    ) -> Result<Dispatched, DispatchError> {
        let command = self.table.decode(bytes).map_err(|err| match err {
            CommandError::UnknownId(id) => DispatchError::UnknownCommand(id),
            _ => DispatchError::Empty,
        })?;
        let handler = self
            .handlers
            .get(&command.spec.id)
            .ok_or(DispatchError::MissingHandler(command.name()))?;
        let outcome = handler
            .apply(command, cx)
            .await
            .map_err(|err| DispatchError::Handler(command.name(), err))?;
        Ok(Dispatched {
            spec: command.spec,
            outcome,
        })
    }
}
