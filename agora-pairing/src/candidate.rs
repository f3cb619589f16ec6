// SPDX-License-Identifier: MIT OR Apache-2.0

//! Joining side of the admission protocol.
use agora_core::PublicKey;
use tokio::sync::watch;
use tracing::trace;

use crate::error::PairingError;
use crate::invite::InviteCode;
use crate::message::{Confirmation, PairingRequest, PairingResponse};
use crate::transport::Transport;

/// Progress of a candidate.
///
/// ```text
/// Opening -> AwaitingAccept -> BoundNotWritable -> Writable
///     \            \                  \
///      +------------+------------------+--> Failed
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CandidateState {
    #[default]
    Opening,
    AwaitingAccept,
    BoundNotWritable,
    Writable,
    Failed,
}

/// Presents an invite together with the local writer key to the members of a log.
#[derive(Debug)]
pub struct Candidate<T> {
    transport: T,
    invite: InviteCode,
    user_data: PublicKey,
    state: watch::Sender<CandidateState>,
}

impl<T: Transport> Candidate<T> {
    pub fn new(transport: T, invite: InviteCode, user_data: PublicKey) -> Self {
        Self {
            transport,
            invite,
            user_data,
            state: watch::Sender::new(CandidateState::Opening),
        }
    }

    pub fn invite(&self) -> &InviteCode {
        &self.invite
    }

    /// Writer key presented to the members.
    pub fn user_data(&self) -> PublicKey {
        self.user_data
    }

    pub fn state(&self) -> CandidateState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CandidateState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: CandidateState) {
        trace!(?state, invite = %self.invite.id(), "candidate state changed");
        self.state.send_replace(state);
    }

    /// Send the request and wait for a member to confirm it.
    pub async fn request(&self) -> Result<Confirmation, PairingError> {
        self.set_state(CandidateState::Opening);
        let request = PairingRequest::new(&self.invite, self.user_data)?;
        let bytes = request.to_bytes()?;

        self.set_state(CandidateState::AwaitingAccept);
        let response = self
            .transport
            .request(self.invite.discovery_key, bytes)
            .await?;

        match PairingResponse::from_bytes(&response)? {
            PairingResponse::Confirmed(confirmation) => Ok(confirmation),
            PairingResponse::Rejected => Err(PairingError::Rejected),
        }
    }
}
