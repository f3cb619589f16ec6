// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inviting side of the admission protocol.
//!
//! A member listens on the discovery topic of a log. Every candidate request is checked against
//! the stored invite it refers to, and the presented writer key gets admitted to the log only if
//! the invite is still redeemable and the candidate proved possession of it.
use agora_core::model::Invite;
use agora_core::{Hash, PublicKey, Timestamp};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PairingError;
use crate::message::{Confirmation, PairingRequest, PairingResponse};
use crate::transport::{IncomingRequest, Listener, Topic, Transport};

/// Access to the invites and writer set of the log a member admits candidates to.
#[async_trait]
pub trait Admission: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn find_invite(&self, id: &Hash) -> Result<Option<Invite>, Self::Error>;

    /// Add `candidate` to the writers of the log and return what it needs to open it.
    async fn admit(&self, invite: &Invite, candidate: PublicKey)
    -> Result<Confirmation, Self::Error>;
}

/// Request of a single candidate, as seen by a member.
#[derive(Debug)]
pub struct CandidateRequest {
    incoming: IncomingRequest,
    request: PairingRequest,
    user_data: Option<PublicKey>,
}

impl CandidateRequest {
    pub fn new(incoming: IncomingRequest, request: PairingRequest) -> Self {
        Self {
            incoming,
            request,
            user_data: None,
        }
    }

    pub fn invite_id(&self) -> Hash {
        self.request.invite_id
    }

    /// Verify the request against the invite key and reveal the presented writer key.
    pub fn open(&mut self, public_key: &PublicKey) -> Result<PublicKey, PairingError> {
        if !self.request.verify(public_key) {
            return Err(PairingError::Rejected);
        }
        self.user_data = Some(self.request.user_data);
        Ok(self.request.user_data)
    }

    /// Writer key of the candidate, available once the request was opened.
    pub fn user_data(&self) -> Option<PublicKey> {
        self.user_data
    }

    pub fn confirm(self, confirmation: Confirmation) -> Result<(), PairingError> {
        if self.user_data.is_none() {
            return Err(PairingError::Rejected);
        }
        respond(self.incoming, &PairingResponse::Confirmed(confirmation))
    }

    pub fn reject(self) -> Result<(), PairingError> {
        respond(self.incoming, &PairingResponse::Rejected)
    }
}

fn respond(incoming: IncomingRequest, response: &PairingResponse) -> Result<(), PairingError> {
    incoming.respond(response.to_bytes()?)?;
    Ok(())
}

/// Running member listener, stopped with [`Member::close`] or when dropped.
#[derive(Debug)]
pub struct Member {
    topic: Topic,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Member {
    /// Listen for candidates on `topic` and admit them with `admission`.
    pub async fn spawn<T, A>(transport: &T, topic: Topic, admission: A) -> Result<Self, PairingError>
    where
        T: Transport,
        A: Admission,
    {
        let listener = transport.listen(topic).await?;
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(listener, admission, token.clone()));
        debug!(%topic, "member listening for candidates");

        Ok(Self {
            topic,
            token,
            handle: Some(handle),
        })
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Stop listening, waiting for a request which is currently handled.
    pub async fn close(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Member {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run<L, A>(mut listener: L, admission: A, token: CancellationToken)
where
    L: Listener,
    A: Admission,
{
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,
            incoming = listener.accept() => {
                let Some(incoming) = incoming else {
                    break;
                };
                if let Err(err) = handle_request(&admission, incoming).await {
                    warn!(%err, "failed answering candidate");
                }
            }
        }
    }

    debug!(topic = %listener.topic(), "member stopped listening");
}

/// Answer one candidate request, returns true if the candidate was admitted.
pub async fn handle_request<A: Admission>(
    admission: &A,
    incoming: IncomingRequest,
) -> Result<bool, PairingError> {
    let request = match PairingRequest::from_bytes(&incoming.payload) {
        Ok(request) => request,
        Err(err) => {
            debug!(%err, "received malformed pairing request");
            respond(incoming, &PairingResponse::Rejected)?;
            return Ok(false);
        }
    };
    let mut candidate = CandidateRequest::new(incoming, request);

    let invite = match admission.find_invite(&candidate.invite_id()).await {
        Ok(Some(invite)) => invite,
        Ok(None) => {
            debug!(invite = %candidate.invite_id(), "unknown invite");
            candidate.reject()?;
            return Ok(false);
        }
        Err(err) => {
            warn!(%err, "failed looking up invite");
            candidate.reject()?;
            return Ok(false);
        }
    };

    if !invite.is_redeemable(Timestamp::now()) {
        debug!(invite = %invite.id, "invite is revoked, expired or used up");
        candidate.reject()?;
        return Ok(false);
    }

    let Ok(user_data) = candidate.open(&invite.public_key) else {
        debug!(invite = %invite.id, "candidate failed proving invite possession");
        candidate.reject()?;
        return Ok(false);
    };

    match admission.admit(&invite, user_data).await {
        Ok(confirmation) => {
            debug!(invite = %invite.id, candidate = %user_data, "admitted candidate");
            candidate.confirm(confirmation)?;
            Ok(true)
        }
        Err(err) => {
            warn!(%err, candidate = %user_data, "failed admitting candidate");
            candidate.reject()?;
            Ok(false)
        }
    }
}
