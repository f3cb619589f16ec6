// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recovery of a user log on a new device from the seed phrase alone.
//!
//! Devices of an identity listen on the discovery topic derived from its seed. A recovering
//! device proves knowledge of the seed by signing its request with the identity key and receives
//! a single-use pairing invite to the user log in return.
use std::time::Duration;

use agora_core::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use agora_core::{PublicKey, SeedKeys, Signature, Timestamp};
use agora_pairing::{IncomingRequest, Listener, PairingError, Topic, Transport, TransportError};
use agora_store::{Log, TableStore};
use agora_stream::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::admission::{self, AdmissionError, InviteOptions};

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("recovery request was rejected")]
    Rejected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Request for an invite to the user log, signed with the identity key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRequest {
    pub public_key: PublicKey,
    pub timestamp: Timestamp,
    pub signature: Signature,
}

impl RecoveryRequest {
    pub fn new(keys: &SeedKeys) -> Result<Self, EncodeError> {
        let timestamp = Timestamp::now();
        let bytes = signable_bytes(&keys.public_key, timestamp)?;
        Ok(Self {
            public_key: keys.public_key,
            timestamp,
            signature: keys.private_key.sign(&bytes),
        })
    }

    /// Returns true if the request was signed by the identity `public_key`.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        if &self.public_key != public_key {
            return false;
        }
        match signable_bytes(&self.public_key, self.timestamp) {
            Ok(bytes) => public_key.verify(&bytes, &self.signature),
            Err(_) => false,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_cbor(bytes)
    }
}

fn signable_bytes(public_key: &PublicKey, timestamp: Timestamp) -> Result<Vec<u8>, EncodeError> {
    encode_cbor(&(public_key, timestamp))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryResponse {
    /// Pairing invite code to the user log.
    Invite(String),

    Rejected,
}

impl RecoveryResponse {
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_cbor(bytes)
    }
}

/// Ask the devices of an identity for an invite to its user log.
pub async fn request_invite<T: Transport>(
    transport: &T,
    keys: &SeedKeys,
) -> Result<String, RecoveryError> {
    let request = RecoveryRequest::new(keys)?.to_bytes()?;
    let response = transport.request(keys.discovery_key, request).await?;
    match RecoveryResponse::from_bytes(&response)? {
        RecoveryResponse::Invite(code) => Ok(code),
        RecoveryResponse::Rejected => Err(RecoveryError::Rejected),
    }
}

/// Running recovery responder, stopped with [`RecoveryResponder::close`] or when dropped.
#[derive(Debug)]
pub struct RecoveryResponder {
    topic: Topic,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RecoveryResponder {
    /// Answer recovery requests of the identity with invites to the log driven by `engine`.
    pub async fn spawn<T, L, S>(
        transport: &T,
        keys: &SeedKeys,
        engine: Engine<L, S>,
        invite_lifetime: Duration,
    ) -> Result<Self, PairingError>
    where
        T: Transport,
        L: Log,
        S: TableStore,
    {
        let topic = keys.discovery_key;
        let listener = transport.listen(topic).await?;
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(
            listener,
            keys.public_key,
            engine,
            invite_lifetime,
            token.clone(),
        ));
        debug!(%topic, "listening for recovery requests");

        Ok(Self {
            topic,
            token,
            handle: Some(handle),
        })
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub async fn close(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RecoveryResponder {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run<Li, L, S>(
    mut listener: Li,
    public_key: PublicKey,
    engine: Engine<L, S>,
    invite_lifetime: Duration,
    token: CancellationToken,
) where
    Li: Listener,
    L: Log,
    S: TableStore,
{
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,
            incoming = listener.accept() => {
                let Some(incoming) = incoming else {
                    break;
                };
                if let Err(err) = answer(&engine, &public_key, invite_lifetime, incoming).await {
                    warn!(%err, "failed answering recovery request");
                }
            }
        }
    }

    debug!(topic = %listener.topic(), "stopped listening for recovery requests");
}

/// Answer one recovery request, returns true if an invite was handed out.
async fn answer<L, S>(
    engine: &Engine<L, S>,
    public_key: &PublicKey,
    invite_lifetime: Duration,
    incoming: IncomingRequest,
) -> Result<bool, RecoveryError>
where
    L: Log,
    S: TableStore,
{
    let verified = RecoveryRequest::from_bytes(&incoming.payload)
        .map(|request| request.verify(public_key))
        .unwrap_or(false);
    if !verified {
        debug!("rejected recovery request without valid identity signature");
        incoming.respond(RecoveryResponse::Rejected.to_bytes()?)?;
        return Ok(false);
    }

    let options = InviteOptions {
        expires: None,
        max_uses: 1,
    };
    let response = match admission::store_invite(engine, None, invite_lifetime, options).await {
        Ok(code) => RecoveryResponse::Invite(code),
        Err(err) => {
            warn!(%err, "failed creating recovery invite");
            RecoveryResponse::Rejected
        }
    };
    let answered = matches!(response, RecoveryResponse::Invite(_));
    incoming.respond(response.to_bytes()?)?;
    Ok(answered)
}

#[cfg(test)]
mod tests {
    use agora_core::SeedKeys;

    use super::RecoveryRequest;

    #[test]
    fn requests_are_bound_to_the_identity() {
        let ant = SeedKeys::derive("ant seed");
        let bat = SeedKeys::derive("bat seed");

        let request = RecoveryRequest::new(&ant).unwrap();
        assert!(request.verify(&ant.public_key));
        assert!(!request.verify(&bat.public_key));

        let decoded = RecoveryRequest::from_bytes(&request.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, request);

        let mut forged = RecoveryRequest::new(&bat).unwrap();
        forged.public_key = ant.public_key;
        assert!(!forged.verify(&ant.public_key));
    }
}
