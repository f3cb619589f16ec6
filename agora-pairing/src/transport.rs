// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic-scoped request/response transport between replicas.
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use agora_core::Hash;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

/// Topic requests are addressed to, usually the discovery key of a log.
pub type Topic = Hash;

/// Request received by a listener, answered at most once.
#[derive(Debug)]
pub struct IncomingRequest {
    pub topic: Topic,
    pub payload: Vec<u8>,
    reply: oneshot::Sender<Vec<u8>>,
}

impl IncomingRequest {
    pub fn new(topic: Topic, payload: Vec<u8>) -> (Self, oneshot::Receiver<Vec<u8>>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                topic,
                payload,
                reply,
            },
            rx,
        )
    }

    /// Send the response back to the requesting peer.
    pub fn respond(self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.reply
            .send(payload)
            .map_err(|_| TransportError::RequesterGone)
    }
}

/// Incoming requests of one topic.
pub trait Listener: Send + 'static {
    fn topic(&self) -> Topic;

    /// Next request, `None` once the transport stopped delivering to this listener.
    fn accept(&mut self) -> impl Future<Output = Option<IncomingRequest>> + Send;
}

pub trait Transport: Clone + Send + Sync + 'static {
    type Listener: Listener;

    /// Start receiving requests sent to `topic`.
    fn listen(
        &self,
        topic: Topic,
    ) -> impl Future<Output = Result<Self::Listener, TransportError>> + Send;

    /// Send a request to any listener of `topic` and wait for its response.
    ///
    /// Dropping the returned future withdraws the request.
    fn request(
        &self,
        topic: Topic,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request was dropped without a response")]
    NoResponse,

    #[error("requesting peer is gone")]
    RequesterGone,
}

#[derive(Debug, Default)]
struct InnerMemoryTransport {
    next_id: u64,
    listeners: HashMap<Topic, Vec<(u64, mpsc::UnboundedSender<IncomingRequest>)>>,
    pending: HashMap<Topic, Vec<(u64, IncomingRequest)>>,
}

impl InnerMemoryTransport {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Hand the request to the first listener which is still receiving.
    fn deliver(&mut self, mut request: IncomingRequest) -> Result<(), IncomingRequest> {
        let topic = request.topic;
        let Some(listeners) = self.listeners.get_mut(&topic) else {
            return Err(request);
        };
        for (_, tx) in listeners.iter() {
            match tx.send(request) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => request = returned,
            }
        }
        Err(request)
    }
}

/// In-process transport connecting all replicas sharing one instance.
///
/// Requests sent to a topic nobody listens on yet are queued until a listener shows up or the
/// requester gives up.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<InnerMemoryTransport>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active listeners over all topics.
    pub fn listener_count(&self) -> usize {
        let inner = self.inner.lock().expect("acquire transport lock");
        inner.listeners.values().map(Vec::len).sum()
    }

    /// Number of queued requests over all topics.
    pub fn pending_count(&self) -> usize {
        let inner = self.inner.lock().expect("acquire transport lock");
        inner.pending.values().map(Vec::len).sum()
    }
}

impl Transport for MemoryTransport {
    type Listener = MemoryListener;

    async fn listen(&self, topic: Topic) -> Result<Self::Listener, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = self.inner.lock().expect("acquire transport lock");
        let id = inner.next_id();
        for (_, request) in inner.pending.remove(&topic).unwrap_or_default() {
            let _ = tx.send(request);
        }
        inner.listeners.entry(topic).or_default().push((id, tx));
        trace!(%topic, id, "listening on topic");

        Ok(MemoryListener {
            topic,
            id,
            requests: rx,
            transport: self.inner.clone(),
        })
    }

    async fn request(&self, topic: Topic, payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let (request, response) = IncomingRequest::new(topic, payload);

        let _guard = {
            let mut inner = self.inner.lock().expect("acquire transport lock");
            match inner.deliver(request) {
                Ok(()) => None,
                Err(request) => {
                    let id = inner.next_id();
                    inner.pending.entry(topic).or_default().push((id, request));
                    trace!(%topic, id, "queued request");
                    Some(PendingGuard {
                        topic,
                        id,
                        transport: self.inner.clone(),
                    })
                }
            }
        };

        response.await.map_err(|_| TransportError::NoResponse)
    }
}

/// Withdraws a queued request once the requester stops waiting for it.
struct PendingGuard {
    topic: Topic,
    id: u64,
    transport: Arc<Mutex<InnerMemoryTransport>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let Ok(mut inner) = self.transport.lock() else {
            return;
        };
        if let Some(pending) = inner.pending.get_mut(&self.topic) {
            pending.retain(|(id, _)| *id != self.id);
            if pending.is_empty() {
                inner.pending.remove(&self.topic);
            }
        }
    }
}

/// Listener of a [`MemoryTransport`], unregisters itself when dropped.
#[derive(Debug)]
pub struct MemoryListener {
    topic: Topic,
    id: u64,
    requests: mpsc::UnboundedReceiver<IncomingRequest>,
    transport: Arc<Mutex<InnerMemoryTransport>>,
}

impl Listener for MemoryListener {
    fn topic(&self) -> Topic {
        self.topic
    }

    async fn accept(&mut self) -> Option<IncomingRequest> {
        self.requests.recv().await
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        let Ok(mut inner) = self.transport.lock() else {
            return;
        };
        if let Some(listeners) = inner.listeners.get_mut(&self.topic) {
            listeners.retain(|(id, _)| *id != self.id);
            if listeners.is_empty() {
                inner.listeners.remove(&self.topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use agora_core::Hash;
    use assert_matches::assert_matches;

    use super::{Listener, MemoryTransport, Transport, TransportError};

    #[tokio::test]
    async fn request_response() {
        let transport = MemoryTransport::new();
        let topic = Hash::new(b"garden");

        let mut listener = transport.listen(topic).await.unwrap();
        let responder = tokio::spawn(async move {
            let request = listener.accept().await.unwrap();
            assert_eq!(request.payload, b"ping");
            request.respond(b"pong".to_vec()).unwrap();
            listener
        });

        let response = transport.request(topic, b"ping".to_vec()).await.unwrap();
        assert_eq!(response, b"pong");

        let listener = responder.await.unwrap();
        assert_eq!(transport.listener_count(), 1);
        drop(listener);
        assert_eq!(transport.listener_count(), 0);
    }

    #[tokio::test]
    async fn queued_until_listener_appears() {
        let transport = MemoryTransport::new();
        let topic = Hash::new(b"garden");

        let requester = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.request(topic, b"hello".to_vec()).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(transport.pending_count(), 1);

        let mut listener = transport.listen(topic).await.unwrap();
        assert_eq!(transport.pending_count(), 0);
        let request = listener.accept().await.unwrap();

        // Dropping the request without answering it.
        drop(request);
        assert_matches!(requester.await.unwrap(), Err(TransportError::NoResponse));
    }

    #[tokio::test(start_paused = true)]
    async fn withdrawn_requests_are_removed() {
        let transport = MemoryTransport::new();
        let topic = Hash::new(b"garden");

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            transport.request(topic, b"hello".to_vec()),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(transport.pending_count(), 0);
        assert_eq!(transport.listener_count(), 0);
    }
}
