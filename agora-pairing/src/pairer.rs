// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drives a candidate from presenting its invite to holding a writable replica.
use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::candidate::{Candidate, CandidateState};
use crate::error::PairingError;
use crate::message::Confirmation;
use crate::transport::Transport;

/// Aggregate opened on the log a candidate got admitted to.
pub trait Bound: Send + Sync + 'static {
    /// Writability of the local replica, becomes true once the admission was applied locally.
    fn writable(&self) -> watch::Receiver<bool>;

    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Running pairing flow.
///
/// The whole flow is bounded by one deadline. Pairing resolves only after the admitted writer key
/// became effective in the local replica, a replica opened before failing or closing is closed
/// again.
pub struct Pairer<B> {
    state: watch::Receiver<CandidateState>,
    result: Option<oneshot::Receiver<Result<B, PairingError>>>,
    token: CancellationToken,
}

impl<B: Bound> Pairer<B> {
    /// Start pairing, `bind` opens the aggregate once a member confirmed the candidate.
    pub fn spawn<T, F, Fut, E>(candidate: Candidate<T>, timeout: Duration, bind: F) -> Self
    where
        T: Transport,
        F: FnOnce(Confirmation) -> Fut + Send + 'static,
        Fut: Future<Output = Result<B, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let state = candidate.subscribe();
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();

        tokio::spawn({
            let token = token.clone();
            async move {
                let deadline = Instant::now() + timeout;
                let result = pair(&candidate, bind, deadline, &token).await;
                if let Err(err) = &result {
                    debug!(%err, invite = %candidate.invite().id(), "pairing failed");
                    candidate.set_state(CandidateState::Failed);
                }
                if let Err(Ok(target)) = tx.send(result) {
                    target.close().await;
                }
            }
        });

        Self {
            state,
            result: Some(rx),
            token,
        }
    }

    pub fn state(&self) -> CandidateState {
        *self.state.borrow()
    }

    /// Wait for the outcome of the pairing, can only be taken once.
    pub async fn finished(&mut self) -> Result<B, PairingError> {
        let Some(result) = self.result.take() else {
            return Err(PairingError::Closed);
        };
        result.await.unwrap_or(Err(PairingError::Closed))
    }

    /// Abort pairing, an unfinished flow resolves with [`PairingError::Closed`].
    pub fn close(&self) {
        self.token.cancel();
    }
}

impl<B> Drop for Pairer<B> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn pair<T, B, F, Fut, E>(
    candidate: &Candidate<T>,
    bind: F,
    deadline: Instant,
    token: &CancellationToken,
) -> Result<B, PairingError>
where
    T: Transport,
    B: Bound,
    F: FnOnce(Confirmation) -> Fut,
    Fut: Future<Output = Result<B, E>>,
    E: fmt::Display,
{
    let confirmation = bounded(token, deadline, candidate.request()).await??;
    candidate.set_state(CandidateState::BoundNotWritable);

    let target = bounded(token, deadline, bind(confirmation))
        .await?
        .map_err(|err| PairingError::Bind(err.to_string()))?;

    let mut writable = target.writable();
    let ready = bounded(token, deadline, writable.wait_for(|writable| *writable))
        .await
        .map(|result| result.is_ok());

    match ready {
        Ok(true) => {
            candidate.set_state(CandidateState::Writable);
            Ok(target)
        }
        Ok(false) => {
            target.close().await;
            Err(PairingError::Closed)
        }
        Err(err) => {
            target.close().await;
            Err(err)
        }
    }
}

async fn bounded<F: Future>(
    token: &CancellationToken,
    deadline: Instant,
    future: F,
) -> Result<F::Output, PairingError> {
    tokio::select! {
        biased;

        _ = token.cancelled() => Err(PairingError::Closed),
        result = tokio::time::timeout_at(deadline, future) => {
            result.map_err(|_| PairingError::Timeout)
        }
    }
}
