// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use agora_stream::Event;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::config::{RoomConfig, UserConfig};

/// Upper bound when waiting for an event in tests.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Install a tracing subscriber when `RUST_LOG` is set, for example `RUST_LOG=agora=debug`.
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Room configuration without reconciliation timer.
pub fn room_config() -> RoomConfig {
    RoomConfig {
        reconcile_interval: None,
        ..Default::default()
    }
}

/// User configuration without reconciliation timers.
pub fn user_config() -> UserConfig {
    UserConfig {
        reconcile_interval: None,
        room: room_config(),
        ..Default::default()
    }
}

/// Wait for the next event matching `predicate`, skipping all others.
///
/// Panics when no matching event arrives within [`EVENT_TIMEOUT`].
pub async fn wait_for_event<F>(events: &mut broadcast::Receiver<Event>, mut predicate: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    };
    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .expect("matching event within timeout")
}
