// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration of rooms and users.
use std::time::Duration;

use agora_pairing::DEFAULT_INVITE_LIFETIME;
use agora_stream::{DEFAULT_RECONCILE_INTERVAL, EngineConfig};

/// Time a joining replica waits for a member to admit it to a room.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Time a new device waits for an existing device to admit it to the user log.
pub const DEFAULT_PAIR_TIMEOUT: Duration = Duration::from_secs(45);

/// Time a recovering device waits for another device of the same identity to answer.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration parameters for a room.
#[derive(Clone, Debug)]
pub struct RoomConfig {
    /// Interval of the view reconciliation timer, `None` disables the timer.
    ///
    /// Default is 4 seconds.
    pub reconcile_interval: Option<Duration>,

    /// Upper bound for the whole join flow, from sending the invite until the local replica is
    /// writable.
    ///
    /// Default is 30 seconds.
    pub join_timeout: Duration,

    /// Lifetime of invites created without an explicit expiry.
    ///
    /// Default is 24 hours.
    pub invite_lifetime: Duration,

    /// Listen for candidates on the discovery topic of the room and admit them.
    ///
    /// Default is `true`.
    pub replicate: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Some(DEFAULT_RECONCILE_INTERVAL),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            invite_lifetime: DEFAULT_INVITE_LIFETIME,
            replicate: true,
        }
    }
}

impl RoomConfig {
    pub(crate) fn engine(&self) -> EngineConfig {
        EngineConfig {
            reconcile_interval: self.reconcile_interval,
            ..Default::default()
        }
    }
}

/// Configuration parameters for a user and the rooms it opens.
#[derive(Clone, Debug)]
pub struct UserConfig {
    /// Interval of the view reconciliation timer of the user log, `None` disables the timer.
    ///
    /// Default is 4 seconds.
    pub reconcile_interval: Option<Duration>,

    /// Upper bound for pairing a new device with an existing one.
    ///
    /// Default is 45 seconds.
    pub pair_timeout: Duration,

    /// Time to wait for another device answering a recovery request before a fresh user log is
    /// created from the seed.
    ///
    /// Default is 120 seconds.
    pub recovery_timeout: Duration,

    /// Lifetime of device pairing invites.
    ///
    /// Default is 24 hours.
    pub invite_lifetime: Duration,

    /// Configuration of every room opened by this user.
    pub room: RoomConfig,

    /// Run the member listener and the recovery responder of the user log.
    ///
    /// Default is `true`.
    pub replicate: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Some(DEFAULT_RECONCILE_INTERVAL),
            pair_timeout: DEFAULT_PAIR_TIMEOUT,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            invite_lifetime: DEFAULT_INVITE_LIFETIME,
            room: RoomConfig::default(),
            replicate: true,
        }
    }
}

impl UserConfig {
    pub(crate) fn engine(&self) -> EngineConfig {
        EngineConfig {
            reconcile_interval: self.reconcile_interval,
            ..Default::default()
        }
    }
}
