// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Display;
use std::ops::Add;
use std::time::Duration;
#[cfg(not(test))]
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

#[cfg(test)]
use mock_instant::SystemTimeError;
#[cfg(test)]
use mock_instant::thread_local::{SystemTime, UNIX_EPOCH};
use serde::{Deserialize, Serialize};

/// Milliseconds since the UNIX epoch based on system time.
#[derive(
    Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Current system time. Falls back to the epoch when the clock reports a time before it.
    pub fn now() -> Self {
        SystemTime::now().try_into().unwrap_or_default()
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl From<Timestamp> for u64 {
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl TryFrom<SystemTime> for Timestamp {
    type Error = SystemTimeError;

    fn try_from(system_time: SystemTime) -> Result<Self, Self::Error> {
        let duration = system_time.duration_since(UNIX_EPOCH)?;
        Ok(Self(duration.as_millis() as u64))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(rhs.as_millis() as u64))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mock_instant::thread_local::MockClock;

    use super::Timestamp;

    #[test]
    fn now_follows_system_clock() {
        MockClock::set_system_time(Duration::from_secs(10));
        assert_eq!(Timestamp::now(), Timestamp::new(10_000));

        MockClock::advance_system_time(Duration::from_millis(250));
        assert_eq!(Timestamp::now(), Timestamp::new(10_250));
    }

    #[test]
    fn add_duration_saturates() {
        let timestamp = Timestamp::new(1_000) + Duration::from_secs(24 * 60 * 60);
        assert_eq!(timestamp.as_millis(), 86_401_000);
        assert_eq!(
            Timestamp::new(u64::MAX) + Duration::from_secs(1),
            Timestamp::new(u64::MAX)
        );
    }
}
