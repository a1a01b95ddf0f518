// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Collection of clock implementations.

use async_trait::async_trait;
use std::time::Duration;
use time::OffsetDateTime;

/// Generic definition of a clock.
#[async_trait]
pub trait Clock {
    /// Returns the current UTC time.
    fn now_utc(&self) -> OffsetDateTime;

    /// Pauses execution of the current task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Clock implementation that uses the system clock.
#[derive(Clone, Default)]
pub struct SystemClock {}

#[async_trait]
impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();

        // PostgreSQL timestamps only have microsecond resolution.
        match now.replace_nanosecond(now.nanosecond() / 1000 * 1000) {
            Ok(now) => now,
            Err(_) => unreachable!("Truncated nanoseconds are always in range"),
        }
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Test utilities.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// A clock that returns a different timestamp every time it is queried.
    ///
    /// Every call to `now_utc` advances the clock by one second, which guarantees that
    /// consecutive events get strictly increasing timestamps.
    pub struct MonotonicClock {
        /// Current fake time in seconds since the epoch.
        now_secs: AtomicU64,
    }

    impl MonotonicClock {
        /// Creates a new clock whose first reading is `start_secs` seconds after the epoch.
        pub fn new(start_secs: u64) -> Self {
            Self { now_secs: AtomicU64::new(start_secs) }
        }
    }

    #[async_trait]
    impl Clock for MonotonicClock {
        fn now_utc(&self) -> OffsetDateTime {
            let now_secs = self.now_secs.fetch_add(1, Ordering::SeqCst);
            OffsetDateTime::from_unix_timestamp(now_secs as i64).unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.now_secs.fetch_add(duration.as_secs(), Ordering::SeqCst);
            tokio::task::yield_now().await;
        }
    }

    /// A clock that returns a preconfigured instant and that can be modified at will.
    ///
    /// Only supports microsecond-level precision.
    pub struct SettableClock {
        /// Current fake time in microseconds.
        now_us: AtomicU64,
    }

    /// Converts `nanos` to microseconds, panicking if precision would be lost.
    fn nanos_to_micros(nanos: i128) -> u64 {
        assert!(nanos % 1000 == 0, "Nanosecond precision not supported");
        u64::try_from(nanos / 1000).unwrap()
    }

    impl SettableClock {
        /// Creates a new clock that returns `now` until reconfigured with `set`.
        pub fn new(now: OffsetDateTime) -> Self {
            Self { now_us: AtomicU64::new(nanos_to_micros(now.unix_timestamp_nanos())) }
        }

        /// Sets the new value of `now` that the clock returns.
        pub fn set(&self, now: OffsetDateTime) {
            self.now_us.store(nanos_to_micros(now.unix_timestamp_nanos()), Ordering::SeqCst);
        }

        /// Advances the current time by `delta`.
        pub fn advance(&self, delta: Duration) {
            let delta_us = nanos_to_micros(delta.as_nanos() as i128);
            self.now_us.fetch_add(delta_us, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Clock for SettableClock {
        fn now_utc(&self) -> OffsetDateTime {
            let now_us = self.now_us.load(Ordering::SeqCst);
            OffsetDateTime::from_unix_timestamp_nanos(now_us as i128 * 1000).unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
            tokio::task::yield_now().await;
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_systemclock_trivial() {
        let clock = SystemClock::default();
        let now1 = clock.now_utc();
        assert!(now1.unix_timestamp_nanos() > 0);
        let now2 = clock.now_utc();
        assert!(now2 >= now1);
    }

    #[test]
    fn test_systemclock_microsecond_resolution() {
        let clock = SystemClock::default();
        let now = clock.now_utc();
        assert!(now.unix_timestamp_nanos() > 0);
        assert_eq!(0, now.nanosecond() % 1000);
    }
}
