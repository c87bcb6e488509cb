// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Automatic reconnect timing.

use std::time::Duration;

use crate::error::ValueError;

/// Exponential reconnect policy: the delay starts at `initial_delay`, doubles
/// after every failed attempt and is capped at `max_delay`.
///
/// ```text
/// attempt 1: 2s
/// attempt 2: 4s
/// attempt 3: 8s
/// attempt 4: 16s
/// attempt 5+: 30s (capped)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    initial_delay: Duration,
    max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Creates a policy.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] if `initial_delay` is zero or `max_delay` is
    /// below `initial_delay`.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Result<Self, ValueError> {
        if initial_delay.is_zero() {
            return Err(ValueError::ZeroDuration("initial reconnect delay"));
        }
        if max_delay < initial_delay {
            // Safe: configured delays never approach u64::MAX milliseconds
            #[allow(clippy::cast_possible_truncation)]
            let (initial_ms, max_ms) = (
                initial_delay.as_millis() as u64,
                max_delay.as_millis() as u64,
            );
            return Err(ValueError::InvalidReconnectRange { initial_ms, max_ms });
        }
        Ok(Self {
            initial_delay,
            max_delay,
        })
    }

    /// Returns the delay before the first reconnect attempt.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Returns the delay cap.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Starts a fresh backoff sequence.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            next: self.initial_delay,
        }
    }
}

/// Running state of a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    next: Duration,
}

impl Backoff {
    /// Returns the delay to wait now and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self
            .next
            .checked_mul(2)
            .map_or(self.policy.max_delay, |d| d.min(self.policy.max_delay));
        delay
    }

    /// Restarts the sequence after a successful connection.
    pub fn reset(&mut self) {
        self.next = self.policy.initial_delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_ttn_client_settings() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.initial_delay(), Duration::from_secs(2));
        assert_eq!(policy.max_delay(), Duration::from_secs(30));
    }

    #[test]
    fn delays_double_until_capped() {
        let mut backoff = ReconnectPolicy::default().backoff();
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = ReconnectPolicy::default().backoff();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn equal_bounds_stay_constant() {
        let policy = ReconnectPolicy::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap();
        let mut backoff = policy.backoff();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_zero_initial_delay() {
        assert_eq!(
            ReconnectPolicy::new(Duration::ZERO, Duration::from_secs(1)),
            Err(ValueError::ZeroDuration("initial reconnect delay"))
        );
    }

    #[test]
    fn rejects_inverted_range() {
        let result = ReconnectPolicy::new(Duration::from_secs(10), Duration::from_secs(1));
        assert!(matches!(
            result,
            Err(ValueError::InvalidReconnectRange {
                initial_ms: 10_000,
                max_ms: 1_000
            })
        ));
    }
}
