// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Exponential backoff with seeded jitter, and a retry helper built on top of it.

use std::{future::Future, time::Duration};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

/// Configuration for [`ExponentialBackoff`] strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExponentialBackoffConfig {
    /// The minimum (and initial) backoff duration.
    pub min_backoff: Duration,
    /// The maximum backoff duration.
    pub max_backoff: Duration,
    /// The maximum number of retries; unlimited if `None`.
    pub max_retries: Option<u32>,
}

impl Default for ExponentialBackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_retries: Some(5),
        }
    }
}

impl ExponentialBackoffConfig {
    /// Returns a backoff strategy with jitter derived from the provided seed.
    pub fn get_strategy(&self, seed: u64) -> ExponentialBackoff {
        ExponentialBackoff::new_with_seed(
            self.min_backoff,
            self.max_backoff,
            self.max_retries,
            seed,
        )
    }
}

/// An iterator over exponentially growing backoff delays with random jitter.
///
/// The `i`-th delay is `min(min_backoff * 2^i, max_backoff)` plus a jitter of up to half the
/// minimum backoff. The jitter is drawn from a seeded RNG so that concurrent strategies (e.g.,
/// one per storage node) do not produce synchronized retry storms.
#[derive(Debug)]
pub struct ExponentialBackoff {
    min_backoff: Duration,
    max_backoff: Duration,
    max_retries: Option<u32>,
    retries_so_far: u32,
    rng: StdRng,
}

impl ExponentialBackoff {
    /// Creates a new strategy with jitter derived from the provided seed.
    pub fn new_with_seed(
        min_backoff: Duration,
        max_backoff: Duration,
        max_retries: Option<u32>,
        seed: u64,
    ) -> Self {
        Self {
            min_backoff,
            max_backoff,
            max_retries,
            retries_so_far: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn next_delay(&mut self) -> Duration {
        let exponent = self.retries_so_far.min(31);
        let base = self
            .min_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff);
        let jitter_limit = (self.min_backoff / 2).as_millis().max(1);
        let jitter = self.rng.gen_range(0..jitter_limit);
        base + Duration::from_millis(u64::try_from(jitter).expect("jitter limit fits into a u64"))
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if let Some(max_retries) = self.max_retries {
            if self.retries_so_far >= max_retries {
                return None;
            }
        }
        let delay = self.next_delay();
        self.retries_so_far += 1;
        Some(delay)
    }
}

/// Retries the future produced by `f` until it succeeds or the backoff strategy is exhausted.
///
/// Returns the last error if all retries fail.
pub async fn retry<S, F, Fut, T, E>(mut strategy: S, mut f: F) -> Result<T, E>
where
    S: Iterator<Item = Duration>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let Some(delay) = strategy.next() else {
                    return Err(error);
                };
                tracing::debug!(?delay, "operation failed; retrying after backoff");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn delays_grow_and_are_capped() {
        let config = ExponentialBackoffConfig {
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(450),
            max_retries: Some(10),
        };
        let delays: Vec<_> = config.get_strategy(42).collect();
        assert_eq!(delays.len(), 10);
        // Jitter is at most half the minimum backoff.
        assert!(delays[0] >= Duration::from_millis(100) && delays[0] < Duration::from_millis(150));
        assert!(delays[1] >= Duration::from_millis(200));
        for delay in &delays[3..] {
            assert!(*delay >= Duration::from_millis(450) && *delay < Duration::from_millis(500));
        }
    }

    #[test]
    fn strategy_is_deterministic_in_the_seed() {
        let config = ExponentialBackoffConfig::default();
        let a: Vec<_> = config.get_strategy(7).collect();
        let b: Vec<_> = config.get_strategy(7).collect();
        assert_eq!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_returns_first_success() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(
            ExponentialBackoffConfig::default().get_strategy(0),
            || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            },
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_surfaces_the_last_error_when_exhausted() {
        let config = ExponentialBackoffConfig {
            max_retries: Some(2),
            ..Default::default()
        };
        let attempts = AtomicU32::new(0);
        let result: Result<(), u32> = retry(config.get_strategy(0), || async {
            Err(attempts.fetch_add(1, Ordering::SeqCst))
        })
        .await;
        assert_eq!(result, Err(2));
    }
}
