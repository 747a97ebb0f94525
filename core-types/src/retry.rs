// Copyright (c) James Kassemi, SC, US. All rights reserved.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Jittered exponential backoff for async network calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    cap: Duration,
    jitter: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, cap: Duration, jitter: f64) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            max_attempts: max_attempts.max(1),
            base,
            cap: cap.max(base),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn network() -> Self {
        Self::new(4, Duration::from_millis(200), Duration::from_secs(5), 0.25)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.cap);
        if self.jitter == 0.0 {
            return scaled;
        }
        let spread = scaled.as_millis() as f64 * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let millis = (scaled.as_millis() as f64 + offset).max(0.0) as u64;
        Duration::from_millis(millis)
    }

    /// Runs `op` until it succeeds or `max_attempts` is exhausted,
    /// sleeping between attempts. The final error is returned as-is.
    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    sleep(self.delay_for(attempt - 1)).await;
                }
            }
        }
    }
}
