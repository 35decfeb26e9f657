// SPDX-License-Identifier: Apache-2.0

//! Token bucket limiting the rate of outbound deliveries.

use std::time::Duration;
use tokio::time::Instant;

/// Token bucket rate limiter.
///
/// Tokens are added at `rate` per second up to `capacity` (the burst size). The
/// bucket starts full. Each acquire takes one token, waiting until one is available.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    /// Create a bucket adding `rate` tokens per second, holding at most `burst`
    pub fn new(rate: u32, burst: u32) -> Self {
        let capacity = burst.max(1) as f64;
        Self {
            rate: rate.max(1) as f64,
            capacity,
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.capacity as u32
    }

    /// Wait until a token is available and take it
    pub async fn acquire(&mut self) {
        loop {
            self.refill();
            if self.tokens >= 1.0 {
                self.tokens -= 1.0;
                return;
            }

            let wait = Duration::from_secs_f64((1.0 - self.tokens) / self.rate);
            tokio::time::sleep(wait.max(Duration::from_micros(1))).await;
        }
    }

    /// Take a token if one is available right now
    #[cfg(test)]
    fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }
}
