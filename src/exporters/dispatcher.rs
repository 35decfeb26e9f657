// SPDX-License-Identifier: Apache-2.0

use tracing::debug;

use crate::exporters::Delivery;
use crate::exporters::rate_limit::TokenBucket;
use crate::receivers::file::error::{Error, Result};

/// Rate limited front of a delivery capability.
///
/// Every delivery first waits for a token, which bounds outbound throughput no
/// matter how quickly lines are read.
pub struct Dispatcher {
    limiter: TokenBucket,
    delivery: Box<dyn Delivery>,
    delivered: u64,
}

impl Dispatcher {
    pub fn new(limiter: TokenBucket, delivery: Box<dyn Delivery>) -> Self {
        Self {
            limiter,
            delivery,
            delivered: 0,
        }
    }

    /// Deliver one line once the rate limiter allows it
    pub async fn deliver(&mut self, line: &str) -> Result<()> {
        self.limiter.acquire().await;

        self.delivery.deliver(line).await.map_err(Error::Delivery)?;
        self.delivered += 1;
        debug!(bytes = line.len(), "Delivered line");
        Ok(())
    }

    /// Number of lines delivered successfully since creation
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}
