// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};
use tracing::info;

use crate::exporters::{Delivery, DeliveryFuture};

/// Delivery that logs each line and always succeeds.
///
/// Clones share the recorded lines, so a handle kept outside the dispatcher can
/// inspect what was delivered.
#[derive(Clone, Default)]
pub struct NoopDelivery {
    lines: Arc<Mutex<Vec<String>>>,
}

impl NoopDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines delivered so far, in order
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Forget the recorded lines
    pub fn clear(&self) {
        match self.lines.lock() {
            Ok(mut lines) => lines.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Delivery for NoopDelivery {
    fn deliver<'a>(&'a self, line: &'a str) -> DeliveryFuture<'a> {
        Box::pin(async move {
            info!(line, "Received line");
            match self.lines.lock() {
                Ok(mut lines) => lines.push(line.to_string()),
                Err(poisoned) => poisoned.into_inner().push(line.to_string()),
            }
            Ok(())
        })
    }
}
