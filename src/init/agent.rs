// SPDX-License-Identifier: Apache-2.0

use crate::exporters::{Delivery, Dispatcher, HttpDelivery, NoopDelivery};
use crate::init::args::TailArgs;
use crate::receivers::file::Sweeper;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::info;

/// A configured tailer, ready to run
pub struct Agent {
    sweeper: Sweeper,
}

impl Agent {
    /// Build the delivery, dispatcher and sweeper from the command line.
    ///
    /// All configuration problems surface here, before anything is tailed.
    pub fn new(args: Box<TailArgs>) -> Result<Self, BoxError> {
        let delivery = build_delivery(&args)?;
        let dispatcher = Dispatcher::new(args.rate_limiter(), delivery);
        let sweeper = Sweeper::new(args.tail_config(), dispatcher)?;

        info!(
            rate_limit = args.rate_limit,
            burst = args.burst.unwrap_or(args.rate_limit),
            dry_run = args.dry_run,
            "Configured tailer"
        );

        Ok(Self { sweeper })
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), BoxError> {
        self.sweeper.run(cancel).await?;
        info!(
            delivered = self.sweeper.dispatcher().delivered(),
            "Tailer stopped"
        );
        Ok(())
    }
}

fn build_delivery(args: &TailArgs) -> Result<Box<dyn Delivery>, BoxError> {
    if args.dry_run {
        return Ok(Box::new(NoopDelivery::new()));
    }

    match args.http_config() {
        Some(config) => {
            info!(url = %config.url, "Delivering lines over HTTP");
            Ok(Box::new(HttpDelivery::new(config)?))
        }
        None => Err("a url is required unless running with --dry-run".into()),
    }
}
