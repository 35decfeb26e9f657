// SPDX-License-Identifier: Apache-2.0

//! Delivery of tailed lines to a sink.

pub mod dispatcher;
pub mod http;
pub mod noop;
pub mod rate_limit;

use std::future::Future;
use std::pin::Pin;
use tower::BoxError;

pub use dispatcher::Dispatcher;
pub use http::{HttpDelivery, HttpDeliveryConfig};
pub use noop::NoopDelivery;
pub use rate_limit::TokenBucket;

pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'a>>;

/// Sends a single line to a sink.
///
/// Resolves to `Ok(())` only when the sink reported success. Any other outcome,
/// transport failures included, is an error carrying the cause.
pub trait Delivery: Send + Sync {
    fn deliver<'a>(&'a self, line: &'a str) -> DeliveryFuture<'a>;
}
