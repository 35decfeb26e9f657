// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::crypto::CryptoProvider;
use std::time::Duration;
use tokio::time::timeout;
use tower::BoxError;
use tracing::warn;

use crate::exporters::{Delivery, DeliveryFuture};

/// Settings for the HTTP delivery
#[derive(Debug, Clone)]
pub struct HttpDeliveryConfig {
    /// Destination of the POST requests
    pub url: Uri,
    /// Value of the Content-Type header
    pub content_type: String,
    /// Maximum time for a single request, response included
    pub request_timeout: Duration,
}

/// Delivers each line as the body of a POST request.
///
/// A delivery succeeds only when the destination answers `200 OK`.
#[derive(Clone)]
pub struct HttpDelivery {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    url: Uri,
    content_type: HeaderValue,
    request_timeout: Duration,
}

impl HttpDelivery {
    pub fn new(config: HttpDeliveryConfig) -> Result<Self, BoxError> {
        init_crypto_provider()?;

        let content_type = HeaderValue::from_str(&config.content_type)
            .map_err(|e| format!("invalid content type {:?}: {}", config.content_type, e))?;

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .timer(TokioTimer::new())
            .build::<_, Full<Bytes>>(https);

        Ok(Self {
            client,
            url: config.url,
            content_type,
            request_timeout: config.request_timeout,
        })
    }

    async fn post(&self, line: &str) -> Result<(), BoxError> {
        let req = Request::builder()
            .method(Method::POST)
            .uri(self.url.clone())
            .header(CONTENT_TYPE, self.content_type.clone())
            .body(Full::new(Bytes::copy_from_slice(line.as_bytes())))?;

        let resp = match timeout(self.request_timeout, self.client.request(req)).await {
            Ok(resp) => resp?,
            Err(_) => {
                return Err(format!("request timed out after {:?}", self.request_timeout).into());
            }
        };

        let (head, body) = resp.into_parts();
        if head.status != StatusCode::OK {
            return Err(format!("unexpected response status: {}", head.status).into());
        }

        // Drain the body so the connection can be reused
        if let Err(e) = body.collect().await {
            warn!(error = %e, "Failed reading response body");
        }

        Ok(())
    }
}

impl Delivery for HttpDelivery {
    fn deliver<'a>(&'a self, line: &'a str) -> DeliveryFuture<'a> {
        Box::pin(self.post(line))
    }
}

pub fn init_crypto_provider() -> Result<(), BoxError> {
    if CryptoProvider::get_default().is_none() {
        // Losing the race to another installer is fine
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            if CryptoProvider::get_default().is_none() {
                return Err(format!("failed to initialize crypto library: {:?}", e).into());
            }
        }
    }
    Ok(())
}
