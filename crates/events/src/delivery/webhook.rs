//! Webhook delivery over HTTP.
//!
//! [`HttpTransport`] posts a pre-serialized, pre-signed body. It performs a
//! single attempt; retries are scheduled by the dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};

use super::{DeliveryTransport, OutboundRequest, TransportResponse};

/// Default HTTP request timeout for a single delivery attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for webhook transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A header could not be encoded.
    #[error("Invalid header '{0}'")]
    InvalidHeader(&'static str),
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// Posts webhook bodies with a shared `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &request.headers {
            // `from_bytes` lowercases the configured mixed-case names.
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader(name))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| TransportError::InvalidHeader(name))?;
            builder = builder.header(header_name, value);
        }

        let response = builder.body(request.body.clone()).send().await?;
        let status = response.status().as_u16();
        // An unreadable body is not a delivery failure.
        let body = response.text().await.unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
