//! Outbound delivery channels.
//!
//! [`DeliveryTransport`] is the seam between the dispatcher and the network
//! so retry behaviour can be tested without HTTP.

use async_trait::async_trait;

pub mod webhook;

pub use webhook::TransportError;

/// One signed request ready to send.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Vec<(&'static str, String)>,
}

/// What the subscriber answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    /// Send the request. Any HTTP response, including non-2xx, is `Ok`;
    /// only transport failures (DNS, connect, timeout) are errors.
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError>;
}
