// transport.rs - the single request/response seam to the remote service

use crate::api::ApiResponse;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The service could not be reached at all (offline, DNS, timeout).
    #[error("service unreachable: {0}")]
    Unreachable(String),
    /// The service answered with a failure.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// The injected transport. Implementations own connection handling, retries
/// below this layer, and timeout policy; this crate never imposes its own.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one `{ "action": ..., ... }` body and return the raw response.
    async fn call(&self, body: &Value) -> Result<ApiResponse, TransportError>;
}
