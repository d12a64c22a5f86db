use std::time::Duration;

use thiserror::Error;

/// Failure reported by a chat platform gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("rate limited, retry after {}ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },
    #[error("missing permission: {0}")]
    MissingPermission(String),
    #[error("message not found")]
    MessageNotFound,
    #[error("transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
