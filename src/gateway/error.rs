//! Gateway error types

use std::fmt;
use thiserror::Error;

/// Gateway error with classification
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    /// HTTP status when the service answered at all
    pub status: Option<u16>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Timeout, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::ServerError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::InvalidRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::NotFound, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Rejected, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Unknown, message)
    }
}

/// Error classification. Every kind may be resubmitted by the user; only
/// transient kinds are likely to succeed unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Connection refused, reset, DNS - transient
    Network,
    /// Caller-side timeout elapsed - transient
    Timeout,
    /// 5xx - transient
    ServerError,
    /// 400 / 422 - needs different input to succeed
    InvalidRequest,
    /// 404 - wrong base address or endpoint
    NotFound,
    /// 2xx with `success: false`, e.g. the AI backend is not configured
    Rejected,
    Unknown,
}

impl GatewayErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::ServerError)
    }
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::ServerError => "server_error",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::Rejected => "rejected",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
