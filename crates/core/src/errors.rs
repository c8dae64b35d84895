use thiserror::Error;

use crate::rate_limit::RateLimited;
use crate::validation::ValidationError;

/// A Salesforce call that failed after the single re-authentication retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamError {
    pub status: Option<u16>,
    pub body: String,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "Salesforce request failed (HTTP {status}): {}", self.body),
            None => write!(f, "Salesforce request failed: {}", self.body),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl UpstreamError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self { status: Some(status), body: body.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self { status: None, body: message.into() }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum GatewayError {
    #[error("Salesforce authentication failed: {0}")]
    Authentication(String),
    #[error("{0}")]
    RecordNotFound(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    AccessDenied(String),
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl GatewayError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication_failure",
            Self::RecordNotFound(_) => "record_not_found",
            Self::Validation(error) => error.reason_code(),
            Self::AccessDenied(_) => "access_denied",
            Self::RateLimited(_) => "rate_limited",
            Self::Upstream(_) => "upstream_error",
        }
    }

    /// Whether the failure was decided locally, before any write reached Salesforce.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::RecordNotFound(_)
                | Self::Validation(_)
                | Self::AccessDenied(_)
                | Self::RateLimited(_)
        )
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
