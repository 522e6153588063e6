use crate::protocol::{McpErrorCode, McpErrorResponse};

/// Failure talking to the QuickBuild REST API.
#[derive(Debug, thiserror::Error)]
pub enum QuickBuildError {
    #[error("Failed to authenticate with QuickBuild (HTTP {status})")]
    AuthenticationFailed { status: u16 },
    #[error("Resource not found: {endpoint}")]
    ResourceNotFound { endpoint: String },
    #[error("QuickBuild server error: {status}")]
    Server { status: u16 },
    #[error("Cannot connect to QuickBuild server: {0}")]
    Unavailable(String),
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },
    #[error("Max retries exceeded")]
    MaxRetriesExceeded,
    #[error("Unexpected QuickBuild response: {0}")]
    InvalidResponse(String),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl QuickBuildError {
    pub fn error_code(&self) -> McpErrorCode {
        match self {
            Self::AuthenticationFailed { .. } => McpErrorCode::AuthenticationFailed,
            Self::ResourceNotFound { .. } => McpErrorCode::ResourceNotFound,
            Self::Server { .. } => McpErrorCode::QuickbuildServerError,
            Self::Unavailable(_) => McpErrorCode::QuickbuildUnavailable,
            Self::Api { status, .. } => McpErrorCode::Http(*status),
            Self::MaxRetriesExceeded => McpErrorCode::MaxRetriesExceeded,
            Self::InvalidResponse(_) => McpErrorCode::InvalidResponse,
            Self::Client(_) => McpErrorCode::RequestError,
        }
    }
}

impl From<QuickBuildError> for McpErrorResponse {
    fn from(err: QuickBuildError) -> Self {
        McpErrorResponse::new(err.error_code(), err.to_string())
    }
}
