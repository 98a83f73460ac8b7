//! Error taxonomy for the OpenID provider.
//!
//! Every failure surfaced by the provider core maps onto one [`ProviderError`]
//! variant, which in turn maps onto an HTTP status and an OAuth2 error code.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Invalid startup material. Fatal: the process refuses to start.
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Client authentication failed: {0}")]
    InvalidClient(String),
    #[error("Scope not allowed: {0}")]
    InvalidScope(String),
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),
    #[error("Unsupported response type: {0}")]
    UnsupportedResponseType(String),
    /// Bearer token missing, malformed, badly signed or expired.
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Upstream service error: {0}")]
    Upstream(String),
    #[error("Unimplemented: {0}")]
    Unimplemented(&'static str),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// OAuth2 error response body (RFC 6749 Section 5.2).
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ProviderError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProviderError::BadRequest(_)
            | ProviderError::InvalidScope(_)
            | ProviderError::InvalidGrant(_)
            | ProviderError::UnsupportedGrantType(_)
            | ProviderError::UnsupportedResponseType(_)
            | ProviderError::NotFound(_) => StatusCode::BAD_REQUEST,
            ProviderError::InvalidClient(_) | ProviderError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            ProviderError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProviderError::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ProviderError::Configuration(_)
            | ProviderError::Internal(_)
            | ProviderError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// OAuth2 `error` code for this failure.
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            ProviderError::BadRequest(_) => "invalid_request",
            ProviderError::InvalidClient(_) => "invalid_client",
            ProviderError::InvalidScope(_) => "invalid_scope",
            ProviderError::InvalidGrant(_) | ProviderError::NotFound(_) => "invalid_grant",
            ProviderError::UnsupportedGrantType(_) => "unsupported_grant_type",
            ProviderError::UnsupportedResponseType(_) => "unsupported_response_type",
            ProviderError::InvalidToken(_) => "invalid_token",
            ProviderError::Upstream(_) => "temporarily_unavailable",
            ProviderError::Unimplemented(_)
            | ProviderError::Configuration(_)
            | ProviderError::Internal(_)
            | ProviderError::Database(_) => "server_error",
        }
    }

    /// Server-side failures never leak their details to the client.
    pub fn public_description(&self) -> Option<String> {
        match self {
            ProviderError::Internal(_)
            | ProviderError::Database(_)
            | ProviderError::Configuration(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl IntoResponse for ProviderError {
    fn into_response(self) -> Response {
        match &self {
            ProviderError::Unimplemented(what) => {
                tracing::error!(operation = what, "Unimplemented protocol operation invoked");
            }
            ProviderError::Internal(_) | ProviderError::Database(_) => {
                tracing::error!(error = %self, "Request failed with server error");
            }
            ProviderError::Upstream(_) => {
                tracing::warn!(error = %self, "Upstream service failure");
            }
            _ => {
                tracing::debug!(error = %self, "Request rejected");
            }
        }

        let challenge = match &self {
            ProviderError::InvalidClient(_) => Some("Basic realm=\"sso\""),
            ProviderError::InvalidToken(_) => Some("Bearer error=\"invalid_token\""),
            _ => None,
        };

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.oauth_error_code().to_string(),
                error_description: self.public_description(),
            }),
        )
            .into_response();
        if let Some(challenge) = challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }
        response
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
