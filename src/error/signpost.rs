use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error as ThisError;

use super::IsRetryable;
use super::oauth::OauthError;

/// Top-level error taxonomy. The split between reconnect-required, scope,
/// transient, and validation failures drives both retry eligibility and the
/// message shown to account owners.
#[derive(Debug, ThisError)]
pub enum SignpostError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("account {0} has no refresh token; reconnect required")]
    NoRefreshToken(i64),

    #[error("authorization grant expired or revoked: {0}")]
    AuthExpired(String),

    #[error("insufficient OAuth scopes: {0}")]
    InsufficientScopes(String),

    #[error("transient upstream failure: {detail}")]
    Transient {
        status: Option<StatusCode>,
        detail: String,
    },

    #[error("provider rejected request ({status}): {detail}")]
    Validation { status: StatusCode, detail: String },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Oauth(#[from] OauthError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("actor error: {0}")]
    Ractor(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl SignpostError {
    /// True for failures whose only remedy is the owner re-running the OAuth
    /// consent flow. Callers use this to flag the account instead of retrying.
    pub fn needs_reconnect(&self) -> bool {
        match self {
            SignpostError::NoRefreshToken(_) | SignpostError::AuthExpired(_) => true,
            SignpostError::Oauth(e) => e.is_invalid_grant(),
            _ => false,
        }
    }
}

impl IsRetryable for SignpostError {
    fn is_retryable(&self) -> bool {
        match self {
            SignpostError::Transient { .. } | SignpostError::Reqwest(_) => true,
            SignpostError::Oauth(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl IntoResponse for SignpostError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            SignpostError::Configuration(_)
            | SignpostError::Database(_)
            | SignpostError::Ractor(_)
            | SignpostError::Json(_)
            | SignpostError::Url(_)
            | SignpostError::Unexpected(_)
            | SignpostError::Oauth(OauthError::Other { .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                    details: None,
                },
            ),

            SignpostError::NoRefreshToken(account_id) => (
                StatusCode::CONFLICT,
                ApiErrorObject {
                    code: "RECONNECT_REQUIRED".to_string(),
                    message: "Reconnect your Google account to continue.".to_string(),
                    details: Some(Value::from(format!(
                        "account {account_id} has no refresh token"
                    ))),
                },
            ),

            SignpostError::AuthExpired(detail) => (
                StatusCode::CONFLICT,
                ApiErrorObject {
                    code: "RECONNECT_REQUIRED".to_string(),
                    message: "Reconnect your Google account to continue.".to_string(),
                    details: Some(Value::from(detail)),
                },
            ),

            SignpostError::InsufficientScopes(detail) => (
                StatusCode::FORBIDDEN,
                ApiErrorObject {
                    code: "INSUFFICIENT_SCOPES".to_string(),
                    message: "Reconnect and grant the requested permissions.".to_string(),
                    details: Some(Value::from(detail)),
                },
            ),

            SignpostError::Forbidden(detail) => (
                StatusCode::FORBIDDEN,
                ApiErrorObject {
                    code: "FORBIDDEN".to_string(),
                    message: detail,
                    details: None,
                },
            ),

            SignpostError::Conflict(detail) => (
                StatusCode::CONFLICT,
                ApiErrorObject {
                    code: "CONFLICT".to_string(),
                    message: detail,
                    details: None,
                },
            ),

            SignpostError::NotFound(detail) => (
                StatusCode::NOT_FOUND,
                ApiErrorObject {
                    code: "NOT_FOUND".to_string(),
                    message: detail,
                    details: None,
                },
            ),

            SignpostError::Validation { status, detail } => (
                StatusCode::BAD_REQUEST,
                ApiErrorObject {
                    code: "VALIDATION_FAILED".to_string(),
                    message: "The provider rejected the request payload.".to_string(),
                    details: Some(Value::from(format!("{status}: {detail}"))),
                },
            ),

            SignpostError::Oauth(OauthError::Flow {
                code,
                message,
                details,
            }) => (
                StatusCode::FORBIDDEN,
                ApiErrorObject {
                    code,
                    message,
                    details,
                },
            ),

            SignpostError::Transient { status, detail } => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject {
                    code: "UPSTREAM_ERROR".to_string(),
                    message: "Upstream service error.".to_string(),
                    details: Some(Value::from(format!(
                        "{}: {detail}",
                        status.map_or_else(|| "network".to_string(), |s| s.to_string())
                    ))),
                },
            ),

            SignpostError::Reqwest(_) | SignpostError::Oauth(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject {
                    code: "UPSTREAM_ERROR".to_string(),
                    message: "Upstream service error.".to_string(),
                    details: None,
                },
            ),
        };
        (status, Json(ApiErrorBody { inner: error_body })).into_response()
    }
}

/// Standardized API error response payload.
#[derive(Serialize)]
pub struct ApiErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    #[serde(rename = "error")]
    pub inner: ApiErrorObject,
}
