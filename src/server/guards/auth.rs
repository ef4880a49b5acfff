use crate::server::router::AppState;
use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderName, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use serde_json::json;
use subtle::ConstantTimeEq;

/// Header carrying the authenticated end-user id, set by the fronting auth
/// proxy. Session handling itself is the auth provider's job; signpost only
/// trusts this header from its own ingress.
const X_AUTH_USER: HeaderName = HeaderName::from_static("x-auth-user");

/// Guard for the external scheduler trigger: a shared-secret bearer
/// credential compared in constant time. Unauthorized requests are rejected
/// before any account row is touched.
#[derive(Debug, Clone, Copy)]
pub struct RequireCronAuth;

impl FromRequestParts<AppState> for RequireCronAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .map(|auth| auth.token().to_string());

        match token {
            Some(key) => {
                let expected = state.cron_secret.as_ref();
                if key.as_bytes().ct_eq(expected.as_bytes()).into() {
                    Ok(RequireCronAuth)
                } else {
                    Err(AuthError::InvalidKey)
                }
            }
            None => Err(AuthError::MissingKey),
        }
    }
}

/// The authenticated dashboard user. All user-facing routes operate only on
/// accounts owned by this id; the ownership check happens before any token
/// resolution.
#[derive(Debug, Clone)]
pub struct UserIdentity(pub String);

impl FromRequestParts<AppState> for UserIdentity {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(&X_AUTH_USER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserIdentity(v.to_string()))
            .ok_or(AuthError::MissingUser)
    }
}

pub enum AuthError {
    MissingKey,
    InvalidKey,
    MissingUser,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, reason) = match self {
            AuthError::MissingKey => (StatusCode::UNAUTHORIZED, "Missing bearer credential"),
            AuthError::InvalidKey => (StatusCode::UNAUTHORIZED, "Invalid bearer credential"),
            AuthError::MissingUser => (StatusCode::UNAUTHORIZED, "Missing user identity"),
        };
        (
            status,
            Json(json!({ "error": "unauthorized", "reason": reason })),
        )
            .into_response()
    }
}
