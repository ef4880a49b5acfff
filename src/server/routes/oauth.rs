use crate::db::{AccountCreate, AccountSettings};
use crate::error::{OauthError, SignpostError};
use crate::gateway::Surface;
use crate::oauth::GoogleOauthEndpoints;
use crate::server::guards::auth::UserIdentity;
use crate::server::router::AppState;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use chrono::Utc;
use oauth2::{AuthorizationCode, PkceCodeChallenge, PkceCodeVerifier, TokenResponse};
use serde_json::json;
use std::collections::HashMap;
use time::Duration;
use tracing::{error, info};

const CSRF_COOKIE: &str = "signpost_oauth_csrf_token";
const PKCE_COOKIE: &str = "signpost_oauth_pkce_verifier";
const USER_COOKIE: &str = "signpost_oauth_user";

/// GET /oauth/connect
///
/// Starts the Google OAuth2 PKCE flow and redirects the browser to the
/// consent screen. The initiating user id rides along in a private cookie so
/// the callback can bind the new credentials to the right owner.
pub async fn oauth_entry(
    State(state): State<AppState>,
    user: UserIdentity,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, SignpostError> {
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let (auth_url, csrf_token) =
        GoogleOauthEndpoints::build_authorize_url(&state.google_cfg, challenge)?;

    let jar = jar
        .add(build_cookie(
            CSRF_COOKIE,
            csrf_token.secret().to_string(),
            !state.insecure_cookie,
        ))
        .add(build_cookie(
            PKCE_COOKIE,
            verifier.secret().to_string(),
            !state.insecure_cookie,
        ))
        .add(build_cookie(USER_COOKIE, user.0, !state.insecure_cookie));

    info!("Dispatching Google OAuth redirect to: {}", auth_url);
    Ok((jar, Redirect::temporary(auth_url.as_ref())).into_response())
}

/// GET /oauth/callback
///
/// Google OAuth callback handler. Exchanges the code, requires a refresh
/// token (the sync engine is useless without one), discovers the Business
/// Profile account behind the grant and upserts the connected-account row.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    jar: PrivateCookieJar,
) -> impl IntoResponse {
    let code = params
        .get("code")
        .map(String::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let state_param = params
        .get("state")
        .map(String::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let (Some(code), Some(state_param)) = (code, state_param) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let (jar, session_data) = take_oauth_cookies(jar);
    let result = process_oauth_exchange(&state, &code, &state_param, session_data).await;

    match result {
        Ok(account_id) => {
            info!(account_id, "Google OAuth callback accepted");
            (
                jar,
                (
                    StatusCode::CREATED,
                    Json(json!({ "account_id": account_id })),
                ),
            )
                .into_response()
        }
        Err(err) => {
            error!("Google OAuth failure: {:?}", err);
            (jar, err.into_response()).into_response()
        }
    }
}

async fn process_oauth_exchange(
    state: &AppState,
    code: &str,
    state_param: &str,
    session_data: Option<OauthSession>,
) -> Result<i64, SignpostError> {
    let session = session_data.ok_or_else(|| OauthError::Flow {
        code: "OAUTH_SESSION_MISSING".to_string(),
        message: "Missing OAuth session cookies".to_string(),
        details: None,
    })?;

    if state_param != session.csrf_token {
        return Err(OauthError::Flow {
            code: "CSRF_MISMATCH".to_string(),
            message: "CSRF token mismatch".to_string(),
            details: None,
        }
        .into());
    }

    let token_response = GoogleOauthEndpoints::exchange_authorization_code(
        &state.google_cfg,
        AuthorizationCode::new(code.to_string()),
        PkceCodeVerifier::new(session.pkce_verifier),
        state.http.clone(),
    )
    .await
    .map_err(|e| OauthError::Flow {
        code: "TOKEN_EXCHANGE_FAILED".to_string(),
        message: format!("Token exchange failed: {e}"),
        details: None,
    })?;

    let refresh_token = token_response
        .refresh_token()
        .map(|t| t.secret().to_string())
        .unwrap_or_default();

    if refresh_token.trim().is_empty() {
        return Err(OauthError::Flow {
            code: "MISSING_REFRESH_TOKEN".to_string(),
            message: "Missing refresh_token (check access_type=offline)".to_string(),
            details: None,
        }
        .into());
    }

    let access_token = token_response.access_token().secret().to_string();
    let expires_at = token_response
        .expires_in()
        .map(|d| Utc::now() + chrono::Duration::seconds(d.as_secs() as i64));

    // The grant does not name the Business Profile account; ask the account
    // management surface which one this identity manages.
    let listing = state
        .gateway
        .get_json(Surface::V4, "accounts", &access_token)
        .await?;
    let (account_name, label) = first_account(&listing).ok_or_else(|| OauthError::Flow {
        code: "NO_BUSINESS_ACCOUNT".to_string(),
        message: "The connected Google identity manages no Business Profile account".to_string(),
        details: None,
    })?;

    let account_id = state
        .db
        .create_account(AccountCreate {
            user_id: session.user_id,
            label,
            google_account_name: account_name,
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            token_expires_at: expires_at,
            settings: AccountSettings::default(),
        })
        .await?;

    state.db.log_action(
        "account_connect",
        "success",
        json!({ "account_id": account_id }),
    );

    Ok(account_id)
}

fn first_account(listing: &serde_json::Value) -> Option<(String, String)> {
    let account = listing.get("accounts")?.as_array()?.first()?;
    let name = account.get("name")?.as_str()?.to_string();
    let label = account
        .get("accountName")
        .and_then(|v| v.as_str())
        .unwrap_or(name.as_str())
        .to_string();
    Some((name, label))
}

struct OauthSession {
    pkce_verifier: String,
    csrf_token: String,
    user_id: String,
}

fn take_oauth_cookies(jar: PrivateCookieJar) -> (PrivateCookieJar, Option<OauthSession>) {
    let csrf = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());
    let pkce = jar.get(PKCE_COOKIE).map(|c| c.value().to_string());
    let user = jar.get(USER_COOKIE).map(|c| c.value().to_string());

    let jar = jar
        .remove(Cookie::from(CSRF_COOKIE))
        .remove(Cookie::from(PKCE_COOKIE))
        .remove(Cookie::from(USER_COOKIE));

    match (pkce, csrf, user) {
        (Some(p), Some(c), Some(u)) => (
            jar,
            Some(OauthSession {
                pkce_verifier: p,
                csrf_token: c,
                user_id: u,
            }),
        ),
        _ => (jar, None),
    }
}

fn build_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::minutes(15))
        .build()
}
