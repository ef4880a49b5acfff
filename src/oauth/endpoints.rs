use crate::config::GoogleConfig;
use crate::error::{OauthError, SignpostError};
use crate::oauth::client::{OauthTokenResponse, StandardOauth2Client, build_oauth2_client};
use oauth2::{
    AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    Scope,
};
use tracing::info;

/// Stateless Google identity-provider endpoints built from resolved config.
///
/// The auth/token URLs come from [`GoogleConfig`] (overridable in tests with a
/// local mock server), so we build a fresh oauth2 client per call.
pub struct GoogleOauthEndpoints;

impl GoogleOauthEndpoints {
    fn build_client(cfg: &GoogleConfig) -> Result<StandardOauth2Client, SignpostError> {
        let redirect = RedirectUrl::new(cfg.redirect_url.to_string())?;
        build_oauth2_client(
            &cfg.client_id,
            Some(&cfg.client_secret),
            cfg.auth_url.as_str(),
            cfg.token_url.as_str(),
            redirect,
        )
    }

    /// Build an auth URL with configured scopes and PKCE challenge preset.
    /// `access_type=offline` + `prompt=consent` make Google return a refresh
    /// token on every consent, which the credential store depends on.
    pub(crate) fn build_authorize_url(
        cfg: &GoogleConfig,
        pkce_challenge: PkceCodeChallenge,
    ) -> Result<(url::Url, CsrfToken), SignpostError> {
        let client = Self::build_client(cfg)?;
        let mut req = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent");

        for scope in cfg.scopes.iter() {
            req = req.add_scope(Scope::new(scope.to_string()));
        }

        Ok(req.url())
    }

    /// Exchange an authorization code (PKCE) for tokens.
    pub(crate) async fn exchange_authorization_code(
        cfg: &GoogleConfig,
        code: AuthorizationCode,
        verifier: PkceCodeVerifier,
        http_client: reqwest::Client,
    ) -> Result<OauthTokenResponse, OauthError> {
        let client = Self::build_client(cfg).map_err(|e| OauthError::Other {
            message: format!("failed to build oauth2 client: {e}"),
        })?;

        let token_result: OauthTokenResponse = client
            .exchange_code(code)
            .set_pkce_verifier(verifier)
            .request_async(&http_client)
            .await?;

        info!("OAuth2 code exchange completed successfully");
        Ok(token_result)
    }

    /// Refresh an access token using a refresh token. Any non-2xx response is
    /// a hard failure for this attempt; retry policy lives with the caller.
    pub(crate) async fn refresh_access_token(
        cfg: &GoogleConfig,
        refresh_token: &str,
        http_client: reqwest::Client,
    ) -> Result<OauthTokenResponse, OauthError> {
        let client = Self::build_client(cfg).map_err(|e| OauthError::Other {
            message: format!("failed to build oauth2 client: {e}"),
        })?;

        let token_result: OauthTokenResponse = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&http_client)
            .await?;
        Ok(token_result)
    }

    /// Refresh an access token, returning a JSON value for testability.
    ///
    /// This avoids exposing crate-private oauth2 response types across the
    /// public API.
    pub async fn refresh_access_token_raw(
        cfg: &GoogleConfig,
        refresh_token: &str,
        http_client: reqwest::Client,
    ) -> Result<serde_json::Value, OauthError> {
        let token = Self::refresh_access_token(cfg, refresh_token, http_client).await?;
        serde_json::to_value(&token).map_err(|e| OauthError::Other {
            message: format!("failed to serialize oauth token response: {e}"),
        })
    }
}
