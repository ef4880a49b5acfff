use serde::{Deserialize, Serialize};
use url::Url;

/// Google OAuth client and Business Profile API surface configuration.
///
/// The three API base URLs exist so tests can point the gateway at local mock
/// servers; production deployments keep the defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GoogleConfig {
    /// OAuth client id issued in the Google Cloud console.
    /// TOML: `google.client_id`. Required.
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret. TOML: `google.client_secret`. Required.
    #[serde(default)]
    pub client_secret: String,

    /// OAuth authorization endpoint.
    #[serde(default = "default_auth_url")]
    pub auth_url: Url,

    /// OAuth token endpoint (refresh + code exchange).
    #[serde(default = "default_token_url")]
    pub token_url: Url,

    /// Redirect URL registered for the OAuth client.
    #[serde(default = "default_redirect_url")]
    pub redirect_url: Url,

    /// Requested OAuth scopes.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Business Information API base (locations and attributes).
    #[serde(default = "default_business_information_url")]
    pub business_information_url: Url,

    /// Q&A API base (questions and answers).
    #[serde(default = "default_qna_url")]
    pub qna_url: Url,

    /// Legacy v4 API base (reviews, local posts, media, report insights).
    #[serde(default = "default_v4_url")]
    pub v4_url: Url,

    /// Optional upstream HTTP proxy for reqwest clients.
    /// TOML: `google.proxy`. Example: `http://127.0.0.1:1080`.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Max retry attempts for transient upstream failures.
    /// TOML: `google.retry_max_times`. Default: `3`.
    #[serde(default = "default_retry_max_times")]
    pub retry_max_times: usize,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            redirect_url: default_redirect_url(),
            scopes: default_scopes(),
            business_information_url: default_business_information_url(),
            qna_url: default_qna_url(),
            v4_url: default_v4_url(),
            proxy: None,
            retry_max_times: default_retry_max_times(),
        }
    }
}

fn default_auth_url() -> Url {
    Url::parse("https://accounts.google.com/o/oauth2/v2/auth").expect("static url")
}

fn default_token_url() -> Url {
    Url::parse("https://oauth2.googleapis.com/token").expect("static url")
}

fn default_redirect_url() -> Url {
    Url::parse("http://localhost:8476/oauth/callback").expect("static url")
}

fn default_scopes() -> Vec<String> {
    vec![
        "https://www.googleapis.com/auth/business.manage".to_string(),
        "https://www.googleapis.com/auth/userinfo.email".to_string(),
    ]
}

fn default_business_information_url() -> Url {
    Url::parse("https://mybusinessbusinessinformation.googleapis.com/v1").expect("static url")
}

fn default_qna_url() -> Url {
    Url::parse("https://mybusinessqanda.googleapis.com/v1").expect("static url")
}

fn default_v4_url() -> Url {
    Url::parse("https://mybusiness.googleapis.com/v4").expect("static url")
}

fn default_retry_max_times() -> usize {
    3
}
