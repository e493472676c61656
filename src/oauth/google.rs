use async_trait::async_trait;
use serde::Deserialize;

use super::IdentityProvider;
use crate::error::{Error, Result};
use crate::types::ExternalIdentity;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const SCOPES: &str = "openid email profile";

pub const CALLBACK_PATH: &str = "/auth/google/callback";

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Externally reachable base URL of this server, without trailing slash.
    pub base_url: String,
}

impl GoogleConfig {
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}{CALLBACK_PATH}", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Google userinfo (OpenID Connect claims).
#[derive(Debug, Deserialize)]
struct GoogleUser {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

pub struct GoogleProvider {
    config: GoogleConfig,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }
}

fn upstream(context: &str) -> impl Fn(reqwest::Error) -> Error + '_ {
    move |e| {
        tracing::warn!("{context}: {e}");
        Error::Upstream(context.to_string())
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorization_url(&self, state: &str) -> String {
        let redirect_uri = self.config.redirect_uri();
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", SCOPES),
            ("state", state),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{AUTH_URL}?{query}")
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity> {
        let redirect_uri = self.config.redirect_uri();
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ];

        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&form)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(upstream("Failed to exchange authorization code"))?
            .json()
            .await
            .map_err(upstream("Malformed token response"))?;

        let access_token = token
            .access_token
            .ok_or_else(|| Error::Upstream("Missing access token".to_string()))?;

        let profile: GoogleUser = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(upstream("Failed to fetch user profile"))?
            .json()
            .await
            .map_err(upstream("Malformed user profile"))?;

        let email = profile
            .email
            .ok_or_else(|| Error::Upstream("Profile has no email".to_string()))?;

        Ok(ExternalIdentity {
            external_id: profile.sub,
            email,
            display_name: profile.name,
            avatar_url: profile.picture,
        })
    }
}
