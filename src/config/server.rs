use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::oauth::GoogleConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Externally reachable base URL of this server (e.g. "https://api.quillr.app").
    /// Used to build the identity provider callback URL.
    pub base_url: String,
    /// Origin of the frontend. The only allowed CORS origin and the target of
    /// the post-login redirect.
    pub frontend_url: String,
    pub secret_key: String,
    pub google_client_id: String,
    pub google_client_secret: String,
}

/// Trims whitespace and trailing slashes so paths can be appended directly.
#[must_use]
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn require(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{name} must be set")));
    }
    Ok(())
}

fn require_http_url(value: &str, name: &str) -> Result<()> {
    require(value, name)?;
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(Error::Config(format!(
            "{name} must be an absolute http(s) URL, got '{value}'"
        )));
    }
    Ok(())
}

/// Browsers send `Origin` as scheme and host only, so anything after the
/// authority would never match.
fn require_origin(value: &str, name: &str) -> Result<()> {
    require_http_url(value, name)?;
    let authority = value.split_once("://").map_or("", |(_, rest)| rest);
    if authority.is_empty() || authority.contains(['/', '?', '#']) {
        return Err(Error::Config(format!(
            "{name} must be an origin without path, query or fragment, got '{value}'"
        )));
    }
    Ok(())
}

impl ServerConfig {
    /// Checks that every required option is present and normalizes URLs.
    /// Serving must not start when this fails.
    pub fn validate(mut self) -> Result<Self> {
        require(&self.secret_key, "SECRET_KEY")?;
        require(&self.google_client_id, "GOOGLE_CLIENT_ID")?;
        require(&self.google_client_secret, "GOOGLE_CLIENT_SECRET")?;

        self.base_url = normalize_base_url(&self.base_url);
        self.frontend_url = normalize_base_url(&self.frontend_url);
        require_http_url(&self.base_url, "BASE_URL")?;
        require_origin(&self.frontend_url, "FRONTEND_URL")?;

        Ok(self)
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("quillr.db")
    }

    #[must_use]
    pub fn google(&self) -> GoogleConfig {
        GoogleConfig {
            client_id: self.google_client_id.clone(),
            client_secret: self.google_client_secret.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            data_dir: PathBuf::from("./data"),
            base_url: String::new(),
            frontend_url: String::new(),
            secret_key: String::new(),
            google_client_id: String::new(),
            google_client_secret: String::new(),
        }
    }
}
