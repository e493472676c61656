use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use quillr::auth::TokenCodec;
use quillr::error::{Error, Result};
use quillr::oauth::IdentityProvider;
use quillr::server::{AppState, create_router};
use quillr::store::{SqliteStore, Store};
use quillr::types::ExternalIdentity;

pub const FRONTEND_URL: &str = "https://app.quillr.test";
pub const SECRET: &[u8] = b"integration-test-signing-secret";

/// Accepts codes of the form `<subject>:<email>`; the code `fail` simulates
/// an upstream outage.
pub struct FakeProvider;

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "https://idp.quillr.test/authorize?client_id=test-client&redirect_uri={}&scope={}&state={state}",
            urlencoding::encode("https://api.quillr.test/auth/google/callback"),
            urlencoding::encode("openid email profile"),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity> {
        if code == "fail" {
            return Err(Error::Upstream("Failed to exchange authorization code".to_string()));
        }

        let (subject, email) = code
            .split_once(':')
            .ok_or_else(|| Error::Upstream("bad code".to_string()))?;

        Ok(ExternalIdentity {
            external_id: subject.to_string(),
            email: email.to_string(),
            display_name: Some(format!("User {subject}")),
            avatar_url: Some(format!("https://img.quillr.test/{subject}.png")),
        })
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> &str {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .expect("location header")
    }

    /// Returns every Set-Cookie header rendered as a string.
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().expect("ascii cookie").to_string())
            .collect()
    }

    /// Value of the Set-Cookie header for `name`.
    pub fn cookie_value(&self, name: &str) -> Option<String> {
        self.set_cookies().into_iter().find_map(|c| {
            let pair = c.split(';').next()?.to_string();
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }
}

pub struct TestServer {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    router: Router,
}

impl TestServer {
    pub fn start() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store = Arc::new(SqliteStore::new(temp_dir.path().join("quillr.db")).expect("open db"));
        store.initialize().expect("initialize db");

        let state = Arc::new(AppState::new(
            store.clone(),
            TokenCodec::new(SECRET).expect("codec"),
            Arc::new(FakeProvider),
            FRONTEND_URL,
        ));

        Self {
            temp_dir,
            store,
            router: create_router(state),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible router");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Sends a request, optionally authenticated with a session cookie and a JSON body.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        json: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("quillr_token={token}"));
        }

        let request = match json {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        self.send(request).await
    }

    /// Runs the whole provider login flow and returns the session token.
    pub async fn login(&self, subject: &str, email: &str) -> String {
        let login = self.call(Method::GET, "/auth/google/login", None, None).await;
        assert_eq!(login.status, StatusCode::TEMPORARY_REDIRECT);
        let state = login
            .cookie_value("quillr_oauth_state")
            .expect("state cookie");

        let code = urlencoding::encode(&format!("{subject}:{email}")).into_owned();
        let request = Request::builder()
            .uri(format!("/auth/google/callback?code={code}&state={state}"))
            .header(header::COOKIE, format!("quillr_oauth_state={state}"))
            .body(Body::empty())
            .expect("build request");

        let callback = self.send(request).await;
        assert_eq!(callback.status, StatusCode::TEMPORARY_REDIRECT);
        callback.cookie_value("quillr_token").expect("session cookie")
    }

    pub fn user_count(&self) -> i64 {
        self.store
            .connection()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .expect("count users")
    }
}
