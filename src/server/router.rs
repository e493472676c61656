use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

use super::articles::article_router;
use super::auth::auth_router;
use crate::auth::TokenCodec;
use crate::oauth::IdentityProvider;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub codec: TokenCodec,
    pub provider: Arc<dyn IdentityProvider>,
    /// Frontend origin, without trailing slash. Allowed CORS origin and
    /// post-login redirect target.
    pub frontend_url: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        codec: TokenCodec,
        provider: Arc<dyn IdentityProvider>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            codec,
            provider,
            frontend_url: frontend_url.into(),
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request()),
        Err(e) => {
            tracing::warn!("Frontend URL is not a valid origin, CORS disabled: {e}");
            CorsLayer::new()
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.frontend_url);

    Router::new()
        .route("/health", get(health))
        .merge(auth_router())
        .merge(article_router())
        .layer(cors)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
