use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Redirect},
    routing::{get, post},
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{
    CurrentUser, OAUTH_STATE_COOKIE, clear_oauth_state_cookie, clear_session_cookie,
    oauth_state_cookie, read_cookie, resolve_identity, session_cookie,
};
use crate::server::AppState;
use crate::server::dto::{CallbackParams, LogoutResponse, MeResponse, UserProfile};
use crate::server::response::{ApiError, StoreResultExt};

pub fn auth_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/google/login", get(google_login))
        .route("/auth/google/callback", get(google_callback))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
}

async fn google_login(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let csrf_state = Uuid::new_v4().simple().to_string();
    let url = state.provider.authorization_url(&csrf_state);

    (
        AppendHeaders([(SET_COOKIE, oauth_state_cookie(csrf_state).to_string())]),
        Redirect::temporary(&url),
    )
}

async fn google_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    if let Some(error) = params.error {
        tracing::warn!("Identity provider returned error: {error}");
        return Err(ApiError::bad_request("Login was cancelled or denied"));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Authorization code missing"))?;

    let expected_state = read_cookie(&headers, OAUTH_STATE_COOKIE);
    if expected_state.is_none() || expected_state != params.state {
        tracing::warn!("OAuth state mismatch on callback");
        return Err(ApiError::bad_request("Invalid OAuth state"));
    }

    let identity = state.provider.exchange_code(&code).await?;
    let now = Utc::now();
    let user = resolve_identity(state.store.as_ref(), &identity, now)?;
    let credential = state.codec.issue(user.id, now)?;

    tracing::info!("User {} signed in", user.id);

    Ok::<_, ApiError>((
        AppendHeaders([
            (SET_COOKIE, session_cookie(credential).to_string()),
            (SET_COOKIE, clear_oauth_state_cookie().to_string()),
        ]),
        Redirect::temporary(&format!("{}/dashboard", state.frontend_url)),
    ))
}

async fn me(CurrentUser(user_id): CurrentUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let user = match user_id {
        Some(id) => state.store.get_user(id).api_err("Failed to load user")?,
        None => None,
    };

    Ok::<_, ApiError>(Json(MeResponse {
        user: user.map(UserProfile::from),
    }))
}

async fn logout() -> impl IntoResponse {
    (
        AppendHeaders([(SET_COOKIE, clear_session_cookie().to_string())]),
        Json(LogoutResponse { ok: true }),
    )
}
