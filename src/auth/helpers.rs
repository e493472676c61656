use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use chrono::{DateTime, Utc};
use cookie::time::Duration as CookieDuration;
use cookie::{Cookie, SameSite};

use super::TokenCodec;
use super::token::CREDENTIAL_TTL_DAYS;

/// Cookie carrying the session credential.
pub const SESSION_COOKIE: &str = "quillr_token";

/// Cookie carrying the CSRF state of an in-flight provider login.
pub const OAUTH_STATE_COOKIE: &str = "quillr_oauth_state";

const OAUTH_STATE_TTL_MINUTES: i64 = 10;

/// Returns the value of the first cookie named `name`, if any.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|cookie| cookie.ok())
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Extracts a credential from a Bearer authorization header.
/// The scheme is matched case-insensitively.
pub fn extract_bearer_token(header: &str) -> Option<String> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Finds the session credential on a request: the session cookie wins,
/// otherwise the Authorization header is consulted.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, SESSION_COOKIE).or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(extract_bearer_token)
    })
}

/// Resolves the authenticated user id for a request, or `None` for anonymous.
pub fn authenticate(codec: &TokenCodec, headers: &HeaderMap, now: DateTime<Utc>) -> Option<i64> {
    let credential = extract_credential(headers)?;
    codec.verify(&credential, now).ok()
}

/// The session cookie is always HttpOnly, Secure and SameSite=None so the
/// separately hosted frontend can send it cross-site.
pub fn session_cookie(credential: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, credential))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(CookieDuration::days(CREDENTIAL_TTL_DAYS))
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    let mut cookie = session_cookie(String::new());
    cookie.make_removal();
    cookie
}

pub fn oauth_state_cookie(state: String) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, state))
        .path("/auth")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::minutes(OAUTH_STATE_TTL_MINUTES))
        .build()
}

pub fn clear_oauth_state_cookie() -> Cookie<'static> {
    let mut cookie = oauth_state_cookie(String::new());
    cookie.make_removal();
    cookie
}
