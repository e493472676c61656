mod helpers;
mod identity;
mod middleware;
mod token;

pub use helpers::{
    OAUTH_STATE_COOKIE, SESSION_COOKIE, authenticate, clear_oauth_state_cookie,
    clear_session_cookie, extract_credential, oauth_state_cookie, read_cookie, session_cookie,
};
pub use identity::resolve_identity;
pub use middleware::{AuthError, CurrentUser, RequireUser};
pub use token::{CREDENTIAL_TTL_DAYS, InvalidCredential, TokenCodec};
