//! Third-party login. The provider builds the authorization redirect and
//! turns the authorization code from the callback into a verified identity.

mod google;

pub use google::{GoogleConfig, GoogleProvider};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ExternalIdentity;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the user agent is redirected to in order to start a login.
    fn authorization_url(&self, state: &str) -> String;

    /// Completes the code exchange and returns the asserted identity.
    /// Failures surface as `Error::Upstream`.
    async fn exchange_code(&self, code: &str) -> Result<ExternalIdentity>;
}
