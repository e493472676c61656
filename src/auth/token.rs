use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifetime of a session credential.
pub const CREDENTIAL_TTL_DAYS: i64 = 7;

const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user_id: i64,
    iat: i64,
    exp: i64,
}

/// The credential was malformed, forged, signed with another key, or expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCredential;

/// Signs and verifies session credentials (HS256 JWTs).
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::Config(format!(
                "signing secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the caller's clock in `verify`.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::days(CREDENTIAL_TTL_DAYS),
        })
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mints a credential for `user_id` valid from `now` until `now + ttl`.
    pub fn issue(&self, user_id: i64, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            user_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Returns the embedded user id if the signature checks out and `now` is
    /// strictly before the expiry.
    pub fn verify(&self, credential: &str, now: DateTime<Utc>) -> std::result::Result<i64, InvalidCredential> {
        let claims = match decode::<Claims>(credential, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::InvalidSignature => "tampered",
                    _ => "malformed",
                };
                tracing::debug!("Rejected credential ({reason}): {e}");
                return Err(InvalidCredential);
            }
        };

        if now.timestamp() >= claims.exp {
            tracing::debug!("Rejected credential (expired) for user {}", claims.user_id);
            return Err(InvalidCredential);
        }

        Ok(claims.user_id)
    }
}
