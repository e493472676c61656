use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{ExternalIdentity, User};

/// Finds or creates the local user for a verified external identity.
///
/// Lookup goes by provider subject id first and falls back to email, so a
/// provider that rotates subject ids keeps mapping to the same account. The
/// store guarantees a single row per subject id under concurrent callbacks.
/// Returning users get their email refreshed, and their display name and
/// avatar refreshed when the provider supplies them.
pub fn resolve_identity(
    store: &dyn Store,
    identity: &ExternalIdentity,
    now: DateTime<Utc>,
) -> Result<User> {
    let identity = normalize(identity)?;

    let (user, created) = store.resolve_user(&identity, now)?;

    if created {
        tracing::info!("Created user {} for new external identity", user.id);
    } else {
        tracing::debug!("Resolved existing user {}", user.id);
    }

    Ok(user)
}

fn normalize(identity: &ExternalIdentity) -> Result<ExternalIdentity> {
    let external_id = identity.external_id.trim();
    let email = identity.email.trim().to_lowercase();

    if external_id.is_empty() || email.is_empty() {
        return Err(Error::Upstream(
            "identity provider returned an incomplete profile".to_string(),
        ));
    }

    Ok(ExternalIdentity {
        external_id: external_id.to_string(),
        email,
        display_name: non_blank(identity.display_name.as_deref()),
        avatar_url: non_blank(identity.avatar_url.as_deref()),
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::SqliteStore;

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        store
    }

    fn identity(external_id: &str, email: &str) -> ExternalIdentity {
        ExternalIdentity {
            external_id: external_id.to_string(),
            email: email.to_string(),
            display_name: Some("  ".to_string()),
            avatar_url: Some("https://img/a.png".to_string()),
        }
    }

    #[test]
    fn test_resolve_creates_then_reuses() {
        let store = store();

        let first = resolve_identity(&store, &identity("abc", "a@x.com"), Utc::now()).unwrap();
        let second = resolve_identity(&store, &identity("abc", "a@x.com"), Utc::now()).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.display_name, None);
        assert_eq!(first.avatar_url.as_deref(), Some("https://img/a.png"));
    }

    #[test]
    fn test_email_fallback_ignores_case() {
        let store = store();

        let first = resolve_identity(&store, &identity("abc", "Ada@X.com"), Utc::now()).unwrap();
        assert_eq!(first.email, "ada@x.com");

        let second =
            resolve_identity(&store, &identity("rotated", " ADA@x.COM "), Utc::now()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.external_id, "rotated");
        assert!(store.get_user(first.id + 1).unwrap().is_none());
    }

    #[test]
    fn test_resolve_rejects_incomplete_identity() {
        let store = store();

        let result = resolve_identity(&store, &identity("", "a@x.com"), Utc::now());
        assert!(matches!(result, Err(Error::Upstream(_))));

        let result = resolve_identity(&store, &identity("abc", "   "), Utc::now());
        assert!(matches!(result, Err(Error::Upstream(_))));

        assert!(store.get_user(1).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_callbacks_resolve_to_one_user() {
        let store = Arc::new(store());

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    resolve_identity(store.as_ref(), &identity("abc", "a@x.com"), Utc::now())
                        .unwrap()
                        .id
                })
            })
            .collect();

        let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids[0], ids[1]);

        let count: i64 = store
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM users WHERE external_id = 'abc'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
