use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const USER_COLUMNS: &str = "id, external_id, email, display_name, avatar_url, created_at";

const ARTICLE_COLUMNS: &str = "id, title, content, cover_image, views, likes, last_viewed_at, \
                               created_at, updated_at, author_id";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        avatar_url: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        cover_image: row.get(3)?,
        views: row.get(4)?,
        likes: row.get(5)?,
        last_viewed_at: row
            .get::<_, Option<String>>(6)?
            .as_deref()
            .map(parse_datetime),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
        author_id: row.get(9)?,
    })
}

fn query_articles(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Article>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_article)?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn resolve_user(&self, identity: &ExternalIdentity, now: DateTime<Utc>) -> Result<(User, bool)> {
        let mut conn = self.conn();
        // IMMEDIATE takes the write lock up front, so concurrent resolvers on
        // other connections queue behind the busy timeout instead of racing.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let by_external_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM users WHERE external_id = ?1",
                params![identity.external_id],
                |row| row.get(0),
            )
            .optional()?;

        let existing = match by_external_id {
            Some(id) => Some(id),
            None => tx
                .query_row(
                    "SELECT id FROM users WHERE email = ?1 ORDER BY id LIMIT 1",
                    params![identity.email],
                    |row| row.get(0),
                )
                .optional()?,
        };

        let (id, created) = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE users
                     SET external_id = ?2,
                         email = ?3,
                         display_name = COALESCE(?4, display_name),
                         avatar_url = COALESCE(?5, avatar_url)
                     WHERE id = ?1",
                    params![
                        id,
                        identity.external_id,
                        identity.email,
                        identity.display_name,
                        identity.avatar_url,
                    ],
                )?;
                (id, false)
            }
            None => {
                let id: i64 = tx.query_row(
                    "INSERT INTO users (external_id, email, display_name, avatar_url, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(external_id) DO UPDATE SET
                         email = excluded.email,
                         display_name = COALESCE(excluded.display_name, users.display_name),
                         avatar_url = COALESCE(excluded.avatar_url, users.avatar_url)
                     RETURNING id",
                    params![
                        identity.external_id,
                        identity.email,
                        identity.display_name,
                        identity.avatar_url,
                        format_datetime(&now),
                    ],
                    |row| row.get(0),
                )?;
                (id, true)
            }
        };

        let user = tx.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )?;

        tx.commit()?;
        Ok((user, created))
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    // Article operations

    fn create_article(&self, article: &NewArticle) -> Result<Article> {
        let conn = self.conn();
        let created_at = format_datetime(&article.created_at);

        conn.query_row(
            &format!(
                "INSERT INTO articles (title, content, cover_image, created_at, updated_at, author_id)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5)
                 RETURNING {ARTICLE_COLUMNS}"
            ),
            params![
                article.title,
                article.content,
                article.cover_image,
                created_at,
                article.author_id,
            ],
            row_to_article,
        )
        .map_err(Error::from)
    }

    fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"),
            params![id],
            row_to_article,
        )
        .optional()
        .map_err(Error::from)
    }

    fn record_article_view(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Article>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "UPDATE articles SET views = views + 1, last_viewed_at = ?2
                 WHERE id = ?1
                 RETURNING {ARTICLE_COLUMNS}"
            ),
            params![id, format_datetime(&now)],
            row_to_article,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_author_articles(&self, author_id: i64) -> Result<Vec<Article>> {
        let conn = self.conn();
        query_articles(
            &conn,
            &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE author_id = ?1 ORDER BY id"),
            params![author_id],
        )
    }

    fn update_article_content(
        &self,
        id: i64,
        author_id: i64,
        title: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Article>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "UPDATE articles SET title = ?3, content = ?4, updated_at = ?5
                 WHERE id = ?1 AND author_id = ?2
                 RETURNING {ARTICLE_COLUMNS}"
            ),
            params![id, author_id, title, content, format_datetime(&now)],
            row_to_article,
        )
        .optional()
        .map_err(Error::from)
    }

    fn increment_article_likes(&self, id: i64) -> Result<Option<i64>> {
        let conn = self.conn();
        conn.query_row(
            "UPDATE articles SET likes = likes + 1 WHERE id = ?1 RETURNING likes",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_trending_articles(&self, limit: u32) -> Result<Vec<Article>> {
        let conn = self.conn();
        query_articles(
            &conn,
            &format!(
                "SELECT {ARTICLE_COLUMNS} FROM articles
                 ORDER BY views DESC, likes DESC, created_at DESC, id DESC
                 LIMIT ?1"
            ),
            params![limit],
        )
    }

    fn list_latest_articles(&self, limit: u32) -> Result<Vec<Article>> {
        let conn = self.conn();
        query_articles(
            &conn,
            &format!(
                "SELECT {ARTICLE_COLUMNS} FROM articles
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1"
            ),
            params![limit],
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    use super::*;

    fn identity(external_id: &str, email: &str) -> ExternalIdentity {
        ExternalIdentity {
            external_id: external_id.to_string(),
            email: email.to_string(),
            display_name: Some("Ada".to_string()),
            avatar_url: None,
        }
    }

    fn new_article(author_id: i64, title: &str, created_at: DateTime<Utc>) -> NewArticle {
        NewArticle {
            author_id,
            title: title.to_string(),
            content: "body".to_string(),
            cover_image: None,
            created_at,
        }
    }

    fn count_users(store: &SqliteStore, external_id: &str) -> i64 {
        store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM users WHERE external_id = ?1",
                params![external_id],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn setup() -> (SqliteStore, User) {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        let (user, _) = store
            .resolve_user(&identity("author", "author@example.com"), Utc::now())
            .unwrap();
        (store, user)
    }

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        store.initialize().unwrap();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"articles".to_string()));
    }

    #[test]
    fn test_resolve_user_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();

        let (first, created) = store
            .resolve_user(&identity("abc", "a@x.com"), Utc::now())
            .unwrap();
        assert!(created);

        let (second, created) = store
            .resolve_user(&identity("abc", "a@x.com"), Utc::now())
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(count_users(&store, "abc"), 1);
    }

    #[test]
    fn test_resolve_user_refreshes_profile_but_keeps_missing_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();

        let mut id = identity("abc", "a@x.com");
        id.avatar_url = Some("https://img/1.png".to_string());
        store.resolve_user(&id, Utc::now()).unwrap();

        id.display_name = Some("Ada L.".to_string());
        id.avatar_url = None;
        id.email = "ada@x.com".to_string();
        let (user, _) = store.resolve_user(&id, Utc::now()).unwrap();

        assert_eq!(user.display_name.as_deref(), Some("Ada L."));
        assert_eq!(user.avatar_url.as_deref(), Some("https://img/1.png"));
        assert_eq!(user.email, "ada@x.com");
    }

    #[test]
    fn test_resolve_user_falls_back_to_email() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();

        let (original, _) = store
            .resolve_user(&identity("old-subject", "a@x.com"), Utc::now())
            .unwrap();
        let (rebound, created) = store
            .resolve_user(&identity("new-subject", "a@x.com"), Utc::now())
            .unwrap();

        assert!(!created);
        assert_eq!(original.id, rebound.id);
        assert_eq!(rebound.external_id, "new-subject");
        assert_eq!(count_users(&store, "old-subject"), 0);
    }

    #[test]
    fn test_resolve_user_email_fallback_is_case_insensitive() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();

        let (original, _) = store
            .resolve_user(&identity("old-subject", "a@x.com"), Utc::now())
            .unwrap();
        let (rebound, created) = store
            .resolve_user(&identity("new-subject", "A@X.com"), Utc::now())
            .unwrap();

        assert!(!created);
        assert_eq!(original.id, rebound.id);
    }

    #[test]
    fn test_concurrent_resolve_across_connections_creates_one_user() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("test.db");
        SqliteStore::new(&db_path).unwrap().initialize().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db_path = db_path.clone();
                thread::spawn(move || {
                    let store = SqliteStore::new(&db_path).unwrap();
                    store
                        .resolve_user(&identity("abc", "a@x.com"), Utc::now())
                        .unwrap()
                        .0
                        .id
                })
            })
            .collect();

        let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));

        let store = SqliteStore::new(&db_path).unwrap();
        assert_eq!(count_users(&store, "abc"), 1);
    }

    #[test]
    fn test_record_article_view_increments_and_stamps() {
        let (store, user) = setup();
        let article = store
            .create_article(&new_article(user.id, "Hi", Utc::now()))
            .unwrap();
        assert_eq!(article.views, 0);
        assert!(article.last_viewed_at.is_none());

        let now = Utc::now();
        let viewed = store.record_article_view(article.id, now).unwrap().unwrap();
        assert_eq!(viewed.views, 1);
        assert!(viewed.last_viewed_at.is_some());

        let viewed = store.record_article_view(article.id, now).unwrap().unwrap();
        assert_eq!(viewed.views, 2);
        assert_eq!(viewed.updated_at, article.updated_at);

        assert!(store.record_article_view(9999, now).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_likes_are_not_lost() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("test.db");
        let store = SqliteStore::new(&db_path).unwrap();
        store.initialize().unwrap();
        let (user, _) = store
            .resolve_user(&identity("author", "author@example.com"), Utc::now())
            .unwrap();
        let article = store
            .create_article(&new_article(user.id, "Hi", Utc::now()))
            .unwrap();

        let article_id = article.id;
        let shared = Arc::new(store);
        let mut handles = Vec::new();
        for worker in 0..4 {
            let shared = Arc::clone(&shared);
            let db_path = db_path.clone();
            handles.push(thread::spawn(move || {
                // Half the workers share one connection, half open their own.
                let own = SqliteStore::new(&db_path).unwrap();
                for _ in 0..25 {
                    if worker % 2 == 0 {
                        shared.increment_article_likes(article_id).unwrap();
                    } else {
                        own.increment_article_likes(article_id).unwrap();
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let article = shared.get_article(article_id).unwrap().unwrap();
        assert_eq!(article.likes, 100);
    }

    #[test]
    fn test_update_article_content_requires_owner() {
        let (store, user) = setup();
        let article = store
            .create_article(&new_article(user.id, "Hi", Utc::now()))
            .unwrap();

        let denied = store
            .update_article_content(article.id, user.id + 1, "x", "y", Utc::now())
            .unwrap();
        assert!(denied.is_none());

        let later = Utc::now() + ChronoDuration::seconds(5);
        let updated = store
            .update_article_content(article.id, user.id, "Hi2", "World2", later)
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Hi2");
        assert_eq!(updated.content, "World2");
        assert!(updated.updated_at > article.updated_at);
        assert_eq!(updated.created_at, article.created_at);
    }

    #[test]
    fn test_trending_order_and_limit() {
        let (store, user) = setup();
        let base = Utc::now();

        let a = store.create_article(&new_article(user.id, "a", base)).unwrap();
        let b = store
            .create_article(&new_article(user.id, "b", base + ChronoDuration::seconds(1)))
            .unwrap();
        let c = store
            .create_article(&new_article(user.id, "c", base + ChronoDuration::seconds(2)))
            .unwrap();
        let d = store
            .create_article(&new_article(user.id, "d", base + ChronoDuration::seconds(3)))
            .unwrap();

        // a: 2 views 0 likes, b: 1 view 5 likes, c: 1 view 5 likes (newer), d: 0
        store.record_article_view(a.id, base).unwrap();
        store.record_article_view(a.id, base).unwrap();
        store.record_article_view(b.id, base).unwrap();
        store.record_article_view(c.id, base).unwrap();
        for _ in 0..5 {
            store.increment_article_likes(b.id).unwrap();
            store.increment_article_likes(c.id).unwrap();
        }

        let ids: Vec<i64> = store
            .list_trending_articles(10)
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![a.id, c.id, b.id, d.id]);

        assert_eq!(store.list_trending_articles(2).unwrap().len(), 2);
    }

    #[test]
    fn test_list_author_articles_in_insertion_order() {
        let (store, user) = setup();
        let (other, _) = store
            .resolve_user(&identity("other", "other@example.com"), Utc::now())
            .unwrap();
        let now = Utc::now();

        let first = store.create_article(&new_article(user.id, "1", now)).unwrap();
        store.create_article(&new_article(other.id, "x", now)).unwrap();
        let second = store.create_article(&new_article(user.id, "2", now)).unwrap();

        let ids: Vec<i64> = store
            .list_author_articles(user.id)
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[test]
    fn test_latest_articles_newest_first() {
        let (store, user) = setup();
        let base = Utc::now();
        let old = store.create_article(&new_article(user.id, "old", base)).unwrap();
        let new = store
            .create_article(&new_article(user.id, "new", base + ChronoDuration::minutes(1)))
            .unwrap();

        let ids: Vec<i64> = store
            .list_latest_articles(10)
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![new.id, old.id]);
    }

    #[test]
    fn test_create_article_rejects_unknown_author() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();

        let result = store.create_article(&new_article(42, "Hi", Utc::now()));
        assert!(matches!(result, Err(Error::Database(_))));
    }
}
