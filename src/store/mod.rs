mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations

    /// Finds the user bound to `identity` (by external id, then by email) or
    /// creates one. Returns the user and whether it was created by this call.
    fn resolve_user(&self, identity: &ExternalIdentity, now: DateTime<Utc>) -> Result<(User, bool)>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;

    // Article operations
    fn create_article(&self, article: &NewArticle) -> Result<Article>;
    fn get_article(&self, id: i64) -> Result<Option<Article>>;
    /// Increments `views` and stamps `last_viewed_at` in one statement.
    fn record_article_view(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Article>>;
    fn list_author_articles(&self, author_id: i64) -> Result<Vec<Article>>;
    /// Overwrites title and content, only when `author_id` owns the article.
    fn update_article_content(
        &self,
        id: i64,
        author_id: i64,
        title: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Article>>;
    fn increment_article_likes(&self, id: i64) -> Result<Option<i64>>;
    fn list_trending_articles(&self, limit: u32) -> Result<Vec<Article>>;
    fn list_latest_articles(&self, limit: u32) -> Result<Vec<Article>>;
}
