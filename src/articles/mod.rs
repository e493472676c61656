//! Article operations: creation, counted reads, likes, author-only edits and
//! the trending ranking.
//!
//! Every check (existence, ownership, field validation) runs before the store
//! is asked to mutate anything, and every mutation is a single statement, so
//! a rejected or abandoned request leaves no partial write behind.

mod validation;

pub use validation::{normalize_cover_image, validate_title_and_content};

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Article, ArticleDraft, NewArticle};

pub const TRENDING_LIMIT: u32 = 10;
pub const DEFAULT_LATEST_LIMIT: u32 = 20;
pub const MAX_LATEST_LIMIT: u32 = 100;

pub fn create_article(
    store: &dyn Store,
    author_id: i64,
    draft: ArticleDraft,
    now: DateTime<Utc>,
) -> Result<Article> {
    validate_title_and_content(&draft.title, &draft.content)?;

    let article = store.create_article(&NewArticle {
        author_id,
        title: draft.title,
        content: draft.content,
        cover_image: normalize_cover_image(draft.cover_image),
        created_at: now,
    })?;

    tracing::info!("User {} created article {}", author_id, article.id);
    Ok(article)
}

/// Reads an article, counting the read. Not idempotent: each call bumps
/// `views` by one and stamps `last_viewed_at`.
pub fn view_article(store: &dyn Store, id: i64, now: DateTime<Utc>) -> Result<Article> {
    store.record_article_view(id, now)?.ok_or(Error::NotFound)
}

pub fn list_author_articles(store: &dyn Store, author_id: i64) -> Result<Vec<Article>> {
    store.list_author_articles(author_id)
}

pub fn update_article(
    store: &dyn Store,
    id: i64,
    editor_id: i64,
    title: &str,
    content: &str,
    now: DateTime<Utc>,
) -> Result<Article> {
    let article = store.get_article(id)?.ok_or(Error::NotFound)?;

    if article.author_id != editor_id {
        return Err(Error::Forbidden);
    }

    validate_title_and_content(title, content)?;

    // author_id never changes, so the ownership check above cannot go stale;
    // a miss here means the row vanished in between.
    store
        .update_article_content(id, editor_id, title, content, now)?
        .ok_or(Error::NotFound)
}

/// Returns the like count after this like.
pub fn like_article(store: &dyn Store, id: i64) -> Result<i64> {
    store.increment_article_likes(id)?.ok_or(Error::NotFound)
}

/// Top articles by views, then likes, then recency.
pub fn trending_articles(store: &dyn Store, limit: u32) -> Result<Vec<Article>> {
    store.list_trending_articles(limit)
}

pub fn latest_articles(store: &dyn Store, limit: Option<u32>) -> Result<Vec<Article>> {
    let limit = limit
        .unwrap_or(DEFAULT_LATEST_LIMIT)
        .clamp(1, MAX_LATEST_LIMIT);
    store.list_latest_articles(limit)
}
