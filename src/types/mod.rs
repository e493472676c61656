mod models;

pub use models::{Article, ArticleDraft, ExternalIdentity, NewArticle, User};
