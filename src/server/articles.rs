use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;

use crate::articles::{self, TRENDING_LIMIT};
use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{
    ArticleEnvelope, ArticleListResponse, CreateArticleRequest, LatestParams, LikeResponse,
    TrendingResponse, UpdateArticleRequest,
};
use crate::server::response::ApiError;
use crate::types::ArticleDraft;

pub fn article_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/articles", post(create_article))
        .route("/articles/", post(create_article))
        .route("/articles/trending", get(trending_articles))
        .route("/articles/me/all", get(my_articles))
        .route("/articles/{id}", get(get_article))
        .route("/articles/{id}", put(update_article))
        .route("/articles/{id}/like", post(like_article))
        .route("/feed/latest", get(latest_articles))
}

fn body_or_default<T: Default>(body: Result<Json<T>, JsonRejection>) -> T {
    match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::debug!("Unreadable request body: {}", rejection.body_text());
            T::default()
        }
    }
}

async fn create_article(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateArticleRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = body_or_default(body);
    let draft = ArticleDraft {
        title: req.title.unwrap_or_default(),
        content: req.content.unwrap_or_default(),
        cover_image: req.cover_image,
    };

    let article = articles::create_article(state.store.as_ref(), auth.user.id, draft, Utc::now())?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ArticleEnvelope {
            success: true,
            article,
        }),
    ))
}

async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let article = articles::view_article(state.store.as_ref(), id, Utc::now())?;

    Ok::<_, ApiError>(Json(article))
}

async fn my_articles(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let articles = articles::list_author_articles(state.store.as_ref(), auth.user.id)?;

    Ok::<_, ApiError>(Json(ArticleListResponse { articles }))
}

async fn update_article(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<UpdateArticleRequest>, JsonRejection>,
) -> impl IntoResponse {
    // An unreadable body counts as missing fields, reported only after the
    // existence and ownership checks.
    let req = body_or_default(body);
    let article = articles::update_article(
        state.store.as_ref(),
        id,
        auth.user.id,
        req.title.as_deref().unwrap_or_default(),
        req.content.as_deref().unwrap_or_default(),
        Utc::now(),
    )?;

    Ok::<_, ApiError>(Json(ArticleEnvelope {
        success: true,
        article,
    }))
}

async fn like_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let likes = articles::like_article(state.store.as_ref(), id)?;

    Ok::<_, ApiError>(Json(LikeResponse {
        success: true,
        likes,
    }))
}

async fn trending_articles(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let trending = articles::trending_articles(state.store.as_ref(), TRENDING_LIMIT)?;

    Ok::<_, ApiError>(Json(TrendingResponse { trending }))
}

async fn latest_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LatestParams>,
) -> impl IntoResponse {
    let articles = articles::latest_articles(state.store.as_ref(), params.limit)?;

    Ok::<_, ApiError>(Json(ArticleListResponse { articles }))
}
