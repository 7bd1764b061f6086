use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppResult,
    services::{ArticleForm, CurrentUser},
    utils::success_to_api_response,
};

use super::model::{ArticleIdResponse, SearchQuery};

#[axum::debug_handler]
pub async fn create_article(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<ArticleForm>,
) -> AppResult<impl IntoResponse> {
    let article = state.articles.issue(&current.user, form).await?;
    Ok(success_to_api_response(ArticleIdResponse { id: article.id }))
}

#[axum::debug_handler]
pub async fn update_article(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<ArticleForm>,
) -> AppResult<impl IntoResponse> {
    let article = state.articles.update(&current.user, id, form).await?;
    Ok(success_to_api_response(article))
}

#[axum::debug_handler]
pub async fn delete_article(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    state.articles.delete(&current.user, id).await?;
    Ok(success_to_api_response(ArticleIdResponse { id }))
}

#[axum::debug_handler]
pub async fn get_article(
    State(state): State<AppState>,
    current: Option<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let viewer = current.as_ref().map(|c| &c.user);
    let view = state.articles.view(viewer, id).await?;
    Ok(success_to_api_response(view))
}

#[axum::debug_handler]
pub async fn my_articles(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let list = state.articles.list_mine(&current.user).await?;
    Ok(success_to_api_response(list))
}

#[axum::debug_handler]
pub async fn search_articles(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<impl IntoResponse> {
    let page = state
        .articles
        .search_store(&query.q, query.page, query.size)
        .await?;
    Ok(success_to_api_response(page))
}

#[axum::debug_handler]
pub async fn search_index(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<impl IntoResponse> {
    let page = state
        .articles
        .search_index(&query.q, query.page, query.size)
        .await?;
    Ok(success_to_api_response(page))
}
