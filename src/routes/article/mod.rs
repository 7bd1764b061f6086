mod handler;
mod model;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub use handler::{
    create_article, delete_article, get_article, my_articles, search_articles, search_index,
    update_article,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/articles", post(create_article))
        .route("/articles/mine", get(my_articles))
        .route("/articles/search", get(search_articles))
        .route("/articles/search-index", get(search_index))
        .route(
            "/articles/{id}",
            get(get_article).put(update_article).delete(delete_article),
        )
}
