use serde::{Deserialize, Serialize};

fn default_page() -> u64 {
    1
}

fn default_size() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_size")]
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct ArticleIdResponse {
    pub id: i64,
}
