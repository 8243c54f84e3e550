use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KnowledgeArticle {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub category: String,
    pub views: i32,
    pub file_path: Option<String>,
    pub is_published: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating/updating an article (multipart form).
#[derive(Debug, Default)]
pub struct ArticleInput {
    pub title: String,
    pub content: String,
    pub category: String,
    pub slug: Option<String>,
    pub is_published: bool,
    pub file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArticleListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
}
