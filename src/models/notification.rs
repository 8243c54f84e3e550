use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub content: String,
    /// JSON string payload, optional.
    pub data: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
