use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    InProgress,
    AwaitingReply,
    Resolved,
    Closed,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TicketStatus::New => "new",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::AwaitingReply => "awaiting_reply",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TicketStatus::New),
            "in_progress" => Ok(TicketStatus::InProgress),
            "awaiting_reply" => Ok(TicketStatus::AwaitingReply),
            "resolved" => Ok(TicketStatus::Resolved),
            "closed" => Ok(TicketStatus::Closed),
            _ => Err(anyhow::anyhow!("Unknown ticket status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub category_id: Option<i64>,
    pub product_type_id: Option<i64>,
    pub priority_id: Option<i64>,
    pub status: String,
    pub assigned_to: Option<i64>,
    pub attachment_path: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_viewed_comment_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ticket row joined with owner, assignee and attribute names, as returned
/// by the listing/detail queries.
#[derive(Debug, Clone, FromRow)]
pub struct TicketDetailRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub product_type_id: Option<i64>,
    pub product_type_name: Option<String>,
    pub priority_id: Option<i64>,
    pub priority_name: Option<String>,
    pub status: String,
    pub assigned_to: Option<i64>,
    pub assigned_name: Option<String>,
    pub assigned_email: Option<String>,
    pub assigned_role: Option<String>,
    pub owner_name: String,
    pub owner_email: String,
    pub owner_role: String,
    pub attachment_path: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_viewed_comment_at: Option<DateTime<Utc>>,
    pub latest_comment_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketComment {
    pub id: i64,
    pub ticket_id: i64,
    pub user_id: i64,
    pub content: String,
    pub attachment_path: Option<String>,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Comment joined with its author for the listing response.
#[derive(Debug, Clone, FromRow)]
pub struct TicketCommentRow {
    pub id: i64,
    pub content: String,
    pub attachment_path: Option<String>,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub author_name: Option<String>,
    pub author_role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketAttribute {
    pub id: i64,
    pub name: String,
}

/// Fields accepted when creating a ticket (multipart form).
#[derive(Debug, Default)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub category_id: Option<i64>,
    pub product_type_id: Option<i64>,
    pub priority_id: Option<i64>,
    pub attachment_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub product_type_id: Option<i64>,
    pub priority_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<TicketStatus>,
    pub priority_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketRequest {
    pub assigned_to: i64,
}

#[derive(Debug, Deserialize)]
pub struct AttributeNameRequest {
    pub name: String,
}

/// Listing filters shared by the user and admin ticket endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct TicketListQuery {
    pub status: Option<TicketStatus>,
    pub category_id: Option<i64>,
    pub category: Option<String>,
    pub product_type_id: Option<i64>,
    pub product_type: Option<String>,
    pub priority_id: Option<i64>,
    pub priority: Option<String>,
    pub assigned_to: Option<i64>,
    pub search: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl TicketListQuery {
    /// Page clamped to >= 1, limit clamped to 1..=100 (default 10).
    pub fn page_limit(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = match self.limit.unwrap_or(10) {
            l if (1..=100).contains(&l) => l,
            _ => 10,
        };
        (page, limit)
    }
}
