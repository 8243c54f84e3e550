use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::ticket::{
    NewTicket, Ticket, TicketComment, TicketCommentRow, TicketDetailRow, TicketListQuery,
    TicketStatus,
};
use crate::models::user::User;

/// Visibility scope for ticket listings: customers see their own tickets,
/// staff see tickets assigned to them, admins see everything.
#[derive(Debug, Clone, Copy)]
pub enum TicketScope {
    Owner(i64),
    Assignee(i64),
    All,
}

const DETAIL_SELECT: &str = "
    SELECT t.id, t.user_id, t.title, t.description,
           t.category_id, c.name AS category_name,
           t.product_type_id, pt.name AS product_type_name,
           t.priority_id, p.name AS priority_name,
           t.status, t.assigned_to,
           au.name AS assigned_name, au.email AS assigned_email, au.role AS assigned_role,
           ou.name AS owner_name, ou.email AS owner_email, ou.role AS owner_role,
           t.attachment_path, t.resolved_at, t.last_viewed_comment_at,
           (SELECT MAX(tc.created_at) FROM ticket_comments tc
             WHERE tc.ticket_id = t.id) AS latest_comment_at,
           t.created_at, t.updated_at
    FROM tickets t
    JOIN users ou ON ou.id = t.user_id
    LEFT JOIN users au ON au.id = t.assigned_to
    LEFT JOIN ticket_categories c ON c.id = t.category_id
    LEFT JOIN ticket_product_types pt ON pt.id = t.product_type_id
    LEFT JOIN ticket_priorities p ON p.id = t.priority_id";

const LIST_FILTER: &str = "
    WHERE ($1::bigint IS NULL OR t.user_id = $1)
      AND ($2::bigint IS NULL OR t.assigned_to = $2)
      AND ($3::text IS NULL OR t.status = $3)
      AND ($4::bigint IS NULL OR t.category_id = $4)
      AND ($5::text IS NULL OR c.name = $5)
      AND ($6::bigint IS NULL OR t.product_type_id = $6)
      AND ($7::text IS NULL OR pt.name = $7)
      AND ($8::bigint IS NULL OR t.priority_id = $8)
      AND ($9::text IS NULL OR p.name = $9)
      AND ($10::text IS NULL
           OR t.title ILIKE '%' || $10 || '%'
           OR t.description ILIKE '%' || $10 || '%'
           OR ou.name ILIKE '%' || $10 || '%'
           OR ou.email ILIKE '%' || $10 || '%')
      AND ($11::date IS NULL OR t.created_at >= $11)
      AND ($12::date IS NULL OR t.created_at < $12::date + 1)";

pub struct TicketService;

impl TicketService {
    pub async fn create(
        db: &PgPool,
        user_id: i64,
        input: &NewTicket,
    ) -> anyhow::Result<Ticket> {
        let ticket = sqlx::query_as::<_, Ticket>(
            "INSERT INTO tickets
                 (user_id, title, description, category_id, product_type_id,
                  priority_id, attachment_path)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(user_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.category_id)
        .bind(input.product_type_id)
        .bind(input.priority_id)
        .bind(input.attachment_path.as_deref())
        .fetch_one(db)
        .await?;
        Ok(ticket)
    }

    pub async fn list(
        db: &PgPool,
        scope: TicketScope,
        query: &TicketListQuery,
    ) -> anyhow::Result<(Vec<TicketDetailRow>, i64)> {
        let (owner, mut assignee) = match scope {
            TicketScope::Owner(id) => (Some(id), None),
            TicketScope::Assignee(id) => (None, Some(id)),
            TicketScope::All => (None, None),
        };
        // The admin listing may narrow to one assignee explicitly.
        if assignee.is_none() {
            assignee = query.assigned_to;
        }
        let status = query.status.map(|s| s.to_string());
        let (page, limit) = query.page_limit();
        let offset = (page - 1) * limit;

        let sql = format!(
            "{DETAIL_SELECT}{LIST_FILTER}
             ORDER BY t.created_at DESC
             LIMIT $13 OFFSET $14"
        );
        let rows = sqlx::query_as::<_, TicketDetailRow>(&sql)
            .bind(owner)
            .bind(assignee)
            .bind(status.as_deref())
            .bind(query.category_id)
            .bind(query.category.as_deref())
            .bind(query.product_type_id)
            .bind(query.product_type.as_deref())
            .bind(query.priority_id)
            .bind(query.priority.as_deref())
            .bind(query.search.as_deref())
            .bind(query.from_date)
            .bind(query.to_date)
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await?;

        let count_sql = format!(
            "SELECT COUNT(*)
             FROM tickets t
             JOIN users ou ON ou.id = t.user_id
             LEFT JOIN ticket_categories c ON c.id = t.category_id
             LEFT JOIN ticket_product_types pt ON pt.id = t.product_type_id
             LEFT JOIN ticket_priorities p ON p.id = t.priority_id
             {LIST_FILTER}"
        );
        let (total,): (i64,) = sqlx::query_as(&count_sql)
            .bind(owner)
            .bind(assignee)
            .bind(status.as_deref())
            .bind(query.category_id)
            .bind(query.category.as_deref())
            .bind(query.product_type_id)
            .bind(query.product_type.as_deref())
            .bind(query.priority_id)
            .bind(query.priority.as_deref())
            .bind(query.search.as_deref())
            .bind(query.from_date)
            .bind(query.to_date)
            .fetch_one(db)
            .await?;

        Ok((rows, total))
    }

    pub async fn detail(db: &PgPool, id: i64) -> anyhow::Result<Option<TicketDetailRow>> {
        let sql = format!("{DETAIL_SELECT} WHERE t.id = $1");
        let row = sqlx::query_as::<_, TicketDetailRow>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(row)
    }

    pub async fn find(db: &PgPool, id: i64) -> anyhow::Result<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(ticket)
    }

    /// Owners viewing a ticket reset its unread-reply marker.
    pub async fn mark_viewed(db: &PgPool, id: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE tickets SET last_viewed_comment_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn update(
        db: &PgPool,
        ticket: &Ticket,
        title: Option<&str>,
        description: Option<&str>,
        category_id: Option<i64>,
        product_type_id: Option<i64>,
        priority_id: Option<i64>,
    ) -> anyhow::Result<Ticket> {
        let updated = sqlx::query_as::<_, Ticket>(
            "UPDATE tickets SET
                 title = COALESCE($1, title),
                 description = COALESCE($2, description),
                 category_id = COALESCE($3, category_id),
                 product_type_id = COALESCE($4, product_type_id),
                 priority_id = COALESCE($5, priority_id),
                 updated_at = NOW()
             WHERE id = $6
             RETURNING *",
        )
        .bind(title)
        .bind(description)
        .bind(category_id)
        .bind(product_type_id)
        .bind(priority_id)
        .bind(ticket.id)
        .fetch_one(db)
        .await?;
        Ok(updated)
    }

    pub async fn delete(db: &PgPool, id: i64) -> anyhow::Result<()> {
        let mut tx = db.begin().await?;
        sqlx::query("DELETE FROM ticket_comments WHERE ticket_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn comments(db: &PgPool, ticket_id: i64) -> anyhow::Result<Vec<TicketCommentRow>> {
        let rows = sqlx::query_as::<_, TicketCommentRow>(
            "SELECT tc.id, tc.content, tc.attachment_path, tc.parent_id, tc.created_at,
                    u.name AS author_name, u.role AS author_role
             FROM ticket_comments tc
             LEFT JOIN users u ON u.id = tc.user_id
             WHERE tc.ticket_id = $1
             ORDER BY tc.created_at ASC",
        )
        .bind(ticket_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Inserts a comment and moves the ticket between in_progress and
    /// awaiting_reply depending on which side wrote it. Closed or resolved
    /// tickets keep their status.
    pub async fn add_comment(
        db: &PgPool,
        ticket: &Ticket,
        author: &User,
        content: &str,
        attachment_path: Option<&str>,
        parent_id: Option<i64>,
    ) -> anyhow::Result<TicketComment> {
        let comment = sqlx::query_as::<_, TicketComment>(
            "INSERT INTO ticket_comments (ticket_id, user_id, content, attachment_path, parent_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(ticket.id)
        .bind(author.id)
        .bind(content)
        .bind(attachment_path)
        .bind(parent_id)
        .fetch_one(db)
        .await?;

        let current: TicketStatus = ticket.status.parse().unwrap_or(TicketStatus::New);
        let next = match (author.role().is_staff(), current) {
            (_, TicketStatus::Resolved) | (_, TicketStatus::Closed) => None,
            (true, _) => Some(TicketStatus::AwaitingReply),
            (false, TicketStatus::AwaitingReply) => Some(TicketStatus::InProgress),
            (false, _) => None,
        };
        if let Some(next) = next {
            sqlx::query("UPDATE tickets SET status = $1, updated_at = NOW() WHERE id = $2")
                .bind(next.to_string())
                .bind(ticket.id)
                .execute(db)
                .await?;
        } else {
            sqlx::query("UPDATE tickets SET updated_at = NOW() WHERE id = $1")
                .bind(ticket.id)
                .execute(db)
                .await?;
        }
        Ok(comment)
    }

    /// Assigning a new ticket also moves it to in_progress.
    pub async fn assign(db: &PgPool, ticket: &Ticket, staff_id: i64) -> anyhow::Result<Ticket> {
        let status = if ticket.status == TicketStatus::New.to_string() {
            TicketStatus::InProgress.to_string()
        } else {
            ticket.status.clone()
        };
        let updated = sqlx::query_as::<_, Ticket>(
            "UPDATE tickets SET assigned_to = $1, status = $2, updated_at = NOW()
             WHERE id = $3
             RETURNING *",
        )
        .bind(staff_id)
        .bind(&status)
        .bind(ticket.id)
        .fetch_one(db)
        .await?;
        Ok(updated)
    }

    /// Entering resolved/closed stamps resolved_at; leaving clears it.
    pub async fn update_status(
        db: &PgPool,
        ticket_id: i64,
        status: Option<TicketStatus>,
        priority_id: Option<i64>,
    ) -> anyhow::Result<Ticket> {
        let resolved_at: Option<DateTime<Utc>> = match status {
            Some(TicketStatus::Resolved) | Some(TicketStatus::Closed) => Some(Utc::now()),
            _ => None,
        };
        let updated = sqlx::query_as::<_, Ticket>(
            "UPDATE tickets SET
                 status = COALESCE($1, status),
                 priority_id = COALESCE($2, priority_id),
                 resolved_at = CASE
                     WHEN $1 IS NULL THEN resolved_at
                     ELSE $3
                 END,
                 updated_at = NOW()
             WHERE id = $4
             RETURNING *",
        )
        .bind(status.map(|s| s.to_string()))
        .bind(priority_id)
        .bind(resolved_at)
        .bind(ticket_id)
        .fetch_one(db)
        .await?;
        Ok(updated)
    }

    pub async fn assignable_staff(db: &PgPool) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE role IN ('staff', 'admin') ORDER BY name ASC",
        )
        .fetch_all(db)
        .await?;
        Ok(users)
    }

    /// Open tickets with no activity for 24 hours, for the reminder job.
    pub async fn late_tickets(db: &PgPool) -> anyhow::Result<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets
             WHERE status NOT IN ('resolved', 'closed')
               AND updated_at < NOW() - INTERVAL '24 hours'
             ORDER BY updated_at ASC",
        )
        .fetch_all(db)
        .await?;
        Ok(tickets)
    }

    pub fn has_new_reply(row: &TicketDetailRow) -> bool {
        match row.latest_comment_at {
            None => false,
            Some(latest) => match row.last_viewed_comment_at {
                None => true,
                Some(viewed) => latest > viewed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ticket::TicketListQuery;

    #[test]
    fn page_and_limit_are_clamped() {
        let q = TicketListQuery {
            page: Some(0),
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(q.page_limit(), (1, 10));

        let q = TicketListQuery {
            page: Some(3),
            limit: Some(100),
            ..Default::default()
        };
        assert_eq!(q.page_limit(), (3, 100));

        let q = TicketListQuery::default();
        assert_eq!(q.page_limit(), (1, 10));
    }

    #[test]
    fn new_reply_marker_compares_timestamps() {
        use chrono::{Duration, Utc};

        let base = TicketDetailRow {
            id: 1,
            user_id: 1,
            title: "t".into(),
            description: "d".into(),
            category_id: None,
            category_name: None,
            product_type_id: None,
            product_type_name: None,
            priority_id: None,
            priority_name: None,
            status: "new".into(),
            assigned_to: None,
            assigned_name: None,
            assigned_email: None,
            assigned_role: None,
            owner_name: "o".into(),
            owner_email: "o@example.com".into(),
            owner_role: "customer".into(),
            attachment_path: None,
            resolved_at: None,
            last_viewed_comment_at: None,
            latest_comment_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!TicketService::has_new_reply(&base));

        let mut with_comment = base.clone();
        with_comment.latest_comment_at = Some(Utc::now());
        assert!(TicketService::has_new_reply(&with_comment));

        with_comment.last_viewed_comment_at = Some(Utc::now() + Duration::seconds(5));
        assert!(!TicketService::has_new_reply(&with_comment));
    }
}
