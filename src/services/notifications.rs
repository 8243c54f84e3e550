use sqlx::PgPool;

use crate::models::notification::Notification;

pub struct NotificationService;

impl NotificationService {
    pub async fn create(
        db: &PgPool,
        user_id: i64,
        kind: &str,
        content: &str,
        data: Option<&serde_json::Value>,
    ) -> anyhow::Result<Notification> {
        let data = data.map(|v| v.to_string()).unwrap_or_default();
        let notification = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (user_id, kind, content, data)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(user_id)
        .bind(kind)
        .bind(content)
        .bind(&data)
        .fetch_one(db)
        .await?;
        Ok(notification)
    }

    /// Newest 50 notifications for the user.
    pub async fn list(db: &PgPool, user_id: i64) -> anyhow::Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT 50",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Marks a notification read. Ownership is enforced in the query, so a
    /// foreign id is indistinguishable from a missing one.
    pub async fn mark_read(db: &PgPool, id: i64, user_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(db: &PgPool, user_id: i64) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }

    /// Fan out a ticket event to every verified admin.
    pub async fn notify_admins(
        db: &PgPool,
        kind: &str,
        content: &str,
        data: Option<&serde_json::Value>,
    ) -> anyhow::Result<()> {
        let admin_ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM users WHERE role = 'admin' AND is_verified = TRUE",
        )
        .fetch_all(db)
        .await?;
        for (id,) in admin_ids {
            Self::create(db, id, kind, content, data).await?;
        }
        Ok(())
    }
}
