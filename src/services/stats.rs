use serde_json::{json, Value};
use sqlx::PgPool;

pub struct StatsService;

impl StatsService {
    /// Per-user dashboard: the caller's ticket counts by status, with the
    /// derived totals the dashboard cards show.
    pub async fn user_dashboard(db: &PgPool, user_id: i64) -> anyhow::Result<Value> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM tickets WHERE user_id = $1 GROUP BY status",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        let mut total = 0i64;
        let mut by_status = serde_json::Map::new();
        for (status, count) in rows {
            total += count;
            by_status.insert(status, json!(count));
        }
        let get = |key: &str| by_status.get(key).and_then(Value::as_i64).unwrap_or(0);
        let new = get("new");
        let pending = get("in_progress") + get("awaiting_reply");
        let resolved = get("resolved") + get("closed");

        Ok(json!({
            "total_tickets": total,
            "new_tickets": new,
            "pending_tickets": pending,
            "resolved_tickets": resolved,
            "by_status": by_status,
        }))
    }

    /// System-wide dashboard. `assignee` narrows every figure to one staff
    /// member's queue (staff callers see only their own assignments).
    pub async fn admin_dashboard(db: &PgPool, assignee: Option<i64>) -> anyhow::Result<Value> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tickets
             WHERE ($1::bigint IS NULL OR assigned_to = $1)",
        )
        .bind(assignee)
        .fetch_one(db)
        .await?;
        let (open,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tickets
             WHERE status NOT IN ('resolved', 'closed')
               AND ($1::bigint IS NULL OR assigned_to = $1)",
        )
        .bind(assignee)
        .fetch_one(db)
        .await?;
        let (resolved, avg_resolution_hours): (i64, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*), AVG(EXTRACT(EPOCH FROM (resolved_at - created_at)) / 3600.0)
             FROM tickets
             WHERE resolved_at IS NOT NULL
               AND ($1::bigint IS NULL OR assigned_to = $1)",
        )
        .bind(assignee)
        .fetch_one(db)
        .await?;
        let (created_this_month, resolved_this_month): (i64, i64) = sqlx::query_as(
            "SELECT
                 COUNT(*) FILTER (WHERE created_at >= DATE_TRUNC('month', NOW())),
                 COUNT(*) FILTER (WHERE resolved_at >= DATE_TRUNC('month', NOW()))
             FROM tickets
             WHERE ($1::bigint IS NULL OR assigned_to = $1)",
        )
        .bind(assignee)
        .fetch_one(db)
        .await?;

        let status_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM tickets
             WHERE ($1::bigint IS NULL OR assigned_to = $1)
             GROUP BY status",
        )
        .bind(assignee)
        .fetch_all(db)
        .await?;
        let by_status: serde_json::Map<String, Value> = status_rows
            .into_iter()
            .map(|(status, count)| (status, json!(count)))
            .collect();

        // Last 12 months of ticket volume, oldest first.
        let monthly_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT TO_CHAR(DATE_TRUNC('month', created_at), 'YYYY-MM') AS month, COUNT(*)
             FROM tickets
             WHERE created_at >= DATE_TRUNC('month', NOW()) - INTERVAL '11 months'
               AND ($1::bigint IS NULL OR assigned_to = $1)
             GROUP BY month
             ORDER BY month ASC",
        )
        .bind(assignee)
        .fetch_all(db)
        .await?;
        let monthly: Vec<Value> = monthly_rows
            .into_iter()
            .map(|(month, count)| json!({ "month": month, "count": count }))
            .collect();

        // Top 5 resolvers system-wide, or just the caller's own figures.
        let staff_rows: Vec<(i64, String, i64, Option<f64>)> = sqlx::query_as(
            "SELECT u.id, u.name, COUNT(t.id),
                    AVG(EXTRACT(EPOCH FROM (t.resolved_at - t.created_at)) / 3600.0)
             FROM users u
             JOIN tickets t ON t.assigned_to = u.id AND t.resolved_at IS NOT NULL
             WHERE ($1::bigint IS NULL OR u.id = $1)
             GROUP BY u.id, u.name
             ORDER BY COUNT(t.id) DESC
             LIMIT 5",
        )
        .bind(assignee)
        .fetch_all(db)
        .await?;
        let top_staff: Vec<Value> = staff_rows
            .into_iter()
            .map(|(id, name, count, avg_hours)| {
                json!({
                    "id": id,
                    "name": name,
                    "resolved": count,
                    "avg_resolution_hours": avg_hours,
                })
            })
            .collect();

        let resolution_rate = if total > 0 {
            resolved as f64 / total as f64
        } else {
            0.0
        };

        let (users_total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(db)
            .await?;

        Ok(json!({
            "total_tickets": total,
            "open_tickets": open,
            "resolved_tickets": resolved,
            "resolution_rate": resolution_rate,
            "avg_resolution_hours": avg_resolution_hours,
            "created_this_month": created_this_month,
            "resolved_this_month": resolved_this_month,
            "by_status": by_status,
            "monthly": monthly,
            "top_staff": top_staff,
            "total_users": users_total,
        }))
    }
}
