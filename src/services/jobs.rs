use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use crate::services::notifications::NotificationService;
use crate::services::tickets::TicketService;
use crate::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const REMINDER_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Spawns the hourly background loops: token blacklist sweeping and
/// late-ticket reminders.
pub fn spawn(state: AppState) {
    spawn_blacklist_sweep(state.clone());
    spawn_late_ticket_reminders(state);
}

fn spawn_blacklist_sweep(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        // The first tick fires immediately; skip it so a fresh process
        // doesn't log a pointless empty sweep.
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = state.tokens.sweep();
            if removed > 0 {
                tracing::info!(removed, "Swept expired entries from token blacklist");
            }
        }
    });
}

fn spawn_late_ticket_reminders(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REMINDER_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = remind_late_tickets(&state).await {
                tracing::error!("Late-ticket reminder run failed: {e}");
            }
        }
    });
}

/// Emails the assignee of every open ticket idle for 24+ hours, falling back
/// to all verified admins when nobody is assigned.
async fn remind_late_tickets(state: &AppState) -> anyhow::Result<()> {
    let late = TicketService::late_tickets(&state.db).await?;
    if late.is_empty() {
        return Ok(());
    }
    tracing::info!(count = late.len(), "Sending late-ticket reminders");

    for ticket in late {
        let hours_idle = (Utc::now() - ticket.updated_at).num_hours();
        let recipients: Vec<(i64, String)> = match ticket.assigned_to {
            Some(staff_id) => sqlx::query_as("SELECT id, email FROM users WHERE id = $1")
                .bind(staff_id)
                .fetch_all(&state.db)
                .await?,
            None => sqlx::query_as(
                "SELECT id, email FROM users WHERE role = 'admin' AND is_verified = TRUE",
            )
            .fetch_all(&state.db)
            .await?,
        };

        let data = json!({ "ticket_id": ticket.id });
        for (user_id, email) in recipients {
            NotificationService::create(
                &state.db,
                user_id,
                "ticket_late",
                &format!("Ticket #{} has had no activity for {hours_idle} hours", ticket.id),
                Some(&data),
            )
            .await?;
            if let Some(mailer) = &state.email {
                if let Err(e) = mailer
                    .send_late_ticket_reminder(&email, ticket.id, &ticket.title, hours_idle)
                    .await
                {
                    tracing::warn!(ticket_id = ticket.id, "Reminder email failed: {e}");
                }
            }
        }
    }
    Ok(())
}
