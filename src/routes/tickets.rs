use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::middleware::auth::CurrentUser;
use crate::models::ticket::{
    NewTicket, TicketDetailRow, TicketListQuery, TicketStatus, UpdateTicketRequest,
};
use crate::models::user::UserRole;
use crate::routes::{failure, internal, ApiError, ApiResult};
use crate::services::notifications::NotificationService;
use crate::services::tickets::{TicketScope, TicketService};
use crate::services::uploads::save_upload;
use crate::AppState;

pub fn ticket_json(row: &TicketDetailRow) -> Value {
    json!({
        "id": row.id,
        "user_id": row.user_id,
        "title": row.title,
        "description": row.description,
        "category": row.category_id.map(|id| json!({ "id": id, "name": row.category_name })),
        "product_type": row.product_type_id
            .map(|id| json!({ "id": id, "name": row.product_type_name })),
        "priority": row.priority_id.map(|id| json!({ "id": id, "name": row.priority_name })),
        "status": row.status,
        "assigned_to": row.assigned_to.map(|id| json!({
            "id": id,
            "name": row.assigned_name,
            "email": row.assigned_email,
            "role": row.assigned_role,
        })),
        "owner": {
            "name": row.owner_name,
            "email": row.owner_email,
            "role": row.owner_role,
        },
        "attachment_path": row.attachment_path,
        "resolved_at": row.resolved_at,
        "has_new_reply": TicketService::has_new_reply(row),
        "created_at": row.created_at,
        "updated_at": row.updated_at,
    })
}

async fn read_ticket_form(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<NewTicket, ApiError> {
    let mut input = NewTicket::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("Invalid form data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "attachment" => {
                let file_name = field.file_name().unwrap_or("attachment").to_owned();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("Upload failed: {e}")))?;
                if !bytes.is_empty() {
                    let path = save_upload(&state.config.upload_dir, &file_name, &bytes)
                        .await
                        .map_err(internal)?;
                    input.attachment_path = Some(path);
                }
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("Invalid field: {e}")))?;
                match name.as_str() {
                    "title" => input.title = text,
                    "description" => input.description = text,
                    "category_id" => input.category_id = text.parse().ok(),
                    "product_type_id" => input.product_type_id = text.parse().ok(),
                    "priority_id" => input.priority_id = text.parse().ok(),
                    _ => {}
                }
            }
        }
    }
    Ok(input)
}

pub async fn create_ticket(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let input = read_ticket_form(&state, multipart).await?;
    if input.title.trim().is_empty() || input.description.trim().is_empty() {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "Title and description are required",
        ));
    }

    let ticket = TicketService::create(&state.db, current.user.id, &input)
        .await
        .map_err(internal)?;

    let data = json!({ "ticket_id": ticket.id });
    NotificationService::notify_admins(
        &state.db,
        "ticket_created",
        &format!("New ticket #{}: {}", ticket.id, ticket.title),
        Some(&data),
    )
    .await
    .map_err(internal)?;

    if let Some(mailer) = &state.email {
        if current.user.is_verified {
            if let Err(e) = mailer
                .send_ticket_created_email(&current.user.email, ticket.id, &ticket.title)
                .await
            {
                tracing::warn!(ticket_id = ticket.id, "Ticket email failed: {e}");
            }
        }
        let admins: Vec<(String,)> = sqlx::query_as(
            "SELECT email FROM users WHERE role = 'admin' AND is_verified = TRUE",
        )
        .fetch_all(&state.db)
        .await
        .map_err(internal)?;
        for (email,) in admins {
            if let Err(e) = mailer
                .send_ticket_created_email(&email, ticket.id, &ticket.title)
                .await
            {
                tracing::warn!(ticket_id = ticket.id, "Ticket email failed: {e}");
            }
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "ticket": ticket })),
    ))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<TicketListQuery>,
) -> ApiResult {
    let scope = match current.user.role() {
        UserRole::Customer => TicketScope::Owner(current.user.id),
        UserRole::Staff => TicketScope::Assignee(current.user.id),
        UserRole::Admin => TicketScope::All,
    };
    let (rows, total) = TicketService::list(&state.db, scope, &query)
        .await
        .map_err(internal)?;
    let (page, limit) = query.page_limit();
    let tickets: Vec<Value> = rows.iter().map(ticket_json).collect();
    Ok(Json(json!({
        "success": true,
        "tickets": tickets,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

fn can_view(row: &TicketDetailRow, current: &CurrentUser) -> bool {
    current.user.role().is_staff() || row.user_id == current.user.id
}

pub async fn get_ticket(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult {
    let row = TicketService::detail(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Ticket not found"))?;
    if !can_view(&row, &current) {
        return Err(failure(StatusCode::FORBIDDEN, "Not your ticket"));
    }
    let body = ticket_json(&row);
    if row.user_id == current.user.id {
        TicketService::mark_viewed(&state.db, id)
            .await
            .map_err(internal)?;
    }
    Ok(Json(json!({ "success": true, "ticket": body })))
}

/// Owners may edit only while the ticket is still new (untouched by staff).
pub async fn update_ticket(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTicketRequest>,
) -> ApiResult {
    let ticket = TicketService::find(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Ticket not found"))?;
    if ticket.user_id != current.user.id {
        return Err(failure(StatusCode::FORBIDDEN, "Not your ticket"));
    }
    if ticket.status != TicketStatus::New.to_string() {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "Only new tickets can be edited",
        ));
    }
    let updated = TicketService::update(
        &state.db,
        &ticket,
        req.title.as_deref(),
        req.description.as_deref(),
        req.category_id,
        req.product_type_id,
        req.priority_id,
    )
    .await
    .map_err(internal)?;
    NotificationService::notify_admins(
        &state.db,
        "ticket_update",
        &format!("Ticket #{} was updated by its owner", updated.id),
        Some(&json!({ "ticket_id": updated.id })),
    )
    .await
    .map_err(internal)?;
    Ok(Json(json!({ "success": true, "ticket": updated })))
}

pub async fn delete_ticket(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult {
    let ticket = TicketService::find(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Ticket not found"))?;

    let is_admin = current.user.role() == UserRole::Admin;
    if !is_admin {
        if ticket.user_id != current.user.id {
            return Err(failure(StatusCode::FORBIDDEN, "Not your ticket"));
        }
        if ticket.status != TicketStatus::New.to_string() {
            return Err(failure(
                StatusCode::BAD_REQUEST,
                "Only new tickets can be deleted",
            ));
        }
    }
    TicketService::delete(&state.db, id).await.map_err(internal)?;
    NotificationService::notify_admins(
        &state.db,
        "ticket_delete",
        &format!("Ticket #{id} was deleted"),
        Some(&json!({ "ticket_id": id })),
    )
    .await
    .map_err(internal)?;
    Ok(Json(json!({ "success": true, "message": "Ticket deleted" })))
}

pub async fn list_comments(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult {
    let row = TicketService::detail(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Ticket not found"))?;
    if !can_view(&row, &current) {
        return Err(failure(StatusCode::FORBIDDEN, "Not your ticket"));
    }
    let comments = TicketService::comments(&state.db, id)
        .await
        .map_err(internal)?;
    let comments: Vec<Value> = comments
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "content": c.content,
                "attachment_path": c.attachment_path,
                "parent_id": c.parent_id,
                "author_name": c.author_name,
                "author_role": c.author_role,
                "created_at": c.created_at,
            })
        })
        .collect();
    Ok(Json(json!({ "success": true, "comments": comments })))
}

pub async fn add_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let ticket = TicketService::find(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Ticket not found"))?;
    if !current.user.role().is_staff() && ticket.user_id != current.user.id {
        return Err(failure(StatusCode::FORBIDDEN, "Not your ticket"));
    }

    let mut content = String::new();
    let mut parent_id: Option<i64> = None;
    let mut attachment_path: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("Invalid form data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "attachment" => {
                let file_name = field.file_name().unwrap_or("attachment").to_owned();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("Upload failed: {e}")))?;
                if !bytes.is_empty() {
                    let path = save_upload(&state.config.upload_dir, &file_name, &bytes)
                        .await
                        .map_err(internal)?;
                    attachment_path = Some(path);
                }
            }
            "content" => {
                content = field
                    .text()
                    .await
                    .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("Invalid field: {e}")))?;
            }
            "parent_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("Invalid field: {e}")))?;
                parent_id = text.parse().ok();
            }
            _ => {}
        }
    }
    if content.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "Comment content is required"));
    }

    let comment = TicketService::add_comment(
        &state.db,
        &ticket,
        &current.user,
        &content,
        attachment_path.as_deref(),
        parent_id,
    )
    .await
    .map_err(internal)?;

    // Tell the other side of the conversation.
    let data = json!({ "ticket_id": ticket.id, "comment_id": comment.id });
    let message = format!("New reply on ticket #{}", ticket.id);
    if current.user.id == ticket.user_id {
        match ticket.assigned_to {
            Some(staff_id) => {
                NotificationService::create(&state.db, staff_id, "ticket_reply", &message, Some(&data))
                    .await
                    .map_err(internal)?;
            }
            None => {
                NotificationService::notify_admins(&state.db, "ticket_reply", &message, Some(&data))
                    .await
                    .map_err(internal)?;
            }
        }
    } else {
        NotificationService::create(&state.db, ticket.user_id, "ticket_reply", &message, Some(&data))
            .await
            .map_err(internal)?;
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "comment": comment })),
    ))
}
