use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::middleware::auth::{AdminUser, StaffUser};
use crate::models::ticket::{AssignTicketRequest, TicketListQuery, UpdateStatusRequest};
use crate::models::user::{
    AdminCreateUserRequest, AdminUpdateUserRequest, ChangeRoleRequest, User, UserListQuery,
    UserRole,
};
use crate::routes::tickets::ticket_json;
use crate::routes::{failure, internal, map_auth_err, ApiError, ApiResult};
use crate::services::auth::AuthService;
use crate::services::notifications::NotificationService;
use crate::services::stats::StatsService;
use crate::services::tickets::{TicketScope, TicketService};
use crate::AppState;

/// Staff see figures for their own queue only; admins see everything.
pub async fn admin_dashboard(State(state): State<AppState>, staff: StaffUser) -> ApiResult {
    let assignee = match staff.0.user.role() {
        UserRole::Admin => None,
        _ => Some(staff.0.user.id),
    };
    let stats = StatsService::admin_dashboard(&state.db, assignee)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

/// Staff see their assigned queue; admins see every ticket.
pub async fn list_tickets(
    State(state): State<AppState>,
    staff: StaffUser,
    Query(query): Query<TicketListQuery>,
) -> ApiResult {
    let scope = match staff.0.user.role() {
        UserRole::Admin => TicketScope::All,
        _ => TicketScope::Assignee(staff.0.user.id),
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

pub async fn update_ticket_status(
    State(state): State<AppState>,
    staff: StaffUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult {
    if req.status.is_none() && req.priority_id.is_none() {
        return Err(failure(StatusCode::BAD_REQUEST, "Nothing to update"));
    }
    let ticket = TicketService::find(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Ticket not found"))?;

    // Staff may only touch tickets assigned to them.
    if staff.0.user.role() != UserRole::Admin && ticket.assigned_to != Some(staff.0.user.id) {
        return Err(failure(StatusCode::FORBIDDEN, "Ticket is not assigned to you"));
    }

    let updated = TicketService::update_status(&state.db, id, req.status, req.priority_id)
        .await
        .map_err(internal)?;

    if let Some(status) = req.status {
        let data = json!({ "ticket_id": updated.id });
        NotificationService::create(
            &state.db,
            updated.user_id,
            "ticket_status",
            &format!("Ticket #{} is now {status}", updated.id),
            Some(&data),
        )
        .await
        .map_err(internal)?;
    }

    Ok(Json(json!({ "success": true, "ticket": updated })))
}

pub async fn assign_ticket(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<AssignTicketRequest>,
) -> ApiResult {
    let ticket = TicketService::find(&state.db, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Ticket not found"))?;

    let staff = AuthService::find_by_id(&state.db, req.assigned_to)
        .await
        .map_err(map_auth_err)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Staff member not found"))?;
    if !staff.role().is_staff() {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "Tickets can only be assigned to staff",
        ));
    }

    let updated = TicketService::assign(&state.db, &ticket, staff.id)
        .await
        .map_err(internal)?;

    let data = json!({ "ticket_id": updated.id });
    NotificationService::create(
        &state.db,
        staff.id,
        "ticket_assigned",
        &format!("Ticket #{} has been assigned to you", updated.id),
        Some(&data),
    )
    .await
    .map_err(internal)?;

    Ok(Json(json!({ "success": true, "ticket": updated })))
}

pub async fn list_assignable_staff(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> ApiResult {
    let staff = TicketService::assignable_staff(&state.db)
        .await
        .map_err(internal)?;
    let staff: Vec<Value> = staff.iter().map(User::summary).collect();
    Ok(Json(json!({ "success": true, "staff": staff })))
}

// User management, admin only.

pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<UserListQuery>,
) -> ApiResult {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * limit;

    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users
         WHERE ($1::text IS NULL OR role = $1)
           AND ($2::text IS NULL
                OR name ILIKE '%' || $2 || '%'
                OR email ILIKE '%' || $2 || '%'
                OR phone ILIKE '%' || $2 || '%')
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4",
    )
    .bind(query.role.as_deref())
    .bind(query.keyword.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM users
         WHERE ($1::text IS NULL OR role = $1)
           AND ($2::text IS NULL
                OR name ILIKE '%' || $2 || '%'
                OR email ILIKE '%' || $2 || '%'
                OR phone ILIKE '%' || $2 || '%')",
    )
    .bind(query.role.as_deref())
    .bind(query.keyword.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(internal)?;

    let users: Vec<Value> = users.iter().map(User::summary).collect();
    Ok(Json(json!({
        "success": true,
        "users": users,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

/// Admin-created accounts skip email verification.
pub async fn create_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<AdminCreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    AuthService::validate_name(&req.name).map_err(map_auth_err)?;
    AuthService::validate_email(&req.email).map_err(map_auth_err)?;
    AuthService::validate_password(&req.password).map_err(map_auth_err)?;

    if AuthService::find_by_email(&state.db, &req.email)
        .await
        .map_err(map_auth_err)?
        .is_some()
    {
        return Err(failure(StatusCode::CONFLICT, "Email is already registered"));
    }

    let hash = AuthService::hash_password(&req.password).map_err(map_auth_err)?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (name, phone, email, password_hash, role, is_verified)
         VALUES ($1, $2, $3, $4, $5, TRUE)
         RETURNING *",
    )
    .bind(&req.name)
    .bind(req.phone.as_deref().unwrap_or(""))
    .bind(&req.email)
    .bind(&hash)
    .bind(req.role.to_string())
    .fetch_one(&state.db)
    .await
    .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "user": user.summary() })),
    ))
}

pub async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> ApiResult {
    let user = AuthService::find_by_id(&state.db, id)
        .await
        .map_err(map_auth_err)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "User not found"))?;

    if let Some(name) = &req.name {
        AuthService::validate_name(name).map_err(map_auth_err)?;
    }
    if let Some(email) = &req.email {
        AuthService::validate_email(email).map_err(map_auth_err)?;
        if email != &user.email
            && AuthService::find_by_email(&state.db, email)
                .await
                .map_err(map_auth_err)?
                .is_some()
        {
            return Err(failure(StatusCode::CONFLICT, "Email is already registered"));
        }
    }

    let updated = sqlx::query_as::<_, User>(
        "UPDATE users SET
             name = COALESCE($1, name),
             phone = COALESCE($2, phone),
             email = COALESCE($3, email),
             role = COALESCE($4, role),
             updated_at = NOW()
         WHERE id = $5
         RETURNING *",
    )
    .bind(req.name.as_deref())
    .bind(req.phone.as_deref())
    .bind(req.email.as_deref())
    .bind(req.role.map(|r| r.to_string()))
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(internal)?;

    Ok(Json(json!({ "success": true, "user": updated.summary() })))
}

pub async fn change_user_role(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<ChangeRoleRequest>,
) -> ApiResult {
    let updated = sqlx::query_as::<_, User>(
        "UPDATE users SET role = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(req.role.to_string())
    .bind(id)
    .fetch_optional(&state.db)
    .await
    .map_err(internal)?
    .ok_or_else(|| failure(StatusCode::NOT_FOUND, "User not found"))?;
    Ok(Json(json!({ "success": true, "user": updated.summary() })))
}

pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
) -> ApiResult {
    if id == admin.0.user.id {
        return Err(failure(StatusCode::BAD_REQUEST, "You cannot delete yourself"));
    }
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(internal)?;
    if result.rows_affected() == 0 {
        return Err(failure(StatusCode::NOT_FOUND, "User not found"));
    }
    Ok(Json(json!({ "success": true, "message": "User deleted" })))
}
