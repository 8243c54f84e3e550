use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::middleware::auth::AdminUser;
use crate::models::ticket::{AttributeNameRequest, TicketAttribute};
use crate::routes::{failure, internal, ApiError, ApiResult};
use crate::AppState;

/// Maps the URL segment to its lookup table. Anything else is a 404.
fn table_for(kind: &str) -> Result<&'static str, ApiError> {
    match kind {
        "categories" => Ok("ticket_categories"),
        "product-types" => Ok("ticket_product_types"),
        "priorities" => Ok("ticket_priorities"),
        _ => Err(failure(StatusCode::NOT_FOUND, "Unknown attribute kind")),
    }
}

/// All three attribute lists in one response, for the ticket form. Public.
pub async fn list_attributes(State(state): State<AppState>) -> ApiResult {
    let categories = sqlx::query_as::<_, TicketAttribute>(
        "SELECT id, name FROM ticket_categories ORDER BY name ASC",
    )
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;
    let product_types = sqlx::query_as::<_, TicketAttribute>(
        "SELECT id, name FROM ticket_product_types ORDER BY name ASC",
    )
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;
    let priorities = sqlx::query_as::<_, TicketAttribute>(
        "SELECT id, name FROM ticket_priorities ORDER BY id ASC",
    )
    .fetch_all(&state.db)
    .await
    .map_err(internal)?;

    Ok(Json(json!({
        "success": true,
        "categories": categories,
        "product_types": product_types,
        "priorities": priorities,
    })))
}

pub async fn create_attribute(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(kind): Path<String>,
    Json(req): Json<AttributeNameRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let table = table_for(&kind)?;
    if req.name.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "Name is required"));
    }
    let sql = format!(
        "INSERT INTO {table} (name) VALUES ($1)
         ON CONFLICT (name) DO NOTHING
         RETURNING id, name"
    );
    let created = sqlx::query_as::<_, TicketAttribute>(&sql)
        .bind(req.name.trim())
        .fetch_optional(&state.db)
        .await
        .map_err(internal)?
        .ok_or_else(|| failure(StatusCode::CONFLICT, "Name already exists"))?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "attribute": created })),
    ))
}

pub async fn update_attribute(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path((kind, id)): Path<(String, i64)>,
    Json(req): Json<AttributeNameRequest>,
) -> ApiResult {
    let table = table_for(&kind)?;
    if req.name.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "Name is required"));
    }
    let sql = format!("UPDATE {table} SET name = $1 WHERE id = $2 RETURNING id, name");
    let updated = sqlx::query_as::<_, TicketAttribute>(&sql)
        .bind(req.name.trim())
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(internal)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Attribute not found"))?;
    Ok(Json(json!({ "success": true, "attribute": updated })))
}

pub async fn delete_attribute(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult {
    let table = table_for(&kind)?;
    let sql = format!("DELETE FROM {table} WHERE id = $1");
    let result = sqlx::query(&sql)
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(internal)?;
    if result.rows_affected() == 0 {
        return Err(failure(StatusCode::NOT_FOUND, "Attribute not found"));
    }
    Ok(Json(json!({ "success": true, "message": "Attribute deleted" })))
}
