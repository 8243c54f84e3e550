use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::middleware::auth::AdminUser;
use crate::models::knowledge::{ArticleInput, ArticleListQuery};
use crate::routes::{failure, internal, ApiError, ApiResult};
use crate::services::knowledge::KnowledgeService;
use crate::services::uploads::save_upload;
use crate::AppState;

/// Public listing of published articles.
pub async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticleListQuery>,
) -> ApiResult {
    let (articles, total) = KnowledgeService::list_published(&state.db, &query)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "success": true, "articles": articles, "total": total })))
}

/// Public article detail by slug; each hit bumps the view counter.
pub async fn get_article(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult {
    let article = KnowledgeService::view_by_slug(&state.db, &slug)
        .await
        .map_err(internal)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Article not found"))?;
    Ok(Json(json!({ "success": true, "article": article })))
}

pub async fn admin_list_articles(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ArticleListQuery>,
) -> ApiResult {
    let (articles, total) = KnowledgeService::list_all(&state.db, &query)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "success": true, "articles": articles, "total": total })))
}

async fn read_article_form(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<ArticleInput, ApiError> {
    let mut input = ArticleInput::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("Invalid form data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("file").to_owned();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("Upload failed: {e}")))?;
            if !bytes.is_empty() {
                let path = save_upload(&state.config.upload_dir, &file_name, &bytes)
                    .await
                    .map_err(internal)?;
                input.file_path = Some(path);
            }
            continue;
        }
        let text = field
            .text()
            .await
            .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("Invalid field: {e}")))?;
        match name.as_str() {
            "title" => input.title = text,
            "content" => input.content = text,
            "category" => input.category = text,
            "slug" => input.slug = Some(text),
            "is_published" => input.is_published = matches!(text.as_str(), "true" | "1"),
            _ => {}
        }
    }
    Ok(input)
}

pub async fn create_article(
    State(state): State<AppState>,
    admin: AdminUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let input = read_article_form(&state, multipart).await?;
    if input.title.trim().is_empty() || input.content.trim().is_empty() {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "Title and content are required",
        ));
    }
    let article = KnowledgeService::create(&state.db, &input, admin.0.user.id)
        .await
        .map_err(internal)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "article": article })),
    ))
}

pub async fn update_article(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> ApiResult {
    let input = read_article_form(&state, multipart).await?;
    if input.title.trim().is_empty() || input.content.trim().is_empty() {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "Title and content are required",
        ));
    }
    let article = KnowledgeService::update(&state.db, id, &input)
        .await
        .map_err(internal)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Article not found"))?;
    Ok(Json(json!({ "success": true, "article": article })))
}

pub async fn delete_article(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> ApiResult {
    let deleted = KnowledgeService::delete(&state.db, id)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(failure(StatusCode::NOT_FOUND, "Article not found"));
    }
    Ok(Json(json!({ "success": true, "message": "Article deleted" })))
}
