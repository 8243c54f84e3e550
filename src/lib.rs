use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::email::EmailService;
use services::tokens::TokenAuthority;

const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub tokens: Arc<TokenAuthority>,
    pub email: Option<EmailService>,
}

pub fn app(state: AppState) -> Router {
    let upload_dir = state.config.upload_dir.clone();

    Router::new()
        .route("/api/health", get(routes::health::health_check))
        // Accounts
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/verify-email", post(routes::auth::verify_email))
        .route(
            "/api/auth/resend-verification",
            post(routes::auth::resend_verification),
        )
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/login/2fa", post(routes::auth::login_two_factor))
        .route("/api/auth/refresh-token", post(routes::auth::refresh_token))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/forgot-password", post(routes::auth::forgot_password))
        .route(
            "/api/auth/verify-reset-code",
            post(routes::auth::verify_reset_code),
        )
        .route("/api/auth/reset-password", post(routes::auth::reset_password))
        // Profile
        .route(
            "/api/profile",
            get(routes::profile::get_profile).put(routes::profile::update_profile),
        )
        .route("/api/profile/password", put(routes::profile::change_password))
        .route("/api/profile/2fa/setup", post(routes::profile::two_factor_setup))
        .route("/api/profile/2fa/enable", post(routes::profile::two_factor_enable))
        .route(
            "/api/profile/2fa/disable",
            post(routes::profile::two_factor_disable),
        )
        // Tickets
        .route(
            "/api/tickets",
            post(routes::tickets::create_ticket).get(routes::tickets::list_tickets),
        )
        .route(
            "/api/tickets/{id}",
            get(routes::tickets::get_ticket)
                .put(routes::tickets::update_ticket)
                .delete(routes::tickets::delete_ticket),
        )
        .route(
            "/api/tickets/{id}/comments",
            get(routes::tickets::list_comments).post(routes::tickets::add_comment),
        )
        .route("/api/attributes", get(routes::attributes::list_attributes))
        // Notifications and the user dashboard
        .route(
            "/api/notifications",
            get(routes::notifications::list_notifications),
        )
        .route(
            "/api/notifications/{id}/read",
            put(routes::notifications::mark_read),
        )
        .route(
            "/api/notifications/read-all",
            put(routes::notifications::mark_all_read),
        )
        .route("/api/dashboard", get(routes::notifications::user_dashboard))
        // Knowledge base (public)
        .route("/api/knowledge", get(routes::knowledge::list_articles))
        .route("/api/knowledge/{slug}", get(routes::knowledge::get_article))
        // Staff and admin
        .route("/api/admin/dashboard", get(routes::admin::admin_dashboard))
        .route("/api/admin/tickets", get(routes::admin::list_tickets))
        .route(
            "/api/admin/tickets/{id}/status",
            put(routes::admin::update_ticket_status),
        )
        .route(
            "/api/admin/tickets/{id}/assign",
            put(routes::admin::assign_ticket),
        )
        .route("/api/admin/staff", get(routes::admin::list_assignable_staff))
        .route(
            "/api/admin/users",
            get(routes::admin::list_users).post(routes::admin::create_user),
        )
        .route(
            "/api/admin/users/{id}",
            put(routes::admin::update_user).delete(routes::admin::delete_user),
        )
        .route(
            "/api/admin/users/{id}/role",
            put(routes::admin::change_user_role),
        )
        .route(
            "/api/admin/attributes/{kind}",
            post(routes::attributes::create_attribute),
        )
        .route(
            "/api/admin/attributes/{kind}/{id}",
            put(routes::attributes::update_attribute)
                .delete(routes::attributes::delete_attribute),
        )
        .route(
            "/api/admin/knowledge",
            get(routes::knowledge::admin_list_articles).post(routes::knowledge::create_article),
        )
        .route(
            "/api/admin/knowledge/{id}",
            put(routes::knowledge::update_article).delete(routes::knowledge::delete_article),
        )
        // Uploaded attachments
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
