use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use helpdesk_api::config::Config;
use helpdesk_api::services::email::EmailService;
use helpdesk_api::services::jobs;
use helpdesk_api::services::tokens::TokenAuthority;
use helpdesk_api::{app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let email = EmailService::new(&config);
    if email.is_none() {
        tracing::warn!("SMTP not configured, outbound email is disabled");
    }

    let tokens = TokenAuthority::new(config.jwt_secret.as_deref());

    let state = AppState {
        db: pool,
        config: Arc::new(config.clone()),
        tokens: Arc::new(tokens),
        email,
    };

    jobs::spawn(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {addr}");
    axum::serve(listener, app(state)).await?;

    Ok(())
}
