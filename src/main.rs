use anyhow::Context;
use kytapay_webhook::api::{self, AppState};
use kytapay_webhook::config::Config;
use kytapay_webhook::database::{self, pg_store::PgStore, PoolConfig};
use kytapay_webhook::notify::{LogNotifier, Notifier, TelegramNotifier};
use kytapay_webhook::payments::types::Provider;
use kytapay_webhook::payments::{CallbackDispatcher, FeeCalculator, Reconciler};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging; LOG_FORMAT=json switches to one JSON object per line
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting KytaPay webhook service");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!(
        "PakaiLink signature verification: {}",
        if config.pakailink.require_signature { "required" } else { "disabled" }
    );

    let verifier = config.signature_verifier()?;

    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        ..PoolConfig::default()
    };
    let pool = database::init_pool(&config.database.url, Some(pool_config))
        .await
        .context("Failed to connect to database")?;
    database::health_check(&pool)
        .await
        .context("Database health check failed")?;
    let store = Arc::new(PgStore::new(pool));

    let notifier: Arc<dyn Notifier> = match config.telegram.credentials() {
        Some((token, chat_id)) => Arc::new(
            TelegramNotifier::new(token, chat_id, config.http.notify_timeout())
                .context("Failed to build Telegram client")?,
        ),
        None => {
            tracing::warn!("Telegram is not configured, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let fees = FeeCalculator::new(store.clone());
    let dispatcher = CallbackDispatcher::new(store.clone(), config.http.callback_timeout())
        .context("Failed to build merchant callback client")?;
    let reconciler = Arc::new(Reconciler::new(store, fees, dispatcher, notifier.clone()));

    let state = AppState::new(
        reconciler,
        verifier,
        notifier,
        [
            config.provider_profile(Provider::LinkQu),
            config.provider_profile(Provider::PakaiLink),
        ],
    );
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST and WEBHOOK_PORT must form a valid socket address")?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
