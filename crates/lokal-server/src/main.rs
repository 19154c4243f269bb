use anyhow::{Context, Result};
use lokal_db::{create_pool, run_migrations};
use lokal_server::config::load_config;
use lokal_server::notify::Notifier;
use lokal_server::profiles::seed_initial_admin;
use lokal_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Lokal server");

    let config_path =
        std::env::var("LOKAL_CONFIG").unwrap_or_else(|_| "server-config.yaml".to_string());
    tracing::info!("Loading config from: {}", config_path);
    let config = load_config(&config_path)?;

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.db.url, config.db.max_connections)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Running database migrations...");
    run_migrations(&pool).await?;

    if let Some(admin) = &config.auth.initial_admin {
        if let Err(e) = seed_initial_admin(&pool, admin).await {
            tracing::warn!("Failed to seed initial admin: {:#}", e);
        }
    }

    let notifier = Notifier::from_config(&config.notifications);
    let channels = notifier.channels();
    if channels.is_empty() {
        tracing::info!("Notifications disabled");
    } else {
        tracing::info!("Notification channels: {}", channels.join(", "));
    }

    let listen = config.listen.clone();
    let state = AppState::new(pool, config, notifier);
    let app = lokal_server::web::build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind to {}", listen))?;

    tracing::info!("Server listening on {}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping...");
}
