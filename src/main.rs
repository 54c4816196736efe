use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use modehaus::api::{build_app, default_rate_limit_state, AppState};
use modehaus::bus::EventBus;
use modehaus::config;
use modehaus::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(config::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = db::PoolConfig::from_app_config(&config);
    let pool = db::connect_pool(&config.database_url, pool_config).await?;
    db::run_migrations(&pool).await?;

    let bus = EventBus::connect(config.nats_url.as_deref()).await;

    if config.admin.is_none() {
        tracing::warn!(
            env = ?config.env,
            "SHOP_ADMIN_USER is not set; the admin API is open without login"
        );
    }

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let app = build_app(
        AppState::new(pool, Arc::clone(&config), bus),
        default_rate_limit_state().with_trusted_proxies(config.trusted_proxies.clone()),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "modehaus listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
