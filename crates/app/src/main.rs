mod actions;
mod auth;
mod effects;
mod executor;
mod pipeline;
mod problem;
mod router;
mod session;
mod submission;
mod telemetry;

use std::net::SocketAddr;

use chrono::Utc;
use tracing::{info, warn};

use payboard_storage::Database;
use payboard_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    if config.session.fallback_secret {
        warn!(stage = "app", "SESSION_SECRET is not set; using the development secret");
    }

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;

    let purged = database.sessions().purge_expired(Utc::now()).await?;
    info!(stage = "app", purged, "expired sessions removed");

    if let Some(operator) = &config.bootstrap_operator {
        let created = auth::seed_operator(
            &database.operators(),
            &operator.name,
            &operator.email,
            &operator.password,
            Utc::now(),
        )
        .await?;
        info!(stage = "auth", created, email = %operator.email, "bootstrap operator checked");
    }

    let state = router::AppState::new(
        metrics,
        &database,
        &config.session,
        config.environment.is_production(),
    );

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| err.into())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(stage = "app", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(stage = "app", "shutdown signal received");
}
