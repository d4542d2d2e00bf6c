use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

mod config;
mod database;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use config::AppConfig;
use database::connection::get_db_client;
use database::mongo::MongoRepository;
use database::repository::BookingRepository;
use services::scheduler::spawn_compliance_sweep;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    tracing::info!("⚙️ Config: {}", config.get_config_info());

    let (client, db) = get_db_client(&config)
        .await
        .context("failed to connect to MongoDB")?;

    let store: Arc<dyn BookingRepository> =
        Arc::new(MongoRepository::new(client, db, config.mongo_transactions));
    let state = AppState::new(store.clone(), &config.jwt_secret, config.sweep_policy());

    spawn_compliance_sweep(
        state.sweep.clone(),
        store,
        std::time::Duration::from_secs(config.sweep_interval_secs),
        config.reconcile_every_ticks,
    );

    let app = routes::app_router(state);
    start_server(app, &config).await
}

async fn start_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let ip = config
        .host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("invalid HOST {}", config.host))?;
    let addr = SocketAddr::from((ip, config.port));

    tracing::info!("🚀 Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
