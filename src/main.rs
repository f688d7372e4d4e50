pub mod attendance;
pub mod auth;
pub mod config;
pub mod courses;
pub mod enrollment;
pub mod err;
pub mod gate;
pub mod models;
pub mod routes;
pub mod store;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use crate::config::AppConfig;
use crate::routes::AppState;
use crate::store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::load().context("failed to load configuration")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.server.log_level.as_str()),
    )
    .init();

    let store = PgStore::connect(&config.database).await?;
    store.migrate().await?;

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address()))?;
    let app = routes::create_router(AppState::new(Arc::new(store), config));

    log::info!("Starting attendance server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
