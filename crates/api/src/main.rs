use anyhow::Context;

use stockledger_api::config::ApiConfig;
use stockledger_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockledger_observability::init();

    let config = ApiConfig::from_env()?;
    let engine_config = EngineConfig::from_env();
    if config.database_url.is_none() {
        tracing::warn!("DATABASE_URL not set; using the in-memory store");
    }

    let services = stockledger_api::app::services::build_services(&config, engine_config).await?;
    let app = stockledger_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
