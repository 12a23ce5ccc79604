use std::sync::Arc;
use std::time::Duration;

use tacoexpress_core::config::{AppConfig, ConfigError, LoadOptions};
use tacoexpress_core::identity::IdentitySigner;
use tacoexpress_core::pricing::FlatFeePricingEngine;
use tacoexpress_core::retry::retry_with_backoff;
use tacoexpress_db::{connect_with_settings, migrations, DbPool, SqlOrderRepository};
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog_client::HttpCatalogLookup;
use crate::orchestrator::{OrchestratorSettings, OrderOrchestrator};
use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("catalog client could not be built: {0}")]
    CatalogClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let retry = config.startup_retry_policy();

    let db_pool = retry_with_backoff(&retry, "database", |_attempt| {
        connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
    })
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let lookup_timeout = Duration::from_secs(config.catalog.timeout_secs);
    let catalog = HttpCatalogLookup::new(&config.catalog.base_url, lookup_timeout)
        .map_err(BootstrapError::CatalogClient)?;
    spawn_catalog_probe(catalog.clone(), config.clone());

    let pricing = Arc::new(FlatFeePricingEngine::new(config.pricing_policy()));
    let orchestrator = OrderOrchestrator::new(
        Arc::new(catalog),
        pricing.clone(),
        Arc::new(SqlOrderRepository::new(db_pool.clone())),
        OrchestratorSettings { lookup_timeout, max_items: config.orders.max_items },
    );
    let signer = IdentitySigner::new(config.auth.signing_secret.clone());

    let state =
        AppState { orchestrator: Arc::new(orchestrator), pricing, signer: Arc::new(signer) };

    Ok(Application { config, db_pool, state })
}

/// The catalog is not required to accept traffic; readiness is only logged.
fn spawn_catalog_probe(catalog: HttpCatalogLookup, config: AppConfig) {
    tokio::spawn(async move {
        let retry = config.startup_retry_policy();
        match retry_with_backoff(&retry, "catalog", |_attempt| catalog.probe()).await {
            Ok(()) => info!(
                event_name = "system.bootstrap.catalog_ready",
                correlation_id = "bootstrap",
                catalog_url = catalog.base_url(),
                "catalog service reachable"
            ),
            Err(error) => warn!(
                event_name = "system.bootstrap.catalog_unreachable",
                correlation_id = "bootstrap",
                catalog_url = catalog.base_url(),
                error = %error,
                "catalog service not reachable; order creation will fail until it is"
            ),
        }
    });
}
