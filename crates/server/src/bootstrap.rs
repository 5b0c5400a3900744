use std::sync::Arc;

use merit_core::config::{AppConfig, ConfigError, LoadOptions};
use merit_db::repositories::SqlNotifier;
use merit_db::{connect_with_settings, migrations, DbPool};
use merit_workflow::{Stores, TracingAuditSink, WorkflowServices};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub services: WorkflowServices,
    pub inbox: SqlNotifier,
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState::new(self.services.clone(), Some(self.inbox.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, migrates and wires the services over SQLite, with the inbox table as notifier.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
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

    let inbox = SqlNotifier::new(db_pool.clone());
    let stores =
        Stores::sqlite(db_pool.clone(), Arc::new(inbox.clone()), Arc::new(TracingAuditSink));
    let services = WorkflowServices::new(stores, &config.workflow);
    info!(
        event_name = "system.bootstrap.services_ready",
        correlation_id = "bootstrap",
        admin_role = %config.workflow.admin_role,
        "workflow services wired"
    );

    Ok(Application { config, db_pool, services, inbox })
}
