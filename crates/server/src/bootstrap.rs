use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokenbot_core::catalog::TokenCatalog;
use tokenbot_core::config::{AppConfig, ConfigError, LoadOptions};
use tokenbot_core::errors::DeliveryError;
use tokenbot_core::notify::NotificationFanout;
use tokenbot_core::queue::BackgroundQueue;
use tokenbot_core::report::ReportService;
use tokenbot_core::store::GrantStore;
use tokenbot_core::validator::GrantValidator;
use tokenbot_core::workflow::GrantService;
use tokenbot_db::{connect_with_config, migrations, DbPool, SqlGrantRepository};
use tokenbot_slack::{
    token_dispatcher, RequestVerifier, SlackApi, SlackApiError, SlackChatDelivery,
    SlackWebClient, UserDirectory,
};
use tracing::info;

use crate::health;
use crate::routes::{self, SlackState};
use crate::service::TokenbotService;
use crate::sinks::{DashboardSink, SpreadsheetSink, DASHBOARD_SINK, SPREADSHEET_SINK};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub queue: BackgroundQueue,
    pub slack: SlackState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("slack client setup failed: {0}")]
    Slack(#[from] SlackApiError),
    #[error("reporting sink setup failed: {0}")]
    Sink(#[from] DeliveryError),
}

impl Application {
    /// Every route the server exposes.
    pub fn router(&self) -> Router {
        routes::router(self.slack.clone())
            .merge(health::router(self.db_pool.clone(), self.queue.clone()))
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let catalog = Arc::new(TokenCatalog::default());
    let calendar = config.organization.calendar();
    let store: Arc<dyn GrantStore> = Arc::new(SqlGrantRepository::new(db_pool.clone()));
    let queue = BackgroundQueue::start();

    let api: Arc<dyn SlackApi> = Arc::new(SlackWebClient::new(
        config.slack.api_base_url.clone(),
        config.slack.bot_token.clone(),
        Duration::from_secs(config.reporting.timeout_secs),
    )?);
    let directory = UserDirectory::new(
        Arc::clone(&api),
        Duration::from_secs(config.slack.directory_ttl_secs),
    );
    let chat = Arc::new(SlackChatDelivery::new(Arc::clone(&api), directory.clone()));

    let fanout = with_sinks(
        NotificationFanout::new(
            chat,
            Arc::clone(&catalog),
            config.organization.announcement_channel.clone(),
        ),
        &config,
    )?
    .with_queue(queue.clone());

    let grants = GrantService::new(
        Arc::clone(&catalog),
        GrantValidator::new(calendar),
        Arc::clone(&store),
        Arc::new(fanout),
    );
    let reports = ReportService::new(Arc::clone(&catalog), calendar, store);
    let service = Arc::new(TokenbotService::new(catalog, grants, reports, api, directory));

    let slack = SlackState {
        dispatcher: Arc::new(token_dispatcher(&config.slack.command, service)),
        verifier: Arc::new(RequestVerifier::new(
            config.slack.verification_token.clone(),
            config.slack.signing_secret.clone(),
        )),
    };

    Ok(Application { config, db_pool, queue, slack })
}

/// Registers the reporting sinks that have an endpoint configured.
fn with_sinks(
    mut fanout: NotificationFanout,
    config: &AppConfig,
) -> Result<NotificationFanout, BootstrapError> {
    let reporting = &config.reporting;
    let timeout = Duration::from_secs(reporting.timeout_secs);

    match &reporting.spreadsheet_url {
        Some(url) => {
            fanout = fanout.with_sink(Arc::new(SpreadsheetSink::new(url.clone(), timeout)?));
        }
        None => info!(
            event_name = "system.bootstrap.sink_disabled",
            correlation_id = "bootstrap",
            sink = SPREADSHEET_SINK,
            "no spreadsheet url configured"
        ),
    }

    match &reporting.dashboard_access_key {
        Some(access_key) => {
            fanout = fanout.with_sink(Arc::new(DashboardSink::new(
                reporting.dashboard_url.clone(),
                access_key.clone(),
                reporting.dashboard_stream.clone(),
                timeout,
            )?));
        }
        None => info!(
            event_name = "system.bootstrap.sink_disabled",
            correlation_id = "bootstrap",
            sink = DASHBOARD_SINK,
            "no dashboard access key configured"
        ),
    }

    Ok(fanout)
}
