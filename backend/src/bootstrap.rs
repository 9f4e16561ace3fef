//! Adapter wiring shared by the HTTP service and the command-line tools.

use std::io;
use std::sync::Arc;

use mockable::DefaultClock;
use thiserror::Error;
use tokio::task;
use tracing::info;

use crate::domain::{RegistryServices, ServiceContext};
use crate::outbound::audit::TracingAuditSink;
use crate::outbound::compliance::ComplianceHttpChecker;
use crate::outbound::device_database::DeviceDatabaseHttpClient;
use crate::outbound::files::{CapStdDocumentStore, CsvListWriter};
use crate::outbound::notifications::WebhookNotificationSink;
use crate::outbound::persistence::{
    DbPool, DieselAssociationRepository, DieselLedgerRepository, DieselQuotaRepository,
    DieselRequestRepository, DieselSectionRepository, MigrationError, PoolConfig, PoolError,
    run_pending_migrations,
};
use crate::outbound::queue::TokioTaskQueue;
use crate::settings::{RegistrySettings, SettingsError};

/// Startup failure.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("failed to open {what}: {source}")]
    Storage {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("migration task aborted: {0}")]
    Join(#[from] task::JoinError),
}

/// Wired services plus the pool they share.
pub struct Registry {
    pub services: RegistryServices,
    pub pool: DbPool,
}

/// Apply pending migrations on a blocking thread.
pub async fn migrate(settings: &RegistrySettings) -> Result<usize, BootstrapError> {
    let database_url = settings.database_url()?.to_owned();
    let applied = task::spawn_blocking(move || run_pending_migrations(&database_url)).await??;
    info!(applied, "database schema up to date");
    Ok(applied)
}

/// Build every adapter from `settings` and wire the services over them.
pub async fn connect(settings: &RegistrySettings) -> Result<Registry, BootstrapError> {
    let policy = settings.policy()?;
    let export = settings.export()?;
    let pool = DbPool::new(PoolConfig::new(settings.database_url()?)).await?;

    let documents =
        CapStdDocumentStore::open(&settings.upload_dir()).map_err(|source| {
            BootstrapError::Storage {
                what: "upload directory",
                source,
            }
        })?;
    let lists = CsvListWriter::open(&settings.list_dir()).map_err(|source| {
        BootstrapError::Storage {
            what: "list directory",
            source,
        }
    })?;

    let ctx = Arc::new(ServiceContext {
        requests: Arc::new(DieselRequestRepository::new(pool.clone())),
        sections: Arc::new(DieselSectionRepository::new(pool.clone())),
        ledger: Arc::new(DieselLedgerRepository::new(pool.clone())),
        quotas: Arc::new(DieselQuotaRepository::new(pool.clone())),
        associations: Arc::new(DieselAssociationRepository::new(pool.clone())),
        device_database: Arc::new(DeviceDatabaseHttpClient::new(
            settings.device_database_url()?,
            settings.device_database_timeout(),
        )?),
        compliance: Arc::new(ComplianceHttpChecker::new(
            settings.compliance_url()?,
            settings.compliance_timeout(),
        )?),
        notifications: Arc::new(WebhookNotificationSink::new(
            settings.notification_url()?,
            settings.notification_timeout(),
        )?),
        audit: Arc::new(TracingAuditSink::new()),
        documents: Arc::new(documents),
        tasks: Arc::new(TokioTaskQueue::new()),
        lists: Arc::new(lists),
        clock: Arc::new(DefaultClock),
        policy,
    });

    Ok(Registry {
        services: RegistryServices::new(ctx, export),
        pool,
    })
}
