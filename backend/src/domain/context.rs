//! Explicit dependency context shared by the domain services.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;

use super::association::AssociationPolicy;
use super::ports::{
    AssociationRepository, AuditEntry, AuditSink, ComplianceChecker, DeviceDatabase,
    DocumentStore, LedgerRepository, ListWriter, NotificationSink, QuotaRepository,
    RequestRepository, SectionRepository, TaskQueue,
};
use super::quota::QuotaDefaults;

/// Tunable behaviour of the registry workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryPolicy {
    /// Settle requests from their compliance summary without a reviewer.
    pub automated_decision: bool,
    pub association: AssociationPolicy,
    pub quota_defaults: QuotaDefaults,
    /// Upper bound on one processing and summary run.
    pub summary_timeout: Duration,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            automated_decision: false,
            association: AssociationPolicy::default(),
            quota_defaults: QuotaDefaults::default(),
            summary_timeout: Duration::from_secs(300),
        }
    }
}

/// Adapters and policy handed to every service.
#[derive(Clone)]
pub struct ServiceContext {
    pub requests: Arc<dyn RequestRepository>,
    pub sections: Arc<dyn SectionRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub quotas: Arc<dyn QuotaRepository>,
    pub associations: Arc<dyn AssociationRepository>,
    pub device_database: Arc<dyn DeviceDatabase>,
    pub compliance: Arc<dyn ComplianceChecker>,
    pub notifications: Arc<dyn NotificationSink>,
    pub audit: Arc<dyn AuditSink>,
    pub documents: Arc<dyn DocumentStore>,
    pub tasks: Arc<dyn TaskQueue>,
    pub lists: Arc<dyn ListWriter>,
    pub clock: Arc<dyn Clock>,
    pub policy: RegistryPolicy,
}

impl ServiceContext {
    /// Current time from the injected clock.
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.utc()
    }

    /// Forward an entry to the audit sink.
    pub fn audit(&self, entry: AuditEntry) {
        self.audit.record(&entry);
    }
}
