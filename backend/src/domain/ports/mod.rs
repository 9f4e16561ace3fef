//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod association_repository;
mod audit_sink;
mod compliance_checker;
mod device_database;
mod document_store;
mod ledger_repository;
mod list_writer;
mod notification_sink;
mod quota_repository;
mod request_repository;
mod section_repository;
mod task_queue;

#[cfg(test)]
pub use association_repository::MockAssociationRepository;
pub use association_repository::{AssociationRepository, AssociationRepositoryError};
#[cfg(test)]
pub use audit_sink::MockAuditSink;
pub use audit_sink::{AuditAction, AuditEntry, AuditSink, FixtureAuditSink};
#[cfg(test)]
pub use compliance_checker::MockComplianceChecker;
pub use compliance_checker::{
    ComplianceChecker, ComplianceCheckerError, ComplianceQuery, ComplianceVerdict,
    FixtureComplianceChecker,
};
#[cfg(test)]
pub use device_database::MockDeviceDatabase;
pub use device_database::{DeviceDatabase, DeviceDatabaseError, FixtureDeviceDatabase};
#[cfg(test)]
pub use document_store::MockDocumentStore;
pub use document_store::{
    DocumentKind, DocumentStore, DocumentStoreError, MAX_DOCUMENT_BYTES, StoredDocument,
    validate_upload,
};
#[cfg(test)]
pub use ledger_repository::MockLedgerRepository;
pub use ledger_repository::{ExportMark, LedgerRepository, LedgerRepositoryError};
#[cfg(test)]
pub use list_writer::MockListWriter;
pub use list_writer::{ListWriter, ListWriterError, list_file_name};
#[cfg(test)]
pub use notification_sink::MockNotificationSink;
pub use notification_sink::{
    FixtureNotificationSink, Notification, NotificationSink, NotificationSinkError,
};
#[cfg(test)]
pub use quota_repository::MockQuotaRepository;
pub use quota_repository::{QuotaRepository, QuotaRepositoryError};
#[cfg(test)]
pub use request_repository::MockRequestRepository;
pub use request_repository::{
    DeviceKey, DispositionCommit, RequestRepository, RequestRepositoryError,
};
#[cfg(test)]
pub use section_repository::MockSectionRepository;
pub use section_repository::{SectionRepository, SectionRepositoryError};
pub use task_queue::{
    CompletionCallback, TaskFuture, TaskJob, TaskOutcome, TaskQueue, TaskQueueError,
};
