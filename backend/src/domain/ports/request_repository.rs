//! Port for request, device, and disposition persistence.

use std::collections::BTreeMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    CaseStatus, Device, DeviceDescription, LedgerIntegrityError, LedgerIntent, QuotaDebit,
    Request, RequestPage, RequestSearch, Tac,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by request repository adapters.
    pub enum RequestRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "request repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "request repository query failed: {message}",
        /// A disposition would break ledger integrity; nothing was written.
        Integrity { violation: LedgerIntegrityError } =>
            "ledger integrity violation: {violation}",
        /// The stored request left the status the change was planned from.
        Stale { expected: CaseStatus, found: CaseStatus } =>
            "request moved from {expected} to {found} concurrently",
    }
}

/// Everything a disposition writes, applied in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispositionCommit {
    /// Request with its new case status.
    pub request: Request,
    /// Stored status the change was planned from. The commit fails with
    /// [`RequestRepositoryError::Stale`] when the row no longer holds it.
    pub expected_status: CaseStatus,
    /// Ledger change planned against the rows current at commit time.
    pub ledger: Option<LedgerIntent>,
    /// Quota decrement for approvals.
    pub quota: Option<QuotaDebit>,
}

/// Device identity used when joining ledger entries to metadata.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceKey {
    /// Request owning the device.
    pub request_id: Uuid,
    /// Device TAC.
    pub tac: Tac,
}

/// Port for reading and writing requests and their devices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Insert or overwrite a request.
    async fn save(&self, request: &Request) -> Result<(), RequestRepositoryError>;

    /// Find a request by id.
    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Request>, RequestRepositoryError>;

    /// Replace every device (and IMEI) of a request.
    async fn replace_devices(
        &self,
        request_id: &Uuid,
        devices: &[Device],
    ) -> Result<(), RequestRepositoryError>;

    /// Devices of a request with their IMEIs.
    async fn devices(&self, request_id: &Uuid) -> Result<Vec<Device>, RequestRepositoryError>;

    /// Device descriptions for ledger rows.
    async fn device_descriptions(
        &self,
        keys: &[DeviceKey],
    ) -> Result<BTreeMap<DeviceKey, DeviceDescription>, RequestRepositoryError>;

    /// Run a paged search.
    async fn search(&self, search: &RequestSearch) -> Result<RequestPage, RequestRepositoryError>;

    /// Per-status request counts for one submitter.
    async fn count_by_status(
        &self,
        submitter_id: &str,
    ) -> Result<BTreeMap<CaseStatus, i64>, RequestRepositoryError>;

    /// Atomically save a disposition with its ledger and quota effects.
    ///
    /// The request row is locked and its status re-checked first, so two
    /// racing commits for one request apply at most once.
    async fn commit_disposition(
        &self,
        commit: &DispositionCommit,
    ) -> Result<(), RequestRepositoryError>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn integrity_error_names_the_violation() {
        let err = RequestRepositoryError::integrity(LedgerIntegrityError::NotRegistered {
            imeis: vec!["35678901000001".to_owned()],
        });
        assert_eq!(
            err.to_string(),
            "ledger integrity violation: 1 IMEI(s) are not registered"
        );
    }

    #[rstest]
    fn stale_error_names_both_statuses() {
        let err = RequestRepositoryError::stale(CaseStatus::InReview, CaseStatus::Approved);
        assert_eq!(
            err.to_string(),
            "request moved from In Review to Approved concurrently"
        );
    }
}
