//! Driven port for the compliance service behind request summaries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::NormalizedImei;

use super::define_port_error;

/// IMEIs to check, correlated with the owning request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceQuery {
    /// Tracking id propagated to the service for correlation.
    pub correlation_id: Uuid,
    pub imeis: Vec<NormalizedImei>,
}

/// Counters reported by the compliance service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub non_compliant: usize,
    pub stolen: usize,
    /// Reference to the detailed report, when the service produced one.
    pub report: Option<String>,
}

define_port_error! {
    /// Errors surfaced by the compliance service.
    pub enum ComplianceCheckerError {
        /// Network transport failed before receiving a response.
        Transport { message: String } =>
            "compliance service transport failed: {message}",
        /// The service answered with an error status.
        Status { status: u16, message: String } =>
            "compliance service returned status {status}: {message}",
        /// The response body could not be decoded.
        Decode { message: String } =>
            "compliance service response decode failed: {message}",
    }
}

/// Port for checking a batch of IMEIs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComplianceChecker: Send + Sync {
    /// Check every IMEI in the query.
    async fn check(&self, query: &ComplianceQuery)
    -> Result<ComplianceVerdict, ComplianceCheckerError>;
}

/// Fixture implementation reporting every batch as compliant.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureComplianceChecker;

#[async_trait]
impl ComplianceChecker for FixtureComplianceChecker {
    async fn check(
        &self,
        _query: &ComplianceQuery,
    ) -> Result<ComplianceVerdict, ComplianceCheckerError> {
        Ok(ComplianceVerdict::default())
    }
}
