//! Compliance summary computed asynchronously for each request.

use serde::{Deserialize, Serialize};

/// Counters describing how much of a batch is non-compliant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceSummary {
    /// Number of normalised IMEIs checked.
    pub total_imeis: usize,
    /// IMEIs the compliance service flags as non-compliant.
    pub non_compliant: usize,
    /// IMEIs reported stolen.
    pub stolen: usize,
    /// IMEIs already held by another request's ledger entry.
    pub duplicate: usize,
}

impl ComplianceSummary {
    /// Whether every non-compliance counter is zero.
    ///
    /// # Examples
    /// ```
    /// use imei_registry::domain::ComplianceSummary;
    ///
    /// let summary = ComplianceSummary { total_imeis: 4, ..ComplianceSummary::default() };
    /// assert!(summary.is_clean());
    /// ```
    pub fn is_clean(&self) -> bool {
        self.non_compliant == 0 && self.stolen == 0 && self.duplicate == 0
    }
}
