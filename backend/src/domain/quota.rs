//! Per-user device quotas.
//!
//! Quotas are plain counters. Approval checks the remaining allowance and then
//! decrements it; the decrement is never clamped, so concurrent approvals may
//! drive a counter negative.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::request::RequestKind;

/// Allowances given to a user on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDefaults {
    /// IMEIs a user may register.
    pub registration: i64,
    /// IMEIs a user may de-register.
    pub deregistration: i64,
}

impl Default for QuotaDefaults {
    fn default() -> Self {
        Self {
            registration: 100_000,
            deregistration: 100_000,
        }
    }
}

/// Remaining allowances for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceQuota {
    /// Owner of the quota.
    pub user_id: String,
    /// IMEIs still registrable.
    pub registration_remaining: i64,
    /// IMEIs still de-registrable.
    pub deregistration_remaining: i64,
}

/// Approval would exceed the remaining allowance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} quota exceeded: {requested} IMEI(s) requested, {remaining} remaining")]
pub struct QuotaExceeded {
    /// Allowance that was checked.
    pub kind: RequestKind,
    /// IMEIs the approval needs.
    pub requested: i64,
    /// IMEIs left in the allowance.
    pub remaining: i64,
}

impl DeviceQuota {
    /// Fresh quota seeded from the defaults.
    pub fn new(user_id: impl Into<String>, defaults: QuotaDefaults) -> Self {
        Self {
            user_id: user_id.into(),
            registration_remaining: defaults.registration,
            deregistration_remaining: defaults.deregistration,
        }
    }

    /// Remaining allowance for `kind`.
    pub fn remaining(&self, kind: RequestKind) -> i64 {
        match kind {
            RequestKind::Registration => self.registration_remaining,
            RequestKind::DeRegistration => self.deregistration_remaining,
        }
    }

    /// Verify that `count` IMEIs fit the remaining allowance.
    pub fn check(&self, kind: RequestKind, count: usize) -> Result<(), QuotaExceeded> {
        let requested = i64::try_from(count).unwrap_or(i64::MAX);
        let remaining = self.remaining(kind);
        if requested > remaining {
            return Err(QuotaExceeded {
                kind,
                requested,
                remaining,
            });
        }
        Ok(())
    }

    /// Subtract `count` IMEIs from the allowance for `kind`.
    pub fn decrement(&mut self, kind: RequestKind, count: usize) {
        let amount = i64::try_from(count).unwrap_or(i64::MAX);
        let slot = match kind {
            RequestKind::Registration => &mut self.registration_remaining,
            RequestKind::DeRegistration => &mut self.deregistration_remaining,
        };
        *slot = slot.saturating_sub(amount);
    }
}

/// Quota change applied atomically with a disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDebit {
    /// Owner of the quota.
    pub user_id: String,
    /// Allowance to debit.
    pub kind: RequestKind,
    /// Distinct IMEIs approved.
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn quota(registration: i64, deregistration: i64) -> DeviceQuota {
        DeviceQuota::new(
            "user-1",
            QuotaDefaults {
                registration,
                deregistration,
            },
        )
    }

    #[rstest]
    fn decrement_targets_the_matching_counter() {
        let mut quota = quota(10, 5);
        quota.decrement(RequestKind::Registration, 4);
        quota.decrement(RequestKind::DeRegistration, 2);
        assert_eq!(quota.registration_remaining, 6);
        assert_eq!(quota.deregistration_remaining, 3);
    }

    #[rstest]
    #[case(10, 10, true)]
    #[case(10, 11, false)]
    #[case(0, 1, false)]
    fn check_compares_against_remaining(
        #[case] remaining: i64,
        #[case] requested: usize,
        #[case] fits: bool,
    ) {
        assert_eq!(
            quota(remaining, 0)
                .check(RequestKind::Registration, requested)
                .is_ok(),
            fits
        );
    }

    #[rstest]
    fn decrement_is_not_clamped() {
        let mut quota = quota(1, 0);
        quota.decrement(RequestKind::Registration, 3);
        assert_eq!(quota.registration_remaining, -2);
    }
}
