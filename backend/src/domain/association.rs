//! Associations between approved IMEIs and subscriber UIDs.
//!
//! An association is a validity window: it opens when created and closes when
//! `end_date` is set. Records are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::imei::NormalizedImei;

/// One IMEI-to-UID validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationRecord {
    pub id: Uuid,
    pub imei: NormalizedImei,
    pub uid: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// Set when the IMEI is shared between several UIDs.
    pub duplicate: bool,
    pub exported: bool,
    pub exported_at: Option<DateTime<Utc>>,
}

impl AssociationRecord {
    /// Open a window starting at `now`.
    pub fn open(imei: NormalizedImei, uid: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            imei,
            uid: uid.into(),
            start_date: now,
            end_date: None,
            duplicate: false,
            exported: false,
            exported_at: None,
        }
    }

    /// Whether the window is still open.
    pub fn is_active(&self) -> bool {
        self.end_date.is_none()
    }
}

/// Association limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationPolicy {
    /// Maximum concurrently associated devices per UID.
    pub max_devices_per_uid: usize,
    /// Whether an IMEI held by another UID may be shared after confirmation.
    pub grace_period: bool,
}

impl Default for AssociationPolicy {
    fn default() -> Self {
        Self {
            max_devices_per_uid: 5,
            grace_period: false,
        }
    }
}

/// State the association rules are evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationContext {
    /// Whether the IMEI has a `whitelist` ledger entry.
    pub imei_whitelisted: bool,
    /// Open windows for the IMEI under any UID.
    pub active_for_imei: Vec<AssociationRecord>,
    /// Number of open windows held by the requesting UID.
    pub active_for_uid: usize,
}

/// What an association request leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationDecision {
    /// Open a new window.
    Create,
    /// The IMEI is held by other UIDs; the caller must confirm sharing it.
    ConfirmDuplicate { held_by: Vec<String> },
}

/// Reasons an association is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssociationRefusal {
    #[error("IMEI is not registered")]
    NotWhitelisted,
    #[error("IMEI is already associated with this UID")]
    AlreadyAssociated,
    #[error("UID already has the maximum of {max} associated devices")]
    LimitReached { max: usize },
    #[error("IMEI is already associated with another UID")]
    HeldByOtherUid { held_by: Vec<String> },
}

/// Apply the association rules for `uid`.
///
/// # Examples
/// ```
/// use imei_registry::domain::{
///     AssociationContext, AssociationDecision, AssociationPolicy, evaluate_association,
/// };
///
/// let context = AssociationContext { imei_whitelisted: true, ..AssociationContext::default() };
/// let decision = evaluate_association(AssociationPolicy::default(), "uid-1", &context);
/// assert_eq!(decision, Ok(AssociationDecision::Create));
/// ```
pub fn evaluate_association(
    policy: AssociationPolicy,
    uid: &str,
    context: &AssociationContext,
) -> Result<AssociationDecision, AssociationRefusal> {
    if !context.imei_whitelisted {
        return Err(AssociationRefusal::NotWhitelisted);
    }
    if context
        .active_for_imei
        .iter()
        .any(|record| record.uid == uid)
    {
        return Err(AssociationRefusal::AlreadyAssociated);
    }
    if context.active_for_uid >= policy.max_devices_per_uid {
        return Err(AssociationRefusal::LimitReached {
            max: policy.max_devices_per_uid,
        });
    }
    if context.active_for_imei.is_empty() {
        return Ok(AssociationDecision::Create);
    }

    let held_by: Vec<String> = context
        .active_for_imei
        .iter()
        .map(|record| record.uid.clone())
        .collect();
    if policy.grace_period {
        Ok(AssociationDecision::ConfirmDuplicate { held_by })
    } else {
        Err(AssociationRefusal::HeldByOtherUid { held_by })
    }
}

/// Reasons a de-association does not apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeassociationRefusal {
    /// The pair was never associated.
    #[error("IMEI is not associated with this UID")]
    NotAssociated,
    /// The pair's latest window is already closed.
    #[error("association is already closed")]
    AlreadyClosed,
}

/// Pick the open window to close from the pair's history.
pub fn window_to_close(
    history: &[AssociationRecord],
) -> Result<&AssociationRecord, DeassociationRefusal> {
    if history.is_empty() {
        return Err(DeassociationRefusal::NotAssociated);
    }
    history
        .iter()
        .find(|record| record.is_active())
        .ok_or(DeassociationRefusal::AlreadyClosed)
}

#[cfg(test)]
mod tests {
    //! Regression coverage for association rules.

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn imei() -> NormalizedImei {
        NormalizedImei::parse("35678901000001").expect("valid IMEI")
    }

    fn held_by(imei: &NormalizedImei, uid: &str) -> AssociationContext {
        AssociationContext {
            imei_whitelisted: true,
            active_for_imei: vec![AssociationRecord::open(imei.clone(), uid, Utc::now())],
            active_for_uid: 0,
        }
    }

    #[rstest]
    fn unregistered_imeis_are_refused() {
        let result = evaluate_association(
            AssociationPolicy::default(),
            "uid-a",
            &AssociationContext::default(),
        );
        assert_eq!(result, Err(AssociationRefusal::NotWhitelisted));
    }

    #[rstest]
    fn same_pair_is_a_conflict(imei: NormalizedImei) {
        let result = evaluate_association(
            AssociationPolicy::default(),
            "uid-a",
            &held_by(&imei, "uid-a"),
        );
        assert_eq!(result, Err(AssociationRefusal::AlreadyAssociated));
    }

    #[rstest]
    #[case(false, Err(AssociationRefusal::HeldByOtherUid { held_by: vec!["uid-a".to_owned()] }))]
    #[case(true, Ok(AssociationDecision::ConfirmDuplicate { held_by: vec!["uid-a".to_owned()] }))]
    fn other_uid_depends_on_grace_period(
        imei: NormalizedImei,
        #[case] grace_period: bool,
        #[case] expected: Result<AssociationDecision, AssociationRefusal>,
    ) {
        let policy = AssociationPolicy {
            max_devices_per_uid: 5,
            grace_period,
        };
        assert_eq!(
            evaluate_association(policy, "uid-b", &held_by(&imei, "uid-a")),
            expected
        );
    }

    #[rstest]
    fn uid_limit_is_enforced() {
        let context = AssociationContext {
            imei_whitelisted: true,
            active_for_imei: Vec::new(),
            active_for_uid: 2,
        };
        let policy = AssociationPolicy {
            max_devices_per_uid: 2,
            grace_period: false,
        };
        assert_eq!(
            evaluate_association(policy, "uid-a", &context),
            Err(AssociationRefusal::LimitReached { max: 2 })
        );
    }

    #[rstest]
    fn closing_distinguishes_missing_from_closed(imei: NormalizedImei) {
        assert_eq!(
            window_to_close(&[]),
            Err(DeassociationRefusal::NotAssociated)
        );

        let mut closed = AssociationRecord::open(imei, "uid-a", Utc::now());
        closed.end_date = Some(Utc::now());
        assert_eq!(
            window_to_close(std::slice::from_ref(&closed)),
            Err(DeassociationRefusal::AlreadyClosed)
        );
    }
}
