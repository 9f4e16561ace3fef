//! Review sections and the aggregate case disposition.
//!
//! Each request carries one section per applicable [`SectionType`]. A section
//! stores its current status explicitly next to an append-only comment log;
//! the current status always equals the status of the latest comment.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::request::{Actor, CaseStatus, RequestKind};

/// Independent review areas of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    /// Remaining allowance of the submitter.
    DeviceQuota,
    /// Devices declared in the file.
    DeviceDescription,
    /// Compliance classification of the IMEIs.
    ImeiClassification,
    /// Conflicts with IMEIs held by other requests.
    ImeiRegistration,
    /// Supporting documents.
    ApprovalDocuments,
}

const REGISTRATION_SECTIONS: [SectionType; 5] = [
    SectionType::DeviceQuota,
    SectionType::DeviceDescription,
    SectionType::ImeiClassification,
    SectionType::ImeiRegistration,
    SectionType::ApprovalDocuments,
];

const DEREGISTRATION_SECTIONS: [SectionType; 4] = [
    SectionType::DeviceDescription,
    SectionType::ImeiClassification,
    SectionType::ImeiRegistration,
    SectionType::ApprovalDocuments,
];

impl SectionType {
    /// Stable storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeviceQuota => "device_quota",
            Self::DeviceDescription => "device_description",
            Self::ImeiClassification => "imei_classification",
            Self::ImeiRegistration => "imei_registration",
            Self::ApprovalDocuments => "approval_documents",
        }
    }

    /// Parse a storage label.
    pub fn from_label(label: &str) -> Option<Self> {
        REGISTRATION_SECTIONS
            .into_iter()
            .find(|section| section.as_str() == label)
    }

    /// Sections reviewed for a request kind.
    pub fn for_kind(kind: RequestKind) -> &'static [Self] {
        match kind {
            RequestKind::Registration => &REGISTRATION_SECTIONS,
            RequestKind::DeRegistration => &DEREGISTRATION_SECTIONS,
        }
    }

    /// Whether the section applies to a request kind.
    pub fn applies_to(self, kind: RequestKind) -> bool {
        Self::for_kind(kind).contains(&self)
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome a reviewer records on a section. Codes match [`CaseStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// The submitter must supply more information.
    InformationRequested,
    /// The section passes.
    Approved,
    /// The section fails.
    Rejected,
}

impl SectionStatus {
    /// Stored numeric code.
    pub fn code(self) -> i16 {
        self.case_status().code()
    }

    /// Parse a reviewer-supplied code; only 5, 6 and 7 are accepted.
    pub fn from_code(code: i16) -> Option<Self> {
        match CaseStatus::from_code(code)? {
            CaseStatus::InformationRequested => Some(Self::InformationRequested),
            CaseStatus::Approved => Some(Self::Approved),
            CaseStatus::Rejected => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Case status the outcome settles a request into.
    pub fn case_status(self) -> CaseStatus {
        match self {
            Self::InformationRequested => CaseStatus::InformationRequested,
            Self::Approved => CaseStatus::Approved,
            Self::Rejected => CaseStatus::Rejected,
        }
    }
}

/// One entry of a section's comment log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionComment {
    /// Reviewer who wrote the comment.
    pub reviewer: Actor,
    /// Free-text remark.
    pub comment: String,
    /// Outcome recorded with the comment.
    pub status: SectionStatus,
    /// When the comment was recorded.
    pub created_at: DateTime<Utc>,
}

/// Current state of one review section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Which area this section covers.
    pub section_type: SectionType,
    /// Status of the latest comment; `None` until first reviewed.
    pub status: Option<SectionStatus>,
    /// Comment log, oldest first.
    pub comments: Vec<SectionComment>,
}

impl Section {
    /// An unreviewed section.
    pub fn empty(section_type: SectionType) -> Self {
        Self {
            section_type,
            status: None,
            comments: Vec::new(),
        }
    }

    /// Append a comment and move the current status with it.
    pub fn record(&mut self, comment: SectionComment) {
        self.status = Some(comment.status);
        self.comments.push(comment);
    }
}

/// The sections have not all been reviewed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("complete review process before submitting the final review")]
pub struct IncompleteReview {
    /// Applicable sections without a status.
    pub pending: Vec<SectionType>,
}

/// Combine section statuses into one disposition.
///
/// Precedence: any `Rejected` rejects; otherwise all `Approved` approves;
/// otherwise any `InformationRequested` requests information; otherwise the
/// review is incomplete. Sections not applicable to `kind` are ignored.
///
/// # Examples
/// ```
/// use imei_registry::domain::{RequestKind, Section, SectionStatus, SectionType, aggregate};
///
/// let sections: Vec<Section> = SectionType::for_kind(RequestKind::DeRegistration)
///     .iter()
///     .map(|section_type| Section {
///         section_type: *section_type,
///         status: Some(SectionStatus::Approved),
///         comments: Vec::new(),
///     })
///     .collect();
/// assert_eq!(aggregate(RequestKind::DeRegistration, &sections), Ok(SectionStatus::Approved));
/// ```
pub fn aggregate(kind: RequestKind, sections: &[Section]) -> Result<SectionStatus, IncompleteReview> {
    let status_of = |section_type: SectionType| {
        sections
            .iter()
            .find(|section| section.section_type == section_type)
            .and_then(|section| section.status)
    };
    let statuses: Vec<(SectionType, Option<SectionStatus>)> = SectionType::for_kind(kind)
        .iter()
        .map(|section_type| (*section_type, status_of(*section_type)))
        .collect();

    let any = |wanted: SectionStatus| statuses.iter().any(|(_, status)| *status == Some(wanted));

    if any(SectionStatus::Rejected) {
        return Ok(SectionStatus::Rejected);
    }
    if statuses
        .iter()
        .all(|(_, status)| *status == Some(SectionStatus::Approved))
    {
        return Ok(SectionStatus::Approved);
    }
    if any(SectionStatus::InformationRequested) {
        return Ok(SectionStatus::InformationRequested);
    }
    Err(IncompleteReview {
        pending: statuses
            .into_iter()
            .filter(|(_, status)| status.is_none())
            .map(|(section_type, _)| section_type)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    //! Regression coverage for disposition precedence.

    use rstest::rstest;

    use super::*;

    fn sections(statuses: &[Option<SectionStatus>]) -> Vec<Section> {
        REGISTRATION_SECTIONS
            .iter()
            .zip(statuses)
            .map(|(section_type, status)| Section {
                section_type: *section_type,
                status: *status,
                comments: Vec::new(),
            })
            .collect()
    }

    const A: Option<SectionStatus> = Some(SectionStatus::Approved);
    const R: Option<SectionStatus> = Some(SectionStatus::Rejected);
    const I: Option<SectionStatus> = Some(SectionStatus::InformationRequested);

    #[rstest]
    #[case(&[A, A, A, A, A], Ok(SectionStatus::Approved))]
    #[case(&[A, R, I, A, None], Ok(SectionStatus::Rejected))]
    #[case(&[A, A, I, A, A], Ok(SectionStatus::InformationRequested))]
    #[case(&[A, I, None, A, A], Ok(SectionStatus::InformationRequested))]
    fn disposition_precedence(
        #[case] statuses: &[Option<SectionStatus>],
        #[case] expected: Result<SectionStatus, IncompleteReview>,
    ) {
        assert_eq!(
            aggregate(RequestKind::Registration, &sections(statuses)),
            expected
        );
    }

    #[rstest]
    fn unreviewed_sections_block_disposition() {
        let err = aggregate(RequestKind::Registration, &sections(&[A, A, None, A, A]))
            .expect_err("incomplete");
        assert_eq!(err.pending, vec![SectionType::ImeiClassification]);
    }

    #[rstest]
    fn deregistration_ignores_device_quota() {
        let mut all = sections(&[None, A, A, A, A]);
        assert_eq!(
            aggregate(RequestKind::DeRegistration, &all),
            Ok(SectionStatus::Approved)
        );
        all.remove(0);
        assert_eq!(
            aggregate(RequestKind::DeRegistration, &all),
            Ok(SectionStatus::Approved)
        );
    }

    #[rstest]
    #[case(5, Some(SectionStatus::InformationRequested))]
    #[case(6, Some(SectionStatus::Approved))]
    #[case(7, Some(SectionStatus::Rejected))]
    #[case(4, None)]
    #[case(8, None)]
    fn only_review_codes_parse(#[case] code: i16, #[case] expected: Option<SectionStatus>) {
        assert_eq!(SectionStatus::from_code(code), expected);
    }

    #[rstest]
    fn recording_moves_current_status() {
        let mut section = Section::empty(SectionType::DeviceDescription);
        for status in [SectionStatus::InformationRequested, SectionStatus::Approved] {
            section.record(SectionComment {
                reviewer: Actor::new("rev-1", "Reviewer"),
                comment: "checked".to_owned(),
                status,
                created_at: Utc::now(),
            });
        }
        assert_eq!(section.status, Some(SectionStatus::Approved));
        assert_eq!(section.comments.len(), 2);
    }
}
