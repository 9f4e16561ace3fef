//! Conversions from port and rule errors into domain [`Error`]s.
//!
//! Connection failures surface as `service_unavailable`; query failures as
//! `internal_error`, whose detail adapters keep server side.

use serde_json::json;

use super::association::{AssociationRefusal, DeassociationRefusal};
use super::error::{Error, FieldErrors};
use super::ledger::LedgerIntegrityError;
use super::ports::{
    AssociationRepositoryError, DocumentStoreError, LedgerRepositoryError, ListWriterError,
    QuotaRepositoryError, RequestRepositoryError, SectionRepositoryError, TaskQueueError,
};
use super::quota::QuotaExceeded;
use super::request::RequestTransitionError;
use super::section::IncompleteReview;

macro_rules! map_repository_error {
    ($error:ident, $label:literal) => {
        impl From<$error> for Error {
            fn from(error: $error) -> Self {
                match error {
                    $error::Connection { message } => Error::service_unavailable(format!(
                        concat!($label, " repository unavailable: {}"),
                        message
                    )),
                    $error::Query { message } => Error::internal(format!(
                        concat!($label, " repository error: {}"),
                        message
                    )),
                }
            }
        }
    };
}

map_repository_error!(SectionRepositoryError, "section");
map_repository_error!(LedgerRepositoryError, "ledger");
map_repository_error!(QuotaRepositoryError, "quota");
map_repository_error!(AssociationRepositoryError, "association");

impl From<RequestRepositoryError> for Error {
    fn from(error: RequestRepositoryError) -> Self {
        match error {
            RequestRepositoryError::Connection { message } => {
                Error::service_unavailable(format!("request repository unavailable: {message}"))
            }
            RequestRepositoryError::Query { message } => {
                Error::internal(format!("request repository error: {message}"))
            }
            RequestRepositoryError::Integrity { violation } => violation.into(),
            RequestRepositoryError::Stale { expected, found } => {
                Error::conflict(format!("request is no longer {expected}")).with_details(json!({
                    "code": "stale_request",
                    "status": found.code(),
                }))
            }
        }
    }
}

impl From<LedgerIntegrityError> for Error {
    fn from(error: LedgerIntegrityError) -> Self {
        let (code, imeis) = match &error {
            LedgerIntegrityError::DuplicatesPresent { imeis } => ("duplicates_present", imeis),
            LedgerIntegrityError::NotRegistered { imeis } => ("not_registered", imeis),
        };
        Error::conflict(error.to_string()).with_details(json!({
            "code": code,
            "imeis": imeis,
        }))
    }
}

impl From<RequestTransitionError> for Error {
    fn from(error: RequestTransitionError) -> Self {
        match &error {
            RequestTransitionError::NotAssignedReviewer { .. } => {
                Error::forbidden(error.to_string())
            }
            RequestTransitionError::NotFailed => Error::not_applicable(error.to_string()),
            RequestTransitionError::InvalidTransition { .. }
            | RequestTransitionError::AlreadyAssigned { .. }
            | RequestTransitionError::ReportNotReady
            | RequestTransitionError::ProcessingNotComplete
            | RequestTransitionError::NotEditable { .. } => Error::conflict(error.to_string()),
        }
    }
}

impl From<IncompleteReview> for Error {
    fn from(error: IncompleteReview) -> Self {
        Error::conflict(error.to_string()).with_details(json!({
            "pendingSections": error.pending,
        }))
    }
}

impl From<QuotaExceeded> for Error {
    fn from(error: QuotaExceeded) -> Self {
        Error::conflict(error.to_string()).with_details(json!({
            "code": "quota_exceeded",
            "requested": error.requested,
            "remaining": error.remaining,
        }))
    }
}

impl From<AssociationRefusal> for Error {
    fn from(error: AssociationRefusal) -> Self {
        match &error {
            AssociationRefusal::NotWhitelisted => Error::not_found(error.to_string()),
            AssociationRefusal::AlreadyAssociated => Error::conflict(error.to_string())
                .with_details(json!({ "code": "already_associated_same_uid" })),
            AssociationRefusal::LimitReached { max } => Error::conflict(error.to_string())
                .with_details(json!({ "code": "uid_limit_reached", "max": max })),
            AssociationRefusal::HeldByOtherUid { held_by } => Error::conflict(error.to_string())
                .with_details(json!({ "code": "already_associated", "heldBy": held_by })),
        }
    }
}

impl From<DeassociationRefusal> for Error {
    fn from(error: DeassociationRefusal) -> Self {
        match error {
            DeassociationRefusal::NotAssociated => Error::not_applicable(error.to_string()),
            DeassociationRefusal::AlreadyClosed => Error::conflict(error.to_string()),
        }
    }
}

impl From<DocumentStoreError> for Error {
    fn from(error: DocumentStoreError) -> Self {
        match &error {
            DocumentStoreError::TooLarge { .. } | DocumentStoreError::InvalidName { .. } => {
                let mut fields = FieldErrors::new();
                fields.insert("file".to_owned(), error.to_string());
                Error::validation(fields)
            }
            DocumentStoreError::NotFound { .. } => Error::not_found(error.to_string()),
            DocumentStoreError::Io { .. } => Error::internal(error.to_string()),
        }
    }
}

impl From<TaskQueueError> for Error {
    fn from(error: TaskQueueError) -> Self {
        match &error {
            TaskQueueError::AlreadyRunning { .. } => Error::conflict(error.to_string()),
            TaskQueueError::WaitTimedOut { .. } => Error::service_unavailable(error.to_string()),
        }
    }
}

impl From<ListWriterError> for Error {
    fn from(error: ListWriterError) -> Self {
        Error::internal(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::domain::ErrorCode;

    #[rstest]
    #[case(DeassociationRefusal::NotAssociated, ErrorCode::NotApplicable)]
    #[case(DeassociationRefusal::AlreadyClosed, ErrorCode::Conflict)]
    fn deassociation_outcomes_stay_distinct(
        #[case] refusal: DeassociationRefusal,
        #[case] code: ErrorCode,
    ) {
        assert_eq!(Error::from(refusal).code(), code);
    }

    #[rstest]
    fn same_and_other_uid_conflicts_differ() {
        let same = Error::from(AssociationRefusal::AlreadyAssociated);
        let other = Error::from(AssociationRefusal::HeldByOtherUid {
            held_by: vec!["uid-a".to_owned()],
        });
        assert_eq!(same.code(), ErrorCode::Conflict);
        assert_eq!(other.code(), ErrorCode::Conflict);
        assert_ne!(same.details(), other.details());
    }

    #[rstest]
    fn connection_failures_are_unavailable() {
        let err = Error::from(LedgerRepositoryError::connection("pool exhausted"));
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
    }

    #[rstest]
    fn integrity_violations_are_conflicts_with_imeis() {
        let err = Error::from(RequestRepositoryError::integrity(
            LedgerIntegrityError::NotRegistered {
                imeis: vec!["35678901000001".to_owned()],
            },
        ));
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(
            err.details().and_then(|d| d.get("code")),
            Some(&json!("not_registered"))
        );
    }
}
