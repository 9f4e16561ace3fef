//! Shared parsing helpers for inbound HTTP adapters.
//!
//! Each helper turns a malformed value into an `invalid_request` error whose
//! details name the field, the offending value, and a stable code.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{Error, ListKind, RequestKind, SectionType};

/// Validation error codes for HTTP request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidUuid,
    InvalidTimestamp,
    InvalidChoice,
}

impl ErrorCode {
    fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidUuid => "invalid_uuid",
            ErrorCode::InvalidTimestamp => "invalid_timestamp",
            ErrorCode::InvalidChoice => "invalid_choice",
        }
    }
}

/// Newtype wrapper for HTTP field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldName(&'static str);

impl FieldName {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self(name)
    }
}

fn invalid(field: FieldName, message: String, code: ErrorCode, value: &str) -> Error {
    Error::invalid_request(message).with_details(json!({
        "field": field.0,
        "value": value,
        "code": code.as_str(),
    }))
}

pub(crate) fn parse_uuid(value: &str, field: FieldName) -> Result<Uuid, Error> {
    Uuid::parse_str(value).map_err(|_| {
        invalid(
            field,
            format!("{} must be a valid UUID", field.0),
            ErrorCode::InvalidUuid,
            value,
        )
    })
}

pub(crate) fn parse_optional_timestamp(
    value: Option<&str>,
    field: FieldName,
) -> Result<Option<DateTime<Utc>>, Error> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|timestamp| timestamp.with_timezone(&Utc))
                .map_err(|_| {
                    invalid(
                        field,
                        format!("{} must be an RFC 3339 timestamp", field.0),
                        ErrorCode::InvalidTimestamp,
                        raw,
                    )
                })
        })
        .transpose()
}

fn choice_error(field: FieldName, value: &str, choices: &str) -> Error {
    invalid(
        field,
        format!("{} must be one of {choices}", field.0),
        ErrorCode::InvalidChoice,
        value,
    )
}

pub(crate) fn parse_request_kind(value: &str, field: FieldName) -> Result<RequestKind, Error> {
    RequestKind::from_label(value)
        .ok_or_else(|| choice_error(field, value, "registration, de_registration"))
}

pub(crate) fn parse_section_type(value: &str, field: FieldName) -> Result<SectionType, Error> {
    SectionType::from_label(value).ok_or_else(|| {
        choice_error(
            field,
            value,
            "device_quota, device_description, imei_classification, imei_registration, approval_documents",
        )
    })
}

pub(crate) fn parse_list_kind(value: &str, field: FieldName) -> Result<ListKind, Error> {
    match value {
        "full" => Ok(ListKind::Full),
        "delta" => Ok(ListKind::Delta),
        _ => Err(choice_error(field, value, "full, delta")),
    }
}
