//! Internal Diesel row structs.
//!
//! Rows mirror `schema.rs` column for column and never leave the persistence
//! layer; each repository converts them to domain values.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{
    device_imeis, device_quotas, devices, imei_associations, ledger_entries, requests,
    review_sections, section_comments,
};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Row struct for reading from the requests table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RequestRow {
    pub id: Uuid,
    pub tracking_id: Uuid,
    pub kind: String,
    pub submitter_id: String,
    pub submitter_name: String,
    pub reviewer_id: Option<String>,
    pub reviewer_name: Option<String>,
    pub case_status: i16,
    pub processing_status: String,
    pub report_status: String,
    pub device_count: i64,
    pub imeis_per_device: i64,
    pub reason: Option<String>,
    pub file_name: String,
    pub summary: Option<serde_json::Value>,
    pub report: Option<String>,
    pub report_visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insertable row and upsert changeset for a request.
///
/// `None` clears the column on update so an unassigned reviewer is stored
/// as `NULL`.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = requests)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct NewRequestRow<'a> {
    pub id: Uuid,
    pub tracking_id: Uuid,
    pub kind: &'a str,
    pub submitter_id: &'a str,
    pub submitter_name: &'a str,
    pub reviewer_id: Option<&'a str>,
    pub reviewer_name: Option<&'a str>,
    pub case_status: i16,
    pub processing_status: &'a str,
    pub report_status: &'a str,
    pub device_count: i64,
    pub imeis_per_device: i64,
    pub reason: Option<&'a str>,
    pub file_name: &'a str,
    pub summary: Option<serde_json::Value>,
    pub report: Option<&'a str>,
    pub report_visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = devices)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DeviceRow {
    pub id: Uuid,
    pub request_id: Uuid,
    pub tac: String,
    pub brand: String,
    pub model: String,
    pub model_number: String,
    pub manufacturer: String,
    pub operating_system: String,
    pub device_type: String,
    pub radio_interface: String,
    pub device_count: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = device_imeis)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DeviceImeiRow {
    pub id: Uuid,
    pub device_id: Uuid,
    pub request_id: Uuid,
    pub position: i32,
    pub raw: String,
    pub normalized: String,
    pub duplicate: bool,
}

// ---------------------------------------------------------------------------
// Review sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = review_sections)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ReviewSectionRow {
    pub request_id: Uuid,
    pub section_type: String,
    pub status: i16,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = section_comments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct SectionCommentRow {
    pub id: Uuid,
    pub request_id: Uuid,
    pub section_type: String,
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub comment: String,
    pub status: i16,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Ledger row, used for reads, inserts, and full-row upserts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = ledger_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub(crate) struct LedgerEntryRow {
    pub id: Uuid,
    pub imei: String,
    pub request_id: Uuid,
    pub status: String,
    pub delta: String,
    pub exported: bool,
    pub exported_at: Option<DateTime<Utc>>,
    pub removed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Quotas and associations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = device_quotas)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DeviceQuotaRow {
    pub user_id: String,
    pub registration_remaining: i64,
    pub deregistration_remaining: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = imei_associations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AssociationRow {
    pub id: Uuid,
    pub imei: String,
    pub uid: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub duplicate: bool,
    pub exported: bool,
    pub exported_at: Option<DateTime<Utc>>,
}
