//! Diesel table definitions for the registry schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// Registration and de-registration requests.
    requests (id) {
        id -> Uuid,
        tracking_id -> Uuid,
        /// `registration` or `de_registration`.
        kind -> Varchar,
        submitter_id -> Varchar,
        submitter_name -> Varchar,
        reviewer_id -> Nullable<Varchar>,
        reviewer_name -> Nullable<Varchar>,
        /// Numeric case status code (1-8).
        case_status -> Int2,
        processing_status -> Varchar,
        report_status -> Varchar,
        device_count -> Int8,
        imeis_per_device -> Int8,
        reason -> Nullable<Text>,
        file_name -> Varchar,
        summary -> Nullable<Jsonb>,
        report -> Nullable<Text>,
        report_visible -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// One device model (TAC) per request.
    devices (id) {
        id -> Uuid,
        request_id -> Uuid,
        tac -> Varchar,
        brand -> Varchar,
        model -> Varchar,
        model_number -> Varchar,
        manufacturer -> Varchar,
        operating_system -> Varchar,
        device_type -> Varchar,
        radio_interface -> Varchar,
        device_count -> Int8,
    }
}

diesel::table! {
    /// IMEIs submitted for a device, in file order.
    device_imeis (id) {
        id -> Uuid,
        device_id -> Uuid,
        request_id -> Uuid,
        position -> Int4,
        raw -> Varchar,
        normalized -> Varchar,
        duplicate -> Bool,
    }
}

diesel::table! {
    /// Current status of each reviewed section.
    review_sections (request_id, section_type) {
        request_id -> Uuid,
        section_type -> Varchar,
        status -> Int2,
    }
}

diesel::table! {
    /// Append-only reviewer comments per section.
    section_comments (id) {
        id -> Uuid,
        request_id -> Uuid,
        section_type -> Varchar,
        reviewer_id -> Varchar,
        reviewer_name -> Varchar,
        comment -> Text,
        status -> Int2,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Approved-IMEI ledger.
    ledger_entries (id) {
        id -> Uuid,
        imei -> Varchar,
        request_id -> Uuid,
        status -> Varchar,
        delta -> Varchar,
        exported -> Bool,
        exported_at -> Nullable<Timestamptz>,
        removed -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Remaining registration allowances per user.
    device_quotas (user_id) {
        user_id -> Varchar,
        registration_remaining -> Int8,
        deregistration_remaining -> Int8,
    }
}

diesel::table! {
    /// IMEI-to-UID association windows.
    imei_associations (id) {
        id -> Uuid,
        imei -> Varchar,
        uid -> Varchar,
        start_date -> Timestamptz,
        end_date -> Nullable<Timestamptz>,
        duplicate -> Bool,
        exported -> Bool,
        exported_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(devices -> requests (request_id));
diesel::joinable!(device_imeis -> devices (device_id));
diesel::joinable!(review_sections -> requests (request_id));
diesel::joinable!(ledger_entries -> requests (request_id));

diesel::allow_tables_to_appear_in_same_query!(
    requests,
    devices,
    device_imeis,
    review_sections,
    section_comments,
    ledger_entries,
    device_quotas,
    imei_associations,
);
