//! HTTP inbound adapter exposing the registry's REST endpoints.
//!
//! Handlers are thin: they parse payloads, resolve the [`identity::Caller`],
//! call one domain service, and map the result to JSON.

use actix_web::web;

use crate::domain::ports::MAX_DOCUMENT_BYTES;

pub mod associations;
pub mod error;
pub mod health;
pub mod identity;
pub mod lists;
pub mod requests;
pub mod reviews;
pub mod state;
pub(crate) mod validation;

pub use crate::domain::ApiResult;

/// Inline IMEI files are JSON strings, so allow for escaping overhead.
const JSON_LIMIT: usize = MAX_DOCUMENT_BYTES * 2;

/// Register every `/api/v1` handler and body limits.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(JSON_LIMIT))
        .app_data(web::PayloadConfig::new(MAX_DOCUMENT_BYTES))
        .service(requests::create_request)
        .service(requests::search_requests)
        .service(requests::get_request)
        .service(requests::resubmit_request)
        .service(requests::update_reason)
        .service(requests::list_documents)
        .service(requests::upload_document)
        .service(requests::close_request)
        .service(requests::assign_reviewer)
        .service(requests::unassign_reviewer)
        .service(requests::set_report_visibility)
        .service(requests::restart_processing)
        .service(requests::dashboard)
        .service(reviews::list_sections)
        .service(reviews::submit_section_review)
        .service(reviews::submit_final_review)
        .service(associations::associate)
        .service(associations::deassociate)
        .service(lists::generate_list);
}
