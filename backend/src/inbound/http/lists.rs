//! List generation handler.
//!
//! ```text
//! POST /api/v1/lists/{kind}   generate a full or delta list
//! ```

use actix_web::{HttpResponse, post, web};

use crate::inbound::http::ApiResult;
use crate::inbound::http::identity::Caller;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{FieldName, parse_list_kind};

/// Generate a list; `204 No Content` when nothing is eligible.
#[post("/lists/{kind}")]
pub async fn generate_list(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    caller.require_reviewer()?;
    let kind = parse_list_kind(&path, FieldName::new("kind"))?;
    Ok(match state.services.lists.generate(kind).await? {
        Some(report) => HttpResponse::Created().json(report),
        None => HttpResponse::NoContent().finish(),
    })
}
