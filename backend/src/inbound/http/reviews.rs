//! Review HTTP handlers.
//!
//! ```text
//! GET  /api/v1/requests/{id}/sections       sections with comment logs
//! POST /api/v1/requests/{id}/sections       record a section review
//! POST /api/v1/requests/{id}/final-review   settle the request
//! ```

use actix_web::{get, post, web};
use serde::{Deserialize, Serialize};

use crate::domain::{Section, SectionReview};
use crate::inbound::http::ApiResult;
use crate::inbound::http::identity::Caller;
use crate::inbound::http::requests::RequestBody;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{FieldName, parse_section_type, parse_uuid};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionReviewBody {
    pub section_type: String,
    /// 5 (information requested), 6 (approved) or 7 (rejected).
    pub status: i16,
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCommentBody {
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub comment: String,
    pub status: i16,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionBody {
    pub section_type: String,
    pub status: Option<i16>,
    pub comments: Vec<SectionCommentBody>,
}

impl From<Section> for SectionBody {
    fn from(section: Section) -> Self {
        Self {
            section_type: section.section_type.as_str().to_owned(),
            status: section.status.map(|status| status.code()),
            comments: section
                .comments
                .into_iter()
                .map(|comment| SectionCommentBody {
                    reviewer_id: comment.reviewer.id,
                    reviewer_name: comment.reviewer.name,
                    comment: comment.comment,
                    status: comment.status.code(),
                    created_at: comment.created_at.to_rfc3339(),
                })
                .collect(),
        }
    }
}

#[get("/requests/{id}/sections")]
pub async fn list_sections(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
) -> ApiResult<web::Json<Vec<SectionBody>>> {
    caller.require_reviewer()?;
    let id = parse_uuid(&path, FieldName::new("requestId"))?;
    let sections = state.services.reviews.sections(id).await?;
    Ok(web::Json(sections.into_iter().map(SectionBody::from).collect()))
}

#[post("/requests/{id}/sections")]
pub async fn submit_section_review(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
    payload: web::Json<SectionReviewBody>,
) -> ApiResult<web::Json<SectionBody>> {
    let reviewer = caller.require_reviewer()?;
    let id = parse_uuid(&path, FieldName::new("requestId"))?;
    let body = payload.into_inner();
    let section_type = parse_section_type(&body.section_type, FieldName::new("sectionType"))?;
    let section = state
        .services
        .reviews
        .submit_section_review(
            id,
            reviewer,
            SectionReview {
                section_type,
                status_code: body.status,
                comment: body.comment,
            },
        )
        .await?;
    Ok(web::Json(section.into()))
}

/// Aggregate every section and settle the request.
#[post("/requests/{id}/final-review")]
pub async fn submit_final_review(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
) -> ApiResult<web::Json<RequestBody>> {
    let reviewer = caller.require_reviewer()?;
    let id = parse_uuid(&path, FieldName::new("requestId"))?;
    let request = state
        .services
        .reviews
        .submit_final_review(id, reviewer)
        .await?;
    Ok(web::Json(request.into()))
}
