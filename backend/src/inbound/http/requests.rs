//! Request lifecycle HTTP handlers.
//!
//! ```text
//! POST   /api/v1/requests                          submit a request
//! POST   /api/v1/requests/search                   paged search
//! GET    /api/v1/requests/{id}                     read a request
//! PUT    /api/v1/requests/{id}                     replace file and counts
//! PATCH  /api/v1/requests/{id}/reason              change the reason
//! GET    /api/v1/requests/{id}/documents           list stored files
//! PUT    /api/v1/requests/{id}/documents/{name}    attach a document (raw body)
//! POST   /api/v1/requests/{id}/close               close a request
//! POST   /api/v1/requests/{id}/assignment          assign the caller
//! DELETE /api/v1/requests/{id}/assignment          release the caller
//! PUT    /api/v1/requests/{id}/report-visibility   show or hide the report
//! POST   /api/v1/requests/{id}/restart             re-run processing
//! GET    /api/v1/dashboard                         per-status counts
//! ```

use std::collections::BTreeMap;

use actix_web::{HttpResponse, delete, get, patch, post, put, web};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ports::StoredDocument;
use crate::domain::{
    CaseStatus, ComplianceSummary, CreateRequest, Error, NormalizedImei, Request, RequestFilter,
    RequestSearch, ResubmitRequest, Upload,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::identity::{Caller, Role};
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{
    FieldName, parse_optional_timestamp, parse_request_kind, parse_uuid,
};

/// An IMEI batch file sent inline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileBody {
    pub name: String,
    pub content: String,
}

impl From<FileBody> for Upload {
    fn from(file: FileBody) -> Self {
        Self {
            name: file.name,
            content: file.content.into_bytes(),
        }
    }
}

/// Request payload for submitting a request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestBody {
    pub kind: String,
    pub device_count: usize,
    pub imeis_per_device: Option<usize>,
    pub reason: Option<String>,
    pub file: FileBody,
}

/// Request payload for replacing a request's file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResubmitRequestBody {
    pub device_count: usize,
    pub imeis_per_device: Option<usize>,
    pub file: FileBody,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReasonBody {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VisibilityBody {
    pub visible: bool,
}

/// Search criteria; every present field narrows the result.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchBody {
    pub tracking_id: Option<String>,
    pub status: Option<i16>,
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    pub user_name: Option<String>,
    pub imei: Option<String>,
    pub brands: Vec<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response payload describing a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    pub id: Uuid,
    pub tracking_id: Uuid,
    pub kind: String,
    pub submitter_id: String,
    pub reviewer_id: Option<String>,
    pub status: i16,
    pub status_label: String,
    pub processing_status: String,
    pub report_status: String,
    pub device_count: usize,
    pub imeis_per_device: usize,
    pub reason: Option<String>,
    pub file_name: String,
    pub summary: Option<ComplianceSummary>,
    pub report: Option<String>,
    pub report_visible: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Request> for RequestBody {
    fn from(request: Request) -> Self {
        Self {
            id: request.id,
            tracking_id: request.tracking_id,
            kind: request.kind.as_str().to_owned(),
            submitter_id: request.submitter.id,
            reviewer_id: request.reviewer.map(|reviewer| reviewer.id),
            status: request.case_status.code(),
            status_label: request.case_status.label().to_owned(),
            processing_status: request.processing_status.as_str().to_owned(),
            report_status: request.report_status.as_str().to_owned(),
            device_count: request.device_count,
            imeis_per_device: request.imeis_per_device,
            reason: request.reason,
            file_name: request.file_name,
            summary: request.summary,
            report: request.report,
            report_visible: request.report_visible,
            created_at: request.created_at.to_rfc3339(),
            updated_at: request.updated_at.to_rfc3339(),
        }
    }
}

/// A request plus the key of the processing task working on it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedBody {
    pub request: RequestBody,
    pub task_key: Uuid,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClosedBody {
    pub message: String,
    pub request: RequestBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentsBody {
    pub request: RequestBody,
    pub stored: Vec<StoredDocument>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageBody {
    pub items: Vec<RequestBody>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn request_id(raw: &str) -> Result<Uuid, Error> {
    parse_uuid(raw, FieldName::new("requestId"))
}

fn build_search(body: SearchBody, caller: &Caller) -> Result<RequestSearch, Error> {
    let mut search = RequestSearch::default();
    if caller.role == Role::Submitter {
        search = search.for_submitter(caller.actor.id.clone());
    }
    if let Some(raw) = body.tracking_id.as_deref() {
        search = search.with(RequestFilter::TrackingId(parse_uuid(
            raw,
            FieldName::new("trackingId"),
        )?));
    }
    if let Some(code) = body.status {
        let status = CaseStatus::from_code(code)
            .ok_or_else(|| Error::invalid_request(format!("unknown status code {code}")))?;
        search = search.with(RequestFilter::Status(status));
    }
    let from = parse_optional_timestamp(body.created_from.as_deref(), FieldName::new("createdFrom"))?;
    let to = parse_optional_timestamp(body.created_to.as_deref(), FieldName::new("createdTo"))?;
    if from.is_some() || to.is_some() {
        search = search.with(RequestFilter::CreatedAt { from, to });
    }
    if let Some(name) = body.user_name {
        search = search.with(RequestFilter::UserName(name));
    }
    if let Some(raw) = body.imei.as_deref() {
        let imei = NormalizedImei::parse(raw)
            .map_err(|err| Error::invalid_request(format!("imei: {err}")))?;
        search = search.with(RequestFilter::Imei(imei));
    }
    if !body.brands.is_empty() {
        search = search.with(RequestFilter::Brand(body.brands));
    }
    let limit = body.limit.unwrap_or(search.limit);
    let offset = body.offset.unwrap_or(0);
    Ok(search.page(limit, offset))
}

/// Submit a registration or de-registration request.
#[post("/requests")]
pub async fn create_request(
    state: web::Data<HttpState>,
    caller: Caller,
    payload: web::Json<CreateRequestBody>,
) -> ApiResult<HttpResponse> {
    let submitter = caller.require_submitter()?.clone();
    let body = payload.into_inner();
    let kind = parse_request_kind(&body.kind, FieldName::new("kind"))?;
    let submitted = state
        .services
        .requests
        .create(CreateRequest {
            kind,
            submitter,
            device_count: body.device_count,
            imeis_per_device: body.imeis_per_device,
            reason: body.reason,
            file: body.file.into(),
        })
        .await?;
    Ok(HttpResponse::Accepted().json(SubmittedBody {
        request: submitted.request.into(),
        task_key: submitted.task.key,
    }))
}

/// Paged search; submitters only see their own requests.
#[post("/requests/search")]
pub async fn search_requests(
    state: web::Data<HttpState>,
    caller: Caller,
    payload: web::Json<SearchBody>,
) -> ApiResult<web::Json<PageBody>> {
    let search = build_search(payload.into_inner(), &caller)?;
    let page = state.services.requests.search(&search).await?;
    Ok(web::Json(PageBody {
        items: page.items.into_iter().map(RequestBody::from).collect(),
        total: page.total,
        limit: page.limit,
        offset: page.offset,
    }))
}

/// Read a request. Submitters see the report only when it is visible.
#[get("/requests/{id}")]
pub async fn get_request(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
) -> ApiResult<web::Json<RequestBody>> {
    let id = request_id(&path)?;
    let request = match caller.role {
        Role::Submitter => {
            state
                .services
                .requests
                .get_for_submitter(id, &caller.actor.id)
                .await?
        }
        Role::Reviewer => state.services.requests.get(id).await?,
    };
    Ok(web::Json(request.into()))
}

/// Replace the file and counts of an editable request.
#[put("/requests/{id}")]
pub async fn resubmit_request(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
    payload: web::Json<ResubmitRequestBody>,
) -> ApiResult<HttpResponse> {
    let id = request_id(&path)?;
    let submitter = caller.require_submitter()?;
    let body = payload.into_inner();
    let submitted = state
        .services
        .requests
        .resubmit(
            id,
            submitter,
            ResubmitRequest {
                device_count: body.device_count,
                imeis_per_device: body.imeis_per_device,
                file: body.file.into(),
            },
        )
        .await?;
    Ok(HttpResponse::Accepted().json(SubmittedBody {
        request: submitted.request.into(),
        task_key: submitted.task.key,
    }))
}

#[patch("/requests/{id}/reason")]
pub async fn update_reason(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
    payload: web::Json<ReasonBody>,
) -> ApiResult<web::Json<RequestBody>> {
    let id = request_id(&path)?;
    let submitter = caller.require_submitter()?;
    let request = state
        .services
        .requests
        .update_reason(id, submitter, payload.into_inner().reason)
        .await?;
    Ok(web::Json(request.into()))
}

#[get("/requests/{id}/documents")]
pub async fn list_documents(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
) -> ApiResult<web::Json<Vec<String>>> {
    let id = request_id(&path)?;
    let owner = match caller.role {
        Role::Submitter => Some(caller.actor.id.as_str()),
        Role::Reviewer => None,
    };
    let names = state.services.requests.documents(id, owner).await?;
    Ok(web::Json(names))
}

/// Attach one supporting document; the body is the raw file content.
#[put("/requests/{id}/documents/{name}")]
pub async fn upload_document(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<(String, String)>,
    content: web::Bytes,
) -> ApiResult<web::Json<DocumentsBody>> {
    let (raw_id, name) = path.into_inner();
    let id = request_id(&raw_id)?;
    let submitter = caller.require_submitter()?;
    let (request, stored) = state
        .services
        .requests
        .attach_documents(
            id,
            submitter,
            vec![Upload {
                name,
                content: content.to_vec(),
            }],
        )
        .await?;
    Ok(web::Json(DocumentsBody {
        request: request.into(),
        stored,
    }))
}

/// Close a request; closing a closed request reports it and succeeds.
#[post("/requests/{id}/close")]
pub async fn close_request(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
) -> ApiResult<web::Json<ClosedBody>> {
    let id = request_id(&path)?;
    if caller.role == Role::Submitter {
        state
            .services
            .requests
            .get_for_submitter(id, &caller.actor.id)
            .await?;
    }
    let closed = state.services.requests.close(id, &caller.actor).await?;
    Ok(web::Json(ClosedBody {
        message: closed.message().to_owned(),
        request: closed.request.into(),
    }))
}

#[post("/requests/{id}/assignment")]
pub async fn assign_reviewer(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
) -> ApiResult<web::Json<RequestBody>> {
    let id = request_id(&path)?;
    let reviewer = caller.require_reviewer()?.clone();
    let request = state.services.requests.assign(id, reviewer).await?;
    Ok(web::Json(request.into()))
}

#[delete("/requests/{id}/assignment")]
pub async fn unassign_reviewer(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
) -> ApiResult<web::Json<RequestBody>> {
    let id = request_id(&path)?;
    let reviewer = caller.require_reviewer()?;
    let request = state.services.requests.unassign(id, reviewer).await?;
    Ok(web::Json(request.into()))
}

#[put("/requests/{id}/report-visibility")]
pub async fn set_report_visibility(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
    payload: web::Json<VisibilityBody>,
) -> ApiResult<web::Json<RequestBody>> {
    let id = request_id(&path)?;
    let reviewer = caller.require_reviewer()?;
    let request = state
        .services
        .requests
        .set_report_visibility(id, reviewer, payload.visible)
        .await?;
    Ok(web::Json(request.into()))
}

/// Re-run processing of a request whose pipeline failed.
#[post("/requests/{id}/restart")]
pub async fn restart_processing(
    state: web::Data<HttpState>,
    caller: Caller,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = request_id(&path)?;
    if caller.role == Role::Submitter {
        state
            .services
            .requests
            .get_for_submitter(id, &caller.actor.id)
            .await?;
    }
    let task = state.services.requests.restart(id, &caller.actor).await?;
    Ok(HttpResponse::Accepted().json(serde_json::json!({ "taskKey": task.key })))
}

/// Per-status request counts for the calling submitter.
#[get("/dashboard")]
pub async fn dashboard(
    state: web::Data<HttpState>,
    caller: Caller,
) -> ApiResult<web::Json<BTreeMap<String, i64>>> {
    let submitter = caller.require_submitter()?;
    let counts = state.services.requests.dashboard(&submitter.id).await?;
    Ok(web::Json(
        counts
            .into_iter()
            .map(|(status, count)| (status.label().to_owned(), count))
            .collect(),
    ))
}

#[cfg(test)]
#[path = "requests_tests.rs"]
mod tests;
