//! IMEI-to-UID association handlers.
//!
//! ```text
//! POST /api/v1/associations               associate (optionally confirming a duplicate)
//! POST /api/v1/associations/deassociate   close the open window
//! ```

use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AssociationOutcome, AssociationRecord};
use crate::inbound::http::ApiResult;
use crate::inbound::http::identity::Caller;
use crate::inbound::http::state::HttpState;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssociationRequestBody {
    pub imei: String,
    pub uid: String,
    /// Answer to an earlier confirmation prompt for a shared IMEI.
    #[serde(default)]
    pub confirm: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationBody {
    pub id: Uuid,
    pub imei: String,
    pub uid: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub duplicate: bool,
}

impl From<AssociationRecord> for AssociationBody {
    fn from(record: AssociationRecord) -> Self {
        Self {
            id: record.id,
            imei: record.imei.to_string(),
            uid: record.uid,
            start_date: record.start_date.to_rfc3339(),
            end_date: record.end_date.map(|end| end.to_rfc3339()),
            duplicate: record.duplicate,
        }
    }
}

/// Outcome of an association attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "outcome")]
pub enum AssociationResponse {
    Associated { association: AssociationBody },
    ConfirmationRequired { held_by: Vec<String> },
    Declined,
}

#[post("/associations")]
pub async fn associate(
    state: web::Data<HttpState>,
    _caller: Caller,
    payload: web::Json<AssociationRequestBody>,
) -> ApiResult<HttpResponse> {
    let body = payload.into_inner();
    let associations = &state.services.associations;
    let response = match body.confirm {
        None => match associations.associate(&body.imei, &body.uid).await? {
            AssociationOutcome::Associated(record) => AssociationResponse::Associated {
                association: record.into(),
            },
            AssociationOutcome::ConfirmationRequired { held_by } => {
                AssociationResponse::ConfirmationRequired { held_by }
            }
        },
        Some(confirm) => match associations
            .confirm_duplicate(&body.imei, &body.uid, confirm)
            .await?
        {
            Some(record) => AssociationResponse::Associated {
                association: record.into(),
            },
            None => AssociationResponse::Declined,
        },
    };
    Ok(match response {
        AssociationResponse::Associated { .. } => HttpResponse::Created().json(response),
        _ => HttpResponse::Ok().json(response),
    })
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeassociationBody {
    pub imei: String,
    pub uid: String,
}

#[post("/associations/deassociate")]
pub async fn deassociate(
    state: web::Data<HttpState>,
    _caller: Caller,
    payload: web::Json<DeassociationBody>,
) -> ApiResult<web::Json<AssociationBody>> {
    let record = state
        .services
        .associations
        .deassociate(&payload.imei, &payload.uid)
        .await?;
    Ok(web::Json(record.into()))
}
