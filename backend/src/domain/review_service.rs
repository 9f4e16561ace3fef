//! Section reviews and final review submission.

use std::sync::Arc;

use uuid::Uuid;

use super::context::ServiceContext;
use super::disposition::DispositionEngine;
use super::error::Error;
use super::ports::{AuditAction, AuditEntry};
use super::request::{Actor, Request};
use super::section::{Section, SectionComment, SectionStatus, SectionType, aggregate};

/// A reviewer's verdict on one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionReview {
    pub section_type: SectionType,
    /// Numeric status code; only 5, 6 and 7 are accepted.
    pub status_code: i16,
    pub comment: String,
}

/// Review operations for the assigned reviewer.
#[derive(Clone)]
pub struct ReviewService {
    ctx: Arc<ServiceContext>,
    disposition: DispositionEngine,
}

impl ReviewService {
    pub fn new(ctx: Arc<ServiceContext>, disposition: DispositionEngine) -> Self {
        Self { ctx, disposition }
    }

    /// Record a section review.
    pub async fn submit_section_review(
        &self,
        request_id: Uuid,
        reviewer: &Actor,
        review: SectionReview,
    ) -> Result<Section, Error> {
        let status = SectionStatus::from_code(review.status_code).ok_or_else(|| {
            Error::invalid_request(format!(
                "section status {} is not a review outcome",
                review.status_code
            ))
        })?;
        let request = self.load(request_id).await?;
        request.ensure_reviewable_by(&reviewer.id)?;
        if !review.section_type.applies_to(request.kind) {
            return Err(Error::invalid_request(format!(
                "section {} does not apply to {} requests",
                review.section_type, request.kind
            )));
        }

        let now = self.ctx.now();
        let section = self
            .ctx
            .sections
            .record(
                &request.id,
                review.section_type,
                &SectionComment {
                    reviewer: reviewer.clone(),
                    comment: review.comment,
                    status,
                    created_at: now,
                },
            )
            .await?;

        self.ctx.audit(AuditEntry {
            actor: reviewer.clone(),
            action: AuditAction::SectionReviewed,
            request_id: Some(request.id),
            tracking_id: Some(request.tracking_id),
            from_status: None,
            to_status: None,
            detail: Some(format!("{}: {}", review.section_type, status.case_status())),
            at: now,
        });
        Ok(section)
    }

    /// Every applicable section of a request with its comment log.
    pub async fn sections(&self, request_id: Uuid) -> Result<Vec<Section>, Error> {
        let request = self.load(request_id).await?;
        let recorded = self.ctx.sections.list(&request.id).await?;
        Ok(SectionType::for_kind(request.kind)
            .iter()
            .map(|section_type| {
                recorded
                    .iter()
                    .find(|section| section.section_type == *section_type)
                    .cloned()
                    .unwrap_or_else(|| Section::empty(*section_type))
            })
            .collect())
    }

    /// Aggregate the sections and settle the request.
    pub async fn submit_final_review(
        &self,
        request_id: Uuid,
        reviewer: &Actor,
    ) -> Result<Request, Error> {
        let request = self.load(request_id).await?;
        request.ensure_reviewable_by(&reviewer.id)?;
        let sections = self.ctx.sections.list(&request.id).await?;
        let outcome = aggregate(request.kind, &sections)?;
        self.disposition.dispose(request, outcome, reviewer).await
    }

    async fn load(&self, request_id: Uuid) -> Result<Request, Error> {
        self.ctx
            .requests
            .find_by_id(&request_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("request {request_id} not found")))
    }
}

#[cfg(test)]
#[path = "review_service_tests.rs"]
mod tests;
