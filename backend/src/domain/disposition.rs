//! Applies a review outcome to a request.
//!
//! A disposition checks ledger preconditions and quota, then commits the new
//! case status together with its ledger and quota effects in one transaction.
//! Exactly one notification and one audit entry follow each committed change.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use super::context::ServiceContext;
use super::error::Error;
use super::imei::NormalizedImei;
use super::ledger::LedgerIntent;
use super::ports::{AuditAction, AuditEntry, DispositionCommit, Notification};
use super::quota::QuotaDebit;
use super::request::{Actor, Request, RequestKind};
use super::section::SectionStatus;

/// Commits review outcomes.
#[derive(Clone)]
pub struct DispositionEngine {
    ctx: Arc<ServiceContext>,
}

impl DispositionEngine {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Settle `request` with `outcome` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Returns a conflict when duplicates, unregistered IMEIs, or the quota
    /// block the outcome, or when the stored request left the status it was
    /// read in; nothing is written in those cases. Quota and ledger effects
    /// count distinct normalised IMEIs.
    pub async fn dispose(
        &self,
        mut request: Request,
        outcome: SectionStatus,
        actor: &Actor,
    ) -> Result<Request, Error> {
        let devices = self.ctx.requests.devices(&request.id).await?;
        let imeis: Vec<NormalizedImei> = devices
            .iter()
            .flat_map(|device| device.imeis.iter().map(|imei| imei.normalized.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let (ledger, quota) = match (outcome, request.kind) {
            (SectionStatus::Approved, RequestKind::Registration) => {
                let duplicates: Vec<&str> = devices
                    .iter()
                    .flat_map(|device| &device.imeis)
                    .filter(|imei| imei.duplicate)
                    .map(|imei| imei.normalized.as_str())
                    .collect();
                if !duplicates.is_empty() {
                    return Err(Error::conflict("request contains duplicate IMEIs")
                        .with_details(json!({ "code": "duplicates_present", "imeis": duplicates })));
                }
                self.check_quota(&request, imeis.len()).await?;
                (
                    Some(LedgerIntent::Whitelist {
                        request_id: request.id,
                        imeis: imeis.clone(),
                    }),
                    Some(self.debit(&request, imeis.len())),
                )
            }
            (SectionStatus::Approved, RequestKind::DeRegistration) => {
                self.check_quota(&request, imeis.len()).await?;
                (
                    Some(LedgerIntent::Deregister {
                        imeis: imeis.clone(),
                    }),
                    Some(self.debit(&request, imeis.len())),
                )
            }
            (SectionStatus::Rejected, RequestKind::Registration) => (
                Some(LedgerIntent::ReverseRegistration {
                    request_id: request.id,
                }),
                None,
            ),
            (SectionStatus::Rejected, RequestKind::DeRegistration)
            | (SectionStatus::InformationRequested, _) => (None, None),
        };

        let previous = request.case_status;
        let now = self.ctx.now();
        request.settle(outcome.case_status(), now)?;
        self.ctx
            .requests
            .commit_disposition(&DispositionCommit {
                request: request.clone(),
                expected_status: previous,
                ledger,
                quota,
            })
            .await?;

        info!(
            request_id = %request.id,
            from = %previous,
            to = %request.case_status,
            actor = %actor.id,
            "request disposed"
        );
        self.notify(&request).await;
        self.ctx.audit(AuditEntry {
            actor: actor.clone(),
            action: AuditAction::Disposed,
            request_id: Some(request.id),
            tracking_id: Some(request.tracking_id),
            from_status: Some(previous),
            to_status: Some(request.case_status),
            detail: Some(format!("{} IMEI(s)", imeis.len())),
            at: now,
        });
        Ok(request)
    }

    async fn check_quota(&self, request: &Request, count: usize) -> Result<(), Error> {
        let quota = self
            .ctx
            .quotas
            .find_or_create(&request.submitter.id, self.ctx.policy.quota_defaults)
            .await?;
        quota.check(request.kind, count)?;
        Ok(())
    }

    fn debit(&self, request: &Request, count: usize) -> QuotaDebit {
        QuotaDebit {
            user_id: request.submitter.id.clone(),
            kind: request.kind,
            count,
        }
    }

    async fn notify(&self, request: &Request) {
        let notification = Notification {
            recipient_id: request.submitter.id.clone(),
            request_id: request.id,
            tracking_id: request.tracking_id,
            status: request.case_status,
            message: format!(
                "Your {} request {} is now {}.",
                request.kind, request.tracking_id, request.case_status
            ),
        };
        if let Err(error) = self.ctx.notifications.notify(&notification).await {
            warn!(%error, request_id = %request.id, "notification delivery failed");
        }
    }
}

#[cfg(test)]
#[path = "disposition_tests.rs"]
mod tests;
