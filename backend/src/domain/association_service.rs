//! Association and de-association of approved IMEIs with subscriber UIDs.

use std::sync::Arc;

use tracing::info;

use super::association::{
    AssociationContext, AssociationDecision, AssociationRecord, evaluate_association,
    window_to_close,
};
use super::context::ServiceContext;
use super::error::{Error, FieldErrors};
use super::imei::NormalizedImei;
use super::ports::{AuditAction, AuditEntry};
use super::request::Actor;

/// Result of an association attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationOutcome {
    /// A new window was opened.
    Associated(AssociationRecord),
    /// The IMEI is held by other UIDs; call
    /// [`AssociationService::confirm_duplicate`] to share it.
    ConfirmationRequired { held_by: Vec<String> },
}

/// Association operations.
#[derive(Clone)]
pub struct AssociationService {
    ctx: Arc<ServiceContext>,
}

impl AssociationService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Associate `imei` with `uid`.
    pub async fn associate(&self, imei: &str, uid: &str) -> Result<AssociationOutcome, Error> {
        let imei = parse_imei(imei)?;
        let uid = parse_uid(uid)?;
        match self.evaluate(&imei, uid).await? {
            AssociationDecision::Create => {
                let record = self.open(imei, uid, false).await?;
                Ok(AssociationOutcome::Associated(record))
            }
            AssociationDecision::ConfirmDuplicate { held_by } => {
                Ok(AssociationOutcome::ConfirmationRequired { held_by })
            }
        }
    }

    /// Answer a duplicate confirmation.
    ///
    /// Declining leaves everything unchanged. Confirming re-checks the rules
    /// and opens a window flagged duplicate, flagging the IMEI's other open
    /// windows too.
    pub async fn confirm_duplicate(
        &self,
        imei: &str,
        uid: &str,
        confirm: bool,
    ) -> Result<Option<AssociationRecord>, Error> {
        let imei = parse_imei(imei)?;
        let uid = parse_uid(uid)?;
        if !confirm {
            return Ok(None);
        }
        let duplicate = match self.evaluate(&imei, uid).await? {
            AssociationDecision::Create => false,
            AssociationDecision::ConfirmDuplicate { .. } => true,
        };
        Ok(Some(self.open(imei, uid, duplicate).await?))
    }

    /// Close the open window of the pair.
    pub async fn deassociate(&self, imei: &str, uid: &str) -> Result<AssociationRecord, Error> {
        let imei = parse_imei(imei)?;
        let uid = parse_uid(uid)?;
        let history = self.ctx.associations.history(&imei, uid).await?;
        let mut record = window_to_close(&history)?.clone();

        let now = self.ctx.now();
        self.ctx.associations.close(&record.id, now).await?;
        record.end_date = Some(now);
        info!(imei = %record.imei, uid = %record.uid, "association closed");
        self.audit(&record, AuditAction::Deassociated);
        Ok(record)
    }

    async fn evaluate(&self, imei: &NormalizedImei, uid: &str) -> Result<AssociationDecision, Error> {
        let context = AssociationContext {
            imei_whitelisted: self.ctx.ledger.is_whitelisted(imei).await?,
            active_for_imei: self.ctx.associations.active_for_imei(imei).await?,
            active_for_uid: self.ctx.associations.active_count_for_uid(uid).await?,
        };
        Ok(evaluate_association(
            self.ctx.policy.association,
            uid,
            &context,
        )?)
    }

    async fn open(
        &self,
        imei: NormalizedImei,
        uid: &str,
        duplicate: bool,
    ) -> Result<AssociationRecord, Error> {
        let mut record = AssociationRecord::open(imei, uid, self.ctx.now());
        record.duplicate = duplicate;
        self.ctx.associations.create(&record).await?;
        info!(imei = %record.imei, uid = %record.uid, duplicate, "association opened");
        self.audit(&record, AuditAction::Associated);
        Ok(record)
    }

    fn audit(&self, record: &AssociationRecord, action: AuditAction) {
        self.ctx.audit(AuditEntry {
            actor: Actor::new(record.uid.clone(), record.uid.clone()),
            action,
            request_id: None,
            tracking_id: None,
            from_status: None,
            to_status: None,
            detail: Some(format!("imei {}", record.imei)),
            at: record.end_date.unwrap_or(record.start_date),
        });
    }
}

fn parse_imei(raw: &str) -> Result<NormalizedImei, Error> {
    NormalizedImei::parse(raw.trim()).map_err(|err| {
        let mut fields = FieldErrors::new();
        fields.insert("imei".to_owned(), err.to_string());
        Error::validation(fields)
    })
}

fn parse_uid(raw: &str) -> Result<&str, Error> {
    let uid = raw.trim();
    if uid.is_empty() {
        let mut fields = FieldErrors::new();
        fields.insert("uid".to_owned(), "UID must not be empty".to_owned());
        return Err(Error::validation(fields));
    }
    Ok(uid)
}

#[cfg(test)]
#[path = "association_service_tests.rs"]
mod tests;
