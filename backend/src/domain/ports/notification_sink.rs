//! Driven port for user notifications.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::CaseStatus;

use super::define_port_error;

/// Message sent to a submitter when their request changes disposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient_id: String,
    pub request_id: Uuid,
    pub tracking_id: Uuid,
    pub status: CaseStatus,
    pub message: String,
}

define_port_error! {
    /// Errors surfaced by notification delivery.
    pub enum NotificationSinkError {
        /// Delivery failed.
        Delivery { message: String } => "notification delivery failed: {message}",
    }
}

/// Port for delivering notifications.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification.
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationSinkError>;
}

/// Fixture implementation that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureNotificationSink;

#[async_trait]
impl NotificationSink for FixtureNotificationSink {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotificationSinkError> {
        Ok(())
    }
}
