//! Webhook-backed `NotificationSink`.
//!
//! Each notification is posted as JSON to one endpoint. Delivery is
//! fire-and-report: any non-success status is a delivery error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::domain::ports::{Notification, NotificationSink, NotificationSinkError};
use crate::outbound::http_body::body_preview;

/// Posts notifications to an HTTP webhook.
pub struct WebhookNotificationSink {
    client: Client,
    endpoint: Url,
}

impl WebhookNotificationSink {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationSinkError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(notification)
            .send()
            .await
            .map_err(|err| NotificationSinkError::delivery(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(request_id = %notification.request_id, "notification delivered");
            return Ok(());
        }
        let body = response.bytes().await.unwrap_or_default();
        Err(NotificationSinkError::delivery(format!(
            "status {}: {}",
            status.as_u16(),
            body_preview(body.as_ref())
        )))
    }
}
