//! Notification delivery adapters.

mod webhook;

pub use webhook::WebhookNotificationSink;
