// Outbound notifications (e-mail or similar). Delivery is best effort.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    BookingConfirmation,
    OwnerNotification,
    BookingStatusChanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub template: Template,
    pub recipient: String,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    // true when the message was handed over for delivery
    async fn send(&self, notification: Notification) -> bool;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> bool {
        info!(
            template = ?notification.template,
            recipient = %notification.recipient,
            "notification"
        );
        true
    }
}

// A failed send is logged and otherwise ignored
pub(crate) async fn deliver(notifier: &dyn Notifier, notification: Notification) {
    let template = notification.template;
    let recipient = notification.recipient.clone();
    if !notifier.send(notification).await {
        warn!(?template, %recipient, "notification was not delivered");
    }
}
