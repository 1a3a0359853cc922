use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::backend::{DeliveryOutcome, MessageTransport};
use super::message::Notification;
use crate::state::StateStore;
use ielts_common::RecipientId;

/// Totals from one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastSummary {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Recipients dropped from the subscriber set after a permanent failure.
    pub removed: Vec<RecipientId>,
}

impl fmt::Display for BroadcastSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted={} delivered={} failed={} removed={}",
            self.attempted,
            self.delivered,
            self.failed,
            self.removed.len()
        )
    }
}

/// Fans a notification out to recipients, one independent send each.
pub struct Notifier {
    transport: Arc<dyn MessageTransport>,
    store: Arc<StateStore>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn MessageTransport>, store: Arc<StateStore>) -> Self {
        Self { transport, store }
    }

    pub fn transport(&self) -> &Arc<dyn MessageTransport> {
        &self.transport
    }

    /// Send to every recipient concurrently and collect every outcome.
    /// A permanent failure unsubscribes that recipient; nothing is retried.
    pub async fn notify(
        &self,
        recipients: &[RecipientId],
        notification: &Notification,
    ) -> Vec<(RecipientId, DeliveryOutcome)> {
        let message = notification.render();
        let kind = notification.kind();

        let sends = recipients.iter().map(|&chat_id| {
            let message = &message;
            async move {
                let outcome = self.transport.send(chat_id, message).await;
                (chat_id, outcome)
            }
        });
        let outcomes = join_all(sends).await;

        for (chat_id, outcome) in &outcomes {
            match outcome {
                DeliveryOutcome::Delivered => {
                    info!(chat_id, kind, "Notification sent");
                }
                DeliveryOutcome::TransientFailure(reason) => {
                    warn!(chat_id, kind, reason = %reason, "Failed to send notification");
                }
                DeliveryOutcome::PermanentFailure(reason) => {
                    warn!(chat_id, kind, reason = %reason, "Recipient unreachable, unsubscribing");
                    if self.store.remove_subscriber(*chat_id) {
                        info!(chat_id, "Removed blocked user from subscribers");
                    }
                }
            }
        }

        outcomes
    }

    /// Notify everyone currently subscribed.
    pub async fn broadcast(&self, notification: &Notification) -> BroadcastSummary {
        let recipients = self.store.list_subscribers();
        info!(
            kind = notification.kind(),
            subscribers = recipients.len(),
            "Broadcasting notification"
        );

        let outcomes = self.notify(&recipients, notification).await;

        let mut summary = BroadcastSummary {
            attempted: outcomes.len(),
            ..Default::default()
        };
        for (chat_id, outcome) in outcomes {
            match outcome {
                DeliveryOutcome::Delivered => summary.delivered += 1,
                DeliveryOutcome::TransientFailure(_) => summary.failed += 1,
                DeliveryOutcome::PermanentFailure(_) => {
                    summary.failed += 1;
                    summary.removed.push(chat_id);
                }
            }
        }
        summary
    }
}
