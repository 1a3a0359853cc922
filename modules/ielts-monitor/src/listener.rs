use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use telegram_client::{TelegramClient, Update};

use crate::commands::{self, CommandContext, Reply};
use crate::notify::MessageTransport;
use crate::state::StateStore;
use ielts_common::RecipientId;

/// Server-side wait of one `getUpdates` long poll.
pub const POLL_TIMEOUT_SECS: u64 = 30;
pub const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Long-polls the bot's updates and answers subscription commands.
pub struct UpdateListener {
    client: TelegramClient,
    transport: Arc<dyn MessageTransport>,
    store: Arc<StateStore>,
    target_url: String,
    check_interval_minutes: u64,
}

impl UpdateListener {
    pub fn new(
        client: TelegramClient,
        transport: Arc<dyn MessageTransport>,
        store: Arc<StateStore>,
        target_url: impl Into<String>,
        check_interval_minutes: u64,
    ) -> Self {
        Self {
            client,
            transport,
            store,
            target_url: target_url.into(),
            check_interval_minutes,
        }
    }

    /// Poll until `shutdown` flips. Errors are logged and retried after a pause.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Update listener started");
        let mut offset: Option<i64> = None;

        while !*shutdown.borrow() {
            let polled = tokio::select! {
                _ = shutdown.changed() => break,
                polled = self.client.get_updates(offset, POLL_TIMEOUT_SECS) => polled,
            };

            match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        self.handle(update).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Polling error, retrying in {}s", POLL_ERROR_BACKOFF.as_secs());
                    if sleep_unless_shutdown(&mut shutdown, POLL_ERROR_BACKOFF).await {
                        break;
                    }
                }
            }
        }

        info!("Update listener stopped");
    }

    async fn handle(&self, update: Update) {
        let Some((chat_id, reply)) = self.reply_to(&update) else {
            return;
        };
        let outcome = self.transport.send(chat_id, &reply).await;
        if !outcome.is_delivered() {
            warn!(chat_id, outcome = %outcome, "Failed to send command reply");
        }
    }

    fn reply_to(&self, update: &Update) -> Option<(RecipientId, Reply)> {
        let ctx = CommandContext {
            store: &self.store,
            target_url: &self.target_url,
            check_interval_minutes: self.check_interval_minutes,
        };
        reply_to_update(&ctx, update)
    }
}

/// Sleep for `delay`, cut short by shutdown. Returns true when shutdown
/// was signalled (or its sender is gone).
pub async fn sleep_unless_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    let changed = tokio::select! {
        changed = shutdown.changed() => changed,
        _ = tokio::time::sleep(delay) => return false,
    };
    changed.is_err() || *shutdown.borrow()
}

/// The command reply an update calls for, if any.
pub fn reply_to_update(ctx: &CommandContext<'_>, update: &Update) -> Option<(RecipientId, Reply)> {
    let message = update.message.as_ref()?;
    let text = message.text.as_deref()?;
    let chat_id = message.chat.id;
    debug!(chat_id, update_id = update.update_id, "Received message");

    commands::dispatch(ctx, chat_id, text).map(|reply| (chat_id, reply))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: serde_json::Value) -> Update {
        serde_json::from_value(json).unwrap()
    }

    fn ctx(store: &StateStore) -> CommandContext<'_> {
        CommandContext {
            store,
            target_url: "http://prep.bilkent.edu.tr/ielts/",
            check_interval_minutes: 1,
        }
    }

    #[test]
    fn command_message_gets_reply_for_its_chat() {
        let store = StateStore::ephemeral();
        let update = update(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "date": 1700000000,
                "chat": { "id": -42, "type": "group", "title": "IELTS" },
                "text": "/subscribe@ielts_bot"
            }
        }));

        let (chat_id, reply) = reply_to_update(&ctx(&store), &update).unwrap();
        assert_eq!(chat_id, -42);
        assert!(reply.text.contains("Bildirimler aktif edildi"));
        assert!(store.is_subscriber(-42));
    }

    #[test]
    fn updates_without_command_text_are_ignored() {
        let store = StateStore::ephemeral();
        let no_message = update(serde_json::json!({ "update_id": 11 }));
        let plain = update(serde_json::json!({
            "update_id": 12,
            "message": {
                "message_id": 2,
                "date": 1700000000,
                "chat": { "id": 5, "type": "private" },
                "text": "merhaba"
            }
        }));
        let sticker = update(serde_json::json!({
            "update_id": 13,
            "message": {
                "message_id": 3,
                "date": 1700000000,
                "chat": { "id": 5, "type": "private" }
            }
        }));

        for update in [no_message, plain, sticker] {
            assert!(reply_to_update(&ctx(&store), &update).is_none());
        }
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn backoff_ends_early_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);

        let waiter = tokio::spawn(async move {
            sleep_unless_shutdown(&mut rx, Duration::from_secs(60)).await
        });
        tokio::task::yield_now().await;
        tx.send(true).unwrap();

        let stopped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("backoff should not wait out its full delay")
            .unwrap();
        assert!(stopped);
    }

    #[tokio::test]
    async fn backoff_runs_out_without_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(!sleep_unless_shutdown(&mut rx, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn backoff_skipped_when_already_shut_down() {
        let (_tx, mut rx) = watch::channel(true);
        assert!(sleep_unless_shutdown(&mut rx, Duration::from_secs(60)).await);
    }
}
