use async_trait::async_trait;
use telegram_client::{SendOptions, TelegramClient, TelegramError};

use super::backend::{DeliveryOutcome, MessageTransport, OutgoingMessage};
use ielts_common::RecipientId;

/// Telegram Bot API delivery.
#[derive(Clone)]
pub struct TelegramTransport {
    client: TelegramClient,
}

impl TelegramTransport {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &TelegramClient {
        &self.client
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn send(&self, recipient: RecipientId, message: &OutgoingMessage) -> DeliveryOutcome {
        let mut options = SendOptions::markdown();
        if message.disable_link_preview {
            options = options.without_preview();
        }

        match self.client.send_message(recipient, &message.text, &options).await {
            Ok(_) => DeliveryOutcome::Delivered,
            Err(e) => classify(&e),
        }
    }
}

fn classify(err: &TelegramError) -> DeliveryOutcome {
    if err.is_recipient_gone() {
        DeliveryOutcome::PermanentFailure(err.to_string())
    } else {
        DeliveryOutcome::TransientFailure(err.to_string())
    }
}
