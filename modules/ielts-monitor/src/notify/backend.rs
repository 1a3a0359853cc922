use std::fmt;

use async_trait::async_trait;

use ielts_common::RecipientId;

/// A rendered chat message, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Telegram legacy Markdown.
    pub text: String,
    pub disable_link_preview: bool,
}

impl OutgoingMessage {
    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            disable_link_preview: false,
        }
    }

    pub fn without_preview(mut self) -> Self {
        self.disable_link_preview = true;
        self
    }
}

/// How one send ended. The transport classifies its own errors so callers
/// never inspect error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Worth trying again next cycle (network, rate limit, server error).
    TransientFailure(String),
    /// The recipient revoked access (blocked the bot, chat deleted).
    PermanentFailure(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => write!(f, "delivered"),
            Self::TransientFailure(reason) => write!(f, "transient failure: {reason}"),
            Self::PermanentFailure(reason) => write!(f, "permanent failure: {reason}"),
        }
    }
}

/// Pluggable message delivery for notifications and command replies.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, recipient: RecipientId, message: &OutgoingMessage) -> DeliveryOutcome;
}
