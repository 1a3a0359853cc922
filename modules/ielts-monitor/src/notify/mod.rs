pub mod backend;
pub mod message;
pub mod notifier;
pub mod telegram;

pub use backend::{DeliveryOutcome, MessageTransport, OutgoingMessage};
pub use message::Notification;
pub use notifier::{BroadcastSummary, Notifier};
pub use telegram::TelegramTransport;
