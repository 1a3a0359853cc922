use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelegramError>;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}, code {error_code}): {description}")]
    Api {
        status: u16,
        error_code: i64,
        description: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl TelegramError {
    /// True when the chat can never be reached again: the user blocked the bot,
    /// deleted their account, kicked the bot from a group, or the chat is gone.
    pub fn is_recipient_gone(&self) -> bool {
        match self {
            TelegramError::Api {
                error_code,
                description,
                ..
            } => {
                let description = description.to_lowercase();
                match error_code {
                    403 => true,
                    400 => {
                        description.contains("chat not found")
                            || description.contains("user not found")
                            || description.contains("peer_id_invalid")
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Telegram answers 429 when the bot is rate limited.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TelegramError::Api { error_code: 429, .. })
    }
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs embed the bot token; never let it reach the logs.
        let err = err.without_url();
        if err.is_timeout() {
            TelegramError::Timeout(err.to_string())
        } else {
            TelegramError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TelegramError {
    fn from(err: serde_json::Error) -> Self {
        TelegramError::Parse(err.to_string())
    }
}
