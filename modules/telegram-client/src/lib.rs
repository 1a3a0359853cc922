pub mod error;
pub mod types;

pub use error::{Result, TelegramError};
pub use types::{Chat, Message, ParseMode, SendOptions, Update, User};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use types::{ApiResponse, GetUpdatesRequest, SendMessageRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Default timeout for regular calls. Long polls extend it by their own wait.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_options(token, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Build a client against a custom API root (local Bot API server, test double).
    pub fn with_options(token: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(TelegramError::from)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Identify the bot behind the token.
    pub async fn get_me(&self) -> Result<User> {
        let resp = self
            .client
            .get(self.method_url("getMe"))
            .timeout(self.timeout)
            .send()
            .await?;
        decode(resp).await
    }

    /// Send a text message to a chat.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: &SendOptions,
    ) -> Result<Message> {
        let body = SendMessageRequest {
            chat_id,
            text,
            parse_mode: options.parse_mode,
            disable_web_page_preview: options.disable_web_page_preview,
        };

        let result = self.post("sendMessage", &body, self.timeout).await;
        if let Err(ref e) = result {
            tracing::debug!(chat_id, error = %e, "sendMessage failed");
        }
        result
    }

    /// Long-poll for new message updates. Blocks up to `wait_secs` server-side
    /// when there is nothing to deliver.
    pub async fn get_updates(&self, offset: Option<i64>, wait_secs: u64) -> Result<Vec<Update>> {
        let body = GetUpdatesRequest {
            offset,
            timeout: wait_secs,
            allowed_updates: vec!["message"],
        };
        let timeout = self.timeout + Duration::from_secs(wait_secs);
        self.post("getUpdates", &body, timeout).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T> {
        let resp = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status().as_u16();
    let body = resp.text().await?;
    parse_response(status, &body)
}

/// Unwrap the `{ ok, result, error_code, description }` envelope.
fn parse_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T> {
    let envelope: ApiResponse<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if (200..300).contains(&status) => return Err(e.into()),
        Err(_) => {
            return Err(TelegramError::Api {
                status,
                error_code: i64::from(status),
                description: body.chars().take(200).collect(),
            })
        }
    };

    if !envelope.ok {
        return Err(TelegramError::Api {
            status,
            error_code: envelope.error_code.unwrap_or(i64::from(status)),
            description: envelope.description.unwrap_or_default(),
        });
    }

    envelope
        .result
        .ok_or_else(|| TelegramError::Parse("response has ok=true but no result".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_updates() {
        let body = r#"{
            "ok": true,
            "result": [
                {
                    "update_id": 901,
                    "message": {
                        "message_id": 7,
                        "date": 1736600000,
                        "chat": {"id": 42, "type": "private", "first_name": "Ayşe"},
                        "from": {"id": 42, "is_bot": false, "first_name": "Ayşe", "last_name": "Yılmaz", "username": "ayse"},
                        "text": "/start"
                    }
                },
                {"update_id": 902}
            ]
        }"#;

        let updates: Vec<Update> = parse_response(200, body).unwrap();
        assert_eq!(updates.len(), 2);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.text.as_deref(), Some("/start"));
        assert_eq!(message.from.as_ref().unwrap().full_name(), "Ayşe Yılmaz");
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn api_errors_carry_code_and_description() {
        let body = r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#;
        let err = parse_response::<Message>(403, body).unwrap_err();
        match err {
            TelegramError::Api {
                status,
                error_code,
                ref description,
            } => {
                assert_eq!(status, 403);
                assert_eq!(error_code, 403);
                assert!(description.contains("blocked"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
        assert!(err.is_recipient_gone());
    }

    #[test]
    fn non_json_error_body_becomes_api_error() {
        let err = parse_response::<User>(502, "<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, TelegramError::Api { status: 502, .. }));
        assert!(!err.is_recipient_gone());
    }

    #[test]
    fn garbage_success_body_is_parse_error() {
        let err = parse_response::<User>(200, "not json").unwrap_err();
        assert!(matches!(err, TelegramError::Parse(_)));
    }

    #[test]
    fn send_request_omits_defaults() {
        let req = SendMessageRequest {
            chat_id: 1,
            text: "hi",
            parse_mode: None,
            disable_web_page_preview: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"chat_id": 1, "text": "hi"}));

        let req = SendMessageRequest {
            chat_id: 1,
            text: "hi",
            parse_mode: Some(ParseMode::Html),
            disable_web_page_preview: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["parse_mode"], "HTML");
        assert_eq!(json["disable_web_page_preview"], true);
    }

    #[test]
    fn debug_output_hides_token() {
        let client = TelegramClient::new("123456:SECRET").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("SECRET"));
    }
}
