use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseMode {
    Html,
}

impl ParseMode {
    fn as_api_value(self) -> &'static str {
        match self {
            Self::Html => "HTML",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub parse_mode: Option<ParseMode>,
}

impl OutboundMessage {
    pub fn html(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self { chat_id, text: text.into(), parse_mode: Some(ParseMode::Html) }
    }

    pub fn plain(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self { chat_id, text: text.into(), parse_mode: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
}

/// A text message received by the bot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub sender: Option<Sender>,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("telegram request `{method}` failed: {message}")]
    Request { method: &'static str, message: String },
    #[error("telegram `{method}` returned status {status}")]
    Status { method: &'static str, status: u16 },
    #[error("telegram `{method}` response could not be decoded: {message}")]
    Decode { method: &'static str, message: String },
    #[error("telegram `{method}` rejected the call: {description}")]
    Api { method: &'static str, description: String },
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}

#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Next batch of inbound messages; an empty batch means the poll timed out.
    async fn next_updates(&self) -> Result<Vec<InboundMessage>, TransportError>;
}

/// Telegram Bot API client bound to one bot token.
///
/// The primary and escalation channels are two instances of this type.
pub struct TelegramBotApi {
    client: reqwest::Client,
    api_base_url: String,
    token: SecretString,
    long_poll_secs: u64,
    offset: Mutex<Option<i64>>,
}

impl TelegramBotApi {
    pub fn new(
        api_base_url: impl Into<String>,
        token: SecretString,
        timeout: Duration,
        long_poll_secs: u64,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|error| {
            TransportError::Request { method: "client", message: error.without_url().to_string() }
        })?;

        Ok(Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            token,
            long_poll_secs,
            offset: Mutex::new(None),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base_url, self.token.expose_secret())
    }

    async fn call<B, R>(&self, method: &'static str, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        // Errors never carry the URL: it embeds the bot token.
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|error| TransportError::Request {
                method,
                message: error.without_url().to_string(),
            })?;

        let status = response.status();
        let envelope: ApiEnvelope<R> = response.json().await.map_err(|error| {
            if status.is_success() {
                TransportError::Decode { method, message: error.without_url().to_string() }
            } else {
                TransportError::Status { method, status: status.as_u16() }
            }
        })?;

        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(TransportError::Decode {
                method,
                message: "response is missing `result`".to_owned(),
            }),
            (false, _) => Err(TransportError::Api {
                method,
                description: envelope
                    .description
                    .unwrap_or_else(|| format!("status {}", status.as_u16())),
            }),
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramBotApi {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let request = SendMessageRequest {
            chat_id: message.chat_id.0,
            text: &message.text,
            parse_mode: message.parse_mode.map(ParseMode::as_api_value),
        };
        let _: serde_json::Value = self.call("sendMessage", &request).await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramBotApi {
    async fn next_updates(&self) -> Result<Vec<InboundMessage>, TransportError> {
        let mut offset = self.offset.lock().await;
        let request = GetUpdatesRequest {
            offset: *offset,
            timeout: self.long_poll_secs,
            allowed_updates: &["message"],
        };
        let updates: Vec<Update> = self.call("getUpdates", &request).await?;

        if let Some(last) = updates.iter().map(|update| update.update_id).max() {
            *offset = Some(last + 1);
        }

        Ok(updates.into_iter().filter_map(Update::into_inbound).collect())
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<R> {
    ok: bool,
    result: Option<R>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    date: i64,
    chat: ApiChat,
    from: Option<ApiUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: i64,
    username: Option<String>,
}

impl Update {
    fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message?;
        let text = message.text?;
        let sent_at = Utc.timestamp_opt(message.date, 0).single()?;

        Some(InboundMessage {
            chat_id: ChatId(message.chat.id),
            sender: message.from.map(|user| Sender { id: user.id, username: user.username }),
            text,
            sent_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ChatId, InboundMessage, TelegramBotApi, Update};

    #[test]
    fn updates_without_text_are_skipped() {
        let updates: Vec<Update> = serde_json::from_value(serde_json::json!([
            {
                "update_id": 10,
                "message": {
                    "message_id": 1,
                    "date": 1_700_000_000,
                    "chat": { "id": -100, "type": "group" },
                    "from": { "id": 7, "is_bot": false, "first_name": "Kim", "username": "kim" },
                    "text": "/whoami"
                }
            },
            {
                "update_id": 11,
                "message": {
                    "message_id": 2,
                    "date": 1_700_000_001,
                    "chat": { "id": -100, "type": "group" },
                    "photo": []
                }
            },
            { "update_id": 12, "edited_message": {} }
        ]))
        .expect("updates should decode");

        let inbound: Vec<InboundMessage> =
            updates.into_iter().filter_map(Update::into_inbound).collect();

        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].chat_id, ChatId(-100));
        assert_eq!(inbound[0].text, "/whoami");
        assert_eq!(inbound[0].sender.as_ref().map(|sender| sender.id), Some(7));
        assert_eq!(inbound[0].sent_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn method_url_trims_trailing_slash() {
        let api = TelegramBotApi::new(
            "https://api.telegram.org/",
            "1:abc".to_string().into(),
            Duration::from_secs(5),
            1,
        )
        .expect("client should build");

        assert_eq!(api.method_url("sendMessage"), "https://api.telegram.org/bot1:abc/sendMessage");
    }

    #[test]
    fn status_error_names_the_method() {
        let error = super::TransportError::Status { method: "sendMessage", status: 401 };
        assert_eq!(error.to_string(), "telegram `sendMessage` returned status 401");
    }
}
