// # Telegram Notification Sink
//
// This crate provides the Telegram Bot API integration for the model
// watcher:
//
// - `TelegramNotifier`: the notification sink; renders one structured
//   change report and delivers it per subscriber via `sendMessage`
// - `TelegramBot`: a long-polling command loop (`getUpdates`) translating
//   `/start`, `/stop`, `/status`, and `/tag` into engine administrative
//   calls
//
// ## Responsibility boundary
//
// The sink delivers exactly what the engine decided to report; it never
// filters, batches, or retries. A delivery failure is returned to the
// engine, which isolates it per subscriber. When Telegram reports a chat as
// permanently unreachable (bot kicked, chat deleted), the error is surfaced
// as `Error::SubscriberGone` so the engine can drop the subscription.
//
// ## Security
//
// The bot token is part of every API URL (Telegram's API shape) and MUST
// NOT appear in logs or error messages.

mod bot;
mod render;

pub use bot::TelegramBot;
pub use render::render_report;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use modelwatch_core::config::NotifierConfig;
use modelwatch_core::diff::ChangeReport;
use modelwatch_core::model::SubscriberId;
use modelwatch_core::registry::SourceRegistry;
use modelwatch_core::traits::{Notifier, NotifierFactory};
use modelwatch_core::{Error, Result};

/// Telegram Bot API base URL
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// HTTP timeout for sendMessage calls
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Long-poll duration for getUpdates, in seconds
const POLL_TIMEOUT_SECS: u64 = 30;

/// Envelope every Bot API response arrives in
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// Minimal Telegram Bot API client
///
/// Covers exactly the two calls this system needs: `sendMessage` and
/// `getUpdates`.
#[derive(Clone)]
pub struct TelegramApi {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TelegramApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramApi")
            .field("token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TelegramApi {
    /// Create an API client for a bot token
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, TELEGRAM_API_BASE)
    }

    /// Create an API client against a custom base URL (tests)
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::config("Telegram bot token cannot be empty"));
        }

        // getUpdates long-polls, so the client timeout must exceed it.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            token,
            base_url: base_url.into(),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.method_url(method))
            .timeout(if method == "getUpdates" {
                Duration::from_secs(POLL_TIMEOUT_SECS + 15)
            } else {
                SEND_TIMEOUT
            })
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::notify(format!("Telegram request failed: {}", e)))?;

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| Error::notify(format!("Telegram response was not valid JSON: {}", e)))?;

        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| "unknown Telegram error".to_string());
            return Err(match envelope.error_code {
                Some(code) => Error::notify(format!("Telegram error {}: {}", code, description)),
                None => Error::notify(format!("Telegram error: {}", description)),
            });
        }

        Ok(envelope.result)
    }

    /// Send a plain-text message to one chat
    pub async fn send_message(&self, chat_id: SubscriberId, text: &str) -> Result<()> {
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        match self.call("sendMessage", body).await {
            Ok(_) => Ok(()),
            Err(Error::Notify(message)) if is_gone_error(&message) => Err(Error::SubscriberGone {
                subscriber: chat_id,
                message,
            }),
            Err(e) => Err(e),
        }
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64) -> Result<Value> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", body).await
    }
}

/// Telegram error strings that mean the chat is permanently unreachable
fn is_gone_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("error 403")
        || lower.contains("bot was kicked")
        || lower.contains("bot was blocked")
        || lower.contains("chat not found")
        || lower.contains("user is deactivated")
}

/// Telegram notification sink
pub struct TelegramNotifier {
    api: TelegramApi,
}

impl TelegramNotifier {
    /// Create a notifier for a bot token
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api: TelegramApi::new(token)?,
        })
    }

    /// Create a notifier sharing an existing API client
    pub fn with_api(api: TelegramApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, subscriber: SubscriberId, report: &ChangeReport) -> Result<()> {
        let text = render_report(report);
        if text.is_empty() {
            return Ok(());
        }
        self.api.send_message(subscriber, &text).await
    }
}

/// Factory registering the Telegram notifier under the "telegram" kind
pub struct TelegramNotifierFactory;

impl NotifierFactory for TelegramNotifierFactory {
    fn create(&self, config: &Value) -> Result<Box<dyn Notifier>> {
        let config: NotifierConfig = serde_json::from_value(config.clone())?;
        match config {
            NotifierConfig::Telegram { bot_token, .. } => {
                Ok(Box::new(TelegramNotifier::new(bot_token)?))
            }
            other => Err(Error::config(format!(
                "Telegram factory cannot build notifier kind {:?}",
                other.type_name()
            ))),
        }
    }
}

/// Register this notifier with a registry
pub fn register(registry: &SourceRegistry) {
    registry.register_notifier("telegram", Box::new(TelegramNotifierFactory));
}
