//! Bot command loop
//!
//! Long-polls `getUpdates` and translates chat commands into engine
//! administrative calls:
//!
//! - `/start`: subscribe the chat to change reports
//! - `/stop`: unsubscribe the chat
//! - `/status`: list the tracked models per source
//! - `/tag <key> [text]`: set or clear a model's tag (admin-gated when
//!   admin user ids are configured)
//!
//! The loop is resilient: a failed poll or reply is logged and polling
//! continues after a short pause. All state mutation goes through the
//! engine's administrative surface, under the same exclusive section the
//! reconciliation cycles use.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use modelwatch_core::engine::WatcherEngine;
use modelwatch_core::model::{SubscriberId, TrackedModel};
use modelwatch_core::{Error, Result};

use crate::TelegramApi;

/// Pause after a failed getUpdates poll
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Longest per-source model listing in a /status reply
const STATUS_LINE_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    text: Option<String>,
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

/// A parsed chat command
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Status,
    Tag { lookup: String, tag: Option<String> },
}

/// Parse a message text into a command.
///
/// The command token may carry a `@botname` suffix (group chats). For
/// `/tag`, the first argument is the lookup key and the rest, if any, the
/// tag text; no text clears the tag.
fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let command = parts.next()?;
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "/start" => Some(Command::Start),
        "/stop" => Some(Command::Stop),
        "/status" => Some(Command::Status),
        "/tag" => {
            let lookup = parts.next()?.to_string();
            let tag_text = parts.collect::<Vec<_>>().join(" ");
            let tag = if tag_text.is_empty() { None } else { Some(tag_text) };
            Some(Command::Tag { lookup, tag })
        }
        _ => None,
    }
}

/// Format the /status reply from the engine's tracked-model snapshot
fn format_status(tracked: &BTreeMap<String, BTreeMap<String, TrackedModel>>) -> String {
    let total: usize = tracked.values().map(|models| models.len()).sum();
    if total == 0 {
        return "No models tracked yet. I'll update after the first successful poll.".to_string();
    }

    let mut sections = Vec::new();
    for (source, models) in tracked {
        if models.is_empty() {
            continue;
        }
        let mut names: Vec<String> = models
            .values()
            .map(|record| match &record.tag {
                Some(tag) => format!("• {} [{}]", record.name, tag),
                None => format!("• {}", record.name),
            })
            .collect();
        names.sort_by_key(|line| line.to_lowercase());

        let shown = names.len().min(STATUS_LINE_LIMIT);
        let mut body = names[..shown].join("\n");
        if names.len() > shown {
            body.push_str(&format!("\n… and {} more", names.len() - shown));
        }
        sections.push(format!("{} ({}):\n{}", source, models.len(), body));
    }

    format!("Currently tracked models ({}):\n\n{}", total, sections.join("\n\n"))
}

/// Long-polling Telegram command loop
pub struct TelegramBot {
    api: TelegramApi,
    engine: WatcherEngine,
    /// User ids allowed to tag models; empty allows everyone
    admin_user_ids: Vec<i64>,
}

impl TelegramBot {
    /// Create a bot serving one engine
    pub fn new(api: TelegramApi, engine: WatcherEngine, admin_user_ids: Vec<i64>) -> Self {
        Self {
            api,
            engine,
            admin_user_ids,
        }
    }

    /// Whether this user may run the tag command
    fn is_tag_allowed(&self, user: Option<i64>) -> bool {
        if self.admin_user_ids.is_empty() {
            return true;
        }
        user.is_some_and(|id| self.admin_user_ids.contains(&id))
    }

    /// Run the command loop until the task is cancelled.
    ///
    /// Poll failures are logged and polling resumes after a short pause;
    /// nothing here terminates the process.
    pub async fn run(&self) -> Result<()> {
        info!("Telegram command loop started");
        let mut offset: i64 = 0;

        loop {
            let result = match self.api.get_updates(offset).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("getUpdates failed: {}", e);
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            let updates: Vec<Update> = match serde_json::from_value(result) {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("Unexpected getUpdates payload: {}", e);
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    continue;
                };
                let Some(text) = message.text.as_deref() else {
                    continue;
                };
                let Some(command) = parse_command(text) else {
                    debug!("Ignoring non-command message");
                    continue;
                };

                let chat_id = message.chat.id;
                let user_id = message.from.as_ref().map(|user| user.id);
                if let Err(e) = self.handle_command(chat_id, user_id, command).await {
                    warn!("Failed to handle command in chat {}: {}", chat_id, e);
                }
            }
        }
    }

    async fn handle_command(
        &self,
        chat_id: SubscriberId,
        user_id: Option<i64>,
        command: Command,
    ) -> Result<()> {
        match command {
            Command::Start => {
                self.engine.subscribe(chat_id).await?;
                self.reply(
                    chat_id,
                    "👋 I'll notify this chat about model catalog additions, removals, \
                     renames, and capability changes.\nUse /status to see the tracked models.",
                )
                .await
            }
            Command::Stop => {
                if self.engine.unsubscribe(chat_id).await? {
                    self.reply(chat_id, "I'll stop sending updates to this chat.")
                        .await
                } else {
                    self.reply(chat_id, "This chat was not subscribed to updates.")
                        .await
                }
            }
            Command::Status => {
                let tracked = self.engine.tracked_models().await;
                self.reply(chat_id, &format_status(&tracked)).await
            }
            Command::Tag { lookup, tag } => {
                if !self.is_tag_allowed(user_id) {
                    return self
                        .reply(chat_id, "Only configured admins may tag models.")
                        .await;
                }

                match self.engine.set_tag(&lookup, tag.as_deref()).await {
                    Ok(update) => {
                        let text = match (&update.tag, &update.previous_tag) {
                            (Some(tag), _) => {
                                format!("Tagged {} as \"{}\".", update.name, tag)
                            }
                            (None, Some(previous)) => format!(
                                "Cleared tag on {} (was \"{}\").",
                                update.name, previous
                            ),
                            (None, None) => format!("{} has no tag.", update.name),
                        };
                        self.reply(chat_id, &text).await
                    }
                    Err(Error::NotFound(query)) => {
                        self.reply(chat_id, &format!("No tracked model matches \"{}\".", query))
                            .await
                    }
                    Err(Error::Ambiguous { query, matches }) => {
                        self.reply(
                            chat_id,
                            &format!(
                                "\"{}\" matches more than one model:\n{}",
                                query,
                                matches
                                    .iter()
                                    .map(|m| format!("• {}", m))
                                    .collect::<Vec<_>>()
                                    .join("\n")
                            ),
                        )
                        .await
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn reply(&self, chat_id: SubscriberId, text: &str) -> Result<()> {
        self.api.send_message(chat_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_parsed() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/stop"), Some(Command::Stop));
        assert_eq!(parse_command("/status"), Some(Command::Status));
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn bot_name_suffix_is_stripped() {
        assert_eq!(parse_command("/start@modelwatch_bot"), Some(Command::Start));
    }

    #[test]
    fn tag_command_splits_lookup_and_text() {
        assert_eq!(
            parse_command("/tag gpt-x shiny new"),
            Some(Command::Tag {
                lookup: "gpt-x".to_string(),
                tag: Some("shiny new".to_string()),
            })
        );
        assert_eq!(
            parse_command("/tag gpt-x"),
            Some(Command::Tag {
                lookup: "gpt-x".to_string(),
                tag: None,
            })
        );
        assert_eq!(parse_command("/tag"), None);
    }

    #[test]
    fn status_formatting_lists_models_per_source() {
        let mut tracked = BTreeMap::new();
        let mut arena = BTreeMap::new();
        let mut tagged = TrackedModel::new("Model B");
        tagged.tag = Some("beta".to_string());
        arena.insert("a".to_string(), TrackedModel::new("Model A"));
        arena.insert("b".to_string(), tagged);
        tracked.insert("arena".to_string(), arena);

        let text = format_status(&tracked);
        assert!(text.contains("Currently tracked models (2):"));
        assert!(text.contains("arena (2):"));
        assert!(text.contains("• Model A"));
        assert!(text.contains("• Model B [beta]"));
    }

    #[test]
    fn empty_status_has_a_friendly_message() {
        let text = format_status(&BTreeMap::new());
        assert!(text.contains("No models tracked yet"));
    }

    #[test]
    fn long_listings_are_truncated() {
        let mut tracked = BTreeMap::new();
        let models: BTreeMap<String, TrackedModel> = (0..60)
            .map(|i| (format!("m{:02}", i), TrackedModel::new(format!("Model {:02}", i))))
            .collect();
        tracked.insert("arena".to_string(), models);

        let text = format_status(&tracked);
        assert!(text.contains("… and 10 more"));
    }
}
