//! Configuration types for the model watcher
//!
//! This module defines all configuration structures used throughout the crate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Main watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Sources to watch, each on its own schedule
    pub sources: Vec<SourceConfig>,

    /// State store configuration
    pub state_store: StateStoreConfig,

    /// Notification sink configuration
    pub notifier: NotifierConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl WatcherConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.sources.is_empty() {
            return Err(crate::Error::config("No sources configured"));
        }

        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(crate::Error::config(format!(
                    "Duplicate source id: {}",
                    source.id
                )));
            }
            source.validate()?;
        }

        self.notifier.validate()?;

        Ok(())
    }
}

/// Per-source configuration: identity, adapter settings, schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source id, used as the registry slice key and in reports
    pub id: String,

    /// Adapter-specific settings
    #[serde(flatten)]
    pub kind: SourceKind,

    /// Seconds between reconciliation cycles for this source
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds an identifier must stay missing before its removal is
    /// reported. Zero or negative disables removal debouncing.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: i64,

    /// Per-call fetch timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl SourceConfig {
    /// Source with default schedule settings
    pub fn new(id: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            poll_interval_secs: default_poll_interval_secs(),
            grace_period_secs: default_grace_period_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }

    /// Set the poll interval
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Set the removal grace period
    pub fn with_grace_period_secs(mut self, secs: i64) -> Self {
        self.grace_period_secs = secs;
        self
    }

    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.id.is_empty() {
            return Err(crate::Error::config("Source id cannot be empty"));
        }
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config(format!(
                "Source {} poll interval must be > 0",
                self.id
            )));
        }
        self.kind.validate(&self.id)
    }
}

/// Adapter-specific source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceKind {
    /// LMArena-style listing: JSON endpoint or page with an embedded
    /// `initialModels` script object
    Arena {
        /// URL serving the model listing
        models_url: String,
        /// Path segments to the model array within a JSON payload
        #[serde(default)]
        json_path: Vec<String>,
        /// Path segments to the identifier within one model object
        #[serde(default)]
        model_id_path: Vec<String>,
        /// Extra request headers
        #[serde(default)]
        headers: HashMap<String, String>,
    },

    /// DesignArena JS-bundle listing
    DesignArena {
        /// Site base URL
        #[serde(default = "default_designarena_base_url")]
        base_url: String,
    },

    /// OpenAI `/v1/models` listing
    #[serde(rename = "openai")]
    OpenAi {
        /// API key for bearer auth
        api_key: String,
    },

    /// Google Generative Language models listing
    Google {
        /// API key
        api_key: String,
    },

    /// Custom source built through a registered factory
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceKind {
    /// Validate the adapter settings
    pub fn validate(&self, source_id: &str) -> Result<(), crate::Error> {
        match self {
            SourceKind::Arena { models_url, .. } => {
                if models_url.is_empty() {
                    return Err(crate::Error::config(format!(
                        "Source {} models URL cannot be empty",
                        source_id
                    )));
                }
                Ok(())
            }
            SourceKind::DesignArena { base_url } => {
                if base_url.is_empty() {
                    return Err(crate::Error::config(format!(
                        "Source {} base URL cannot be empty",
                        source_id
                    )));
                }
                Ok(())
            }
            SourceKind::OpenAi { api_key } | SourceKind::Google { api_key } => {
                if api_key.is_empty() {
                    return Err(crate::Error::config(format!(
                        "Source {} API key cannot be empty",
                        source_id
                    )));
                }
                Ok(())
            }
            SourceKind::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom source factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom source config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the source kind name, used for registry dispatch
    pub fn type_name(&self) -> &str {
        match self {
            SourceKind::Arena { .. } => "arena",
            SourceKind::DesignArena { .. } => "design_arena",
            SourceKind::OpenAi { .. } => "openai",
            SourceKind::Google { .. } => "google",
            SourceKind::Custom { factory, .. } => factory,
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,

    /// Custom state store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

/// Notification sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Telegram Bot API sink
    Telegram {
        /// Bot token
        bot_token: String,
        /// User ids allowed to tag models; empty allows everyone
        #[serde(default)]
        admin_user_ids: Vec<i64>,
    },

    /// Custom notifier
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl NotifierConfig {
    /// Validate the notifier configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            NotifierConfig::Telegram { bot_token, .. } => {
                if bot_token.is_empty() {
                    return Err(crate::Error::config("Telegram bot token cannot be empty"));
                }
                Ok(())
            }
            NotifierConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom notifier factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom notifier config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the notifier type name
    pub fn type_name(&self) -> &str {
        match self {
            NotifierConfig::Telegram { .. } => "telegram",
            NotifierConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the internal event channel
    ///
    /// When full, new engine events are dropped (with a warning log) rather
    /// than growing memory without bound.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_grace_period_secs() -> i64 {
    300
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_designarena_base_url() -> String {
    "https://www.designarena.ai/".to_string()
}

fn default_event_channel_capacity() -> usize {
    1000
}
