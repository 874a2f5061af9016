// # OpenAI Model Source
//
// This crate provides the OpenAI `/v1/models` listing source for the model
// watcher.
//
// The listing is a flat JSON envelope (`{"object": "list", "data": [...]}`)
// where each item's `id` doubles as identifier and display name; OpenAI
// publishes no separate display names or capability metadata. Items without
// an id are skipped with a debug log.
//
// ## Security
//
// The API key is sent as a bearer header and never appears in logs.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use modelwatch_core::config::{SourceConfig, SourceKind};
use modelwatch_core::model::ModelEntry;
use modelwatch_core::registry::SourceRegistry;
use modelwatch_core::traits::{ModelSource, ModelSourceFactory};
use modelwatch_core::{Error, Result};

/// OpenAI API base URL
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Default HTTP timeout for listing requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI models listing source
pub struct OpenAiSource {
    /// Source id, used in logs and error messages
    name: String,
    /// API key
    /// ⚠️ NEVER log this value
    api_key: String,
    /// API base URL, overridable for tests
    base_url: String,
    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for OpenAiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSource")
            .field("name", &self.name)
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiSource {
    /// Create an OpenAI source
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(name, api_key, OPENAI_API_BASE)
    }

    /// Create an OpenAI source against a custom API base (tests)
    pub fn with_base_url(
        name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("OpenAI API key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            api_key,
            base_url: base_url.into(),
            client,
        })
    }
}

/// Turn one listing envelope into entries, skipping items without an id
fn entries_from_payload(source_name: &str, payload: &Value) -> Result<Vec<ModelEntry>> {
    let Some(data) = payload.get("data").and_then(Value::as_array) else {
        return Err(Error::fetch(
            source_name,
            "OpenAI response did not contain a model list",
        ));
    };

    let mut entries = Vec::with_capacity(data.len());
    for item in data {
        let Some(id) = item.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()) else {
            tracing::debug!("Skipping OpenAI model because it has no id: {}", item);
            continue;
        };
        entries.push(ModelEntry::new(id, id));
    }
    Ok(entries)
}

#[async_trait]
impl ModelSource for OpenAiSource {
    async fn fetch_models(&self) -> Result<Vec<ModelEntry>> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::fetch(&self.name, format!("Failed to list OpenAI models: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(
                &self.name,
                format!("OpenAI responded with status {}", status),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            Error::fetch(&self.name, format!("OpenAI response was not valid JSON: {}", e))
        })?;

        entries_from_payload(&self.name, &payload)
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Factory registering the OpenAI source under the "openai" kind
pub struct OpenAiSourceFactory;

impl ModelSourceFactory for OpenAiSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn ModelSource>> {
        match &config.kind {
            SourceKind::OpenAi { api_key } => {
                Ok(Box::new(OpenAiSource::new(&config.id, api_key)?))
            }
            other => Err(Error::config(format!(
                "OpenAI factory cannot build source kind {:?}",
                other.type_name()
            ))),
        }
    }
}

/// Register this source with a registry
pub fn register(registry: &SourceRegistry) {
    registry.register_source("openai", Box::new(OpenAiSourceFactory));
}
