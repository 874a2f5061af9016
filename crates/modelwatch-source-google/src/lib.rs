// # Google Model Source
//
// This crate provides the Google Generative Language models listing source
// for the model watcher.
//
// The listing is paged: each response carries a `models` array and an
// optional `nextPageToken`. One fetch walks every page so the engine always
// sees the complete catalog (a partial listing would read as removals).
//
// Identifiers come from the resource `name` (e.g. "models/gemini-2.0-flash");
// the display name prefers `displayName` when present. Models without a
// resource name are skipped with a debug log.
//
// ## Security
//
// The API key is sent as the `x-goog-api-key` header, keeping it out of
// URLs and logs.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use modelwatch_core::config::{SourceConfig, SourceKind};
use modelwatch_core::model::ModelEntry;
use modelwatch_core::registry::SourceRegistry;
use modelwatch_core::traits::{ModelSource, ModelSourceFactory};
use modelwatch_core::{Error, Result};

/// Google Generative Language API base URL
const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default HTTP timeout for listing requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size requested per listing call
const PAGE_SIZE: u32 = 1000;

/// Upper bound on pages walked per fetch; a token loop upstream must not
/// hang a cycle forever
const MAX_PAGES: usize = 50;

/// Google models listing source
pub struct GoogleSource {
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
impl std::fmt::Debug for GoogleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSource")
            .field("name", &self.name)
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GoogleSource {
    /// Create a Google source
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(name, api_key, GOOGLE_API_BASE)
    }

    /// Create a Google source against a custom API base (tests)
    pub fn with_base_url(
        name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("Google API key cannot be empty"));
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

    async fn fetch_page(&self, page_token: Option<&str>) -> Result<Value> {
        let url = format!("{}/models", self.base_url);
        let mut request = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .query(&[("pageSize", PAGE_SIZE.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(|e| {
            Error::fetch(&self.name, format!("Failed to list Google models: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(
                &self.name,
                format!("Google responded with status {}", status),
            ));
        }

        response.json().await.map_err(|e| {
            Error::fetch(&self.name, format!("Google response was not valid JSON: {}", e))
        })
    }
}

/// Turn one listing page into entries, skipping items without a name
fn entries_from_page(page: &Value) -> Vec<ModelEntry> {
    let Some(models) = page.get("models").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut entries = Vec::with_capacity(models.len());
    for model in models {
        let Some(name) = model
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        else {
            tracing::debug!("Skipping Google model because it has no name: {}", model);
            continue;
        };
        let display = model
            .get("displayName")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(name);
        entries.push(ModelEntry::new(name, display));
    }
    entries
}

#[async_trait]
impl ModelSource for GoogleSource {
    async fn fetch_models(&self) -> Result<Vec<ModelEntry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(page_token.as_deref()).await?;
            entries.extend(entries_from_page(&page));

            page_token = page
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                return Ok(entries);
            }
        }

        Err(Error::fetch(
            &self.name,
            format!("Google listing did not terminate within {} pages", MAX_PAGES),
        ))
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Factory registering the Google source under the "google" kind
pub struct GoogleSourceFactory;

impl ModelSourceFactory for GoogleSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn ModelSource>> {
        match &config.kind {
            SourceKind::Google { api_key } => {
                Ok(Box::new(GoogleSource::new(&config.id, api_key)?))
            }
            other => Err(Error::config(format!(
                "Google factory cannot build source kind {:?}",
                other.type_name()
            ))),
        }
    }
}

/// Register this source with a registry
pub fn register(registry: &SourceRegistry) {
    registry.register_source("google", Box::new(GoogleSourceFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_items_become_entries() {
        let page = json!({
            "models": [
                {"name": "models/gemini-2.0-flash", "displayName": "Gemini 2.0 Flash"},
                {"name": "models/embedding-001"}
            ]
        });
        let entries = entries_from_page(&page);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identifier, "models/gemini-2.0-flash");
        assert_eq!(entries[0].name, "Gemini 2.0 Flash");
        assert_eq!(entries[1].name, "models/embedding-001");
    }

    #[test]
    fn items_without_name_are_skipped() {
        let page = json!({"models": [{"displayName": "Nameless"}, {"name": ""}]});
        assert!(entries_from_page(&page).is_empty());
    }

    #[test]
    fn missing_models_array_yields_no_entries() {
        assert!(entries_from_page(&json!({})).is_empty());
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(GoogleSource::new("google", "").is_err());
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let source = GoogleSource::new("google", "AIza-secret").unwrap();
        let rendered = format!("{:?}", source);
        assert!(!rendered.contains("AIza-secret"));
    }
}
