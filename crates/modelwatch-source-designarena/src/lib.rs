// # DesignArena Model Source
//
// This crate provides the DesignArena listing source for the model watcher.
//
// DesignArena publishes no listing API; the model mapping lives inside one
// of the site's hashed Next.js bundles. Fetching a listing means:
//
// 1. Fetch the homepage and collect candidate script URLs (script tags,
//    quoted `.js` references, and the `_buildManifest` indirection)
// 2. Fetch candidates until one contains the model mapping
// 3. Locate the largest brace-delimited block carrying `id`/`displayName`
//    pairs, with quote- and escape-aware brace matching (the bundle is
//    minified JS, not JSON)
// 4. Extract (id, displayName) pairs per top-level object value
//
// Entries carry no capability metadata. Like every source, this adapter is
// an observer only; retries belong to the engine's schedule.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use modelwatch_core::config::{SourceConfig, SourceKind};
use modelwatch_core::model::ModelEntry;
use modelwatch_core::registry::SourceRegistry;
use modelwatch_core::traits::{ModelSource, ModelSourceFactory};
use modelwatch_core::{Error, Result};

/// Default HTTP timeout for page and bundle requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Bundles below this size cannot hold the mapping
const MIN_MODEL_BLOCK_LEN: usize = 500;

/// Marker that identifies the bundle carrying the model mapping
const BUNDLE_MARKER: &str = "open_source:!";

/// Browser-like user agent; the site serves different content to bots
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// DesignArena bundle-scraping source
pub struct DesignArenaSource {
    /// Source id, used in logs and error messages
    name: String,
    /// Site base URL
    base_url: String,
    /// HTTP client with browser-like headers
    client: reqwest::Client,
    /// Matches script src values for .js files, case-insensitive
    script_src_regex: Regex,
    /// Matches any quoted .js reference
    quoted_js_regex: Regex,
    /// Matches the Next.js build manifest path
    manifest_regex: Regex,
}

impl DesignArenaSource {
    /// Create a DesignArena source
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into(),
            client,
            script_src_regex: Regex::new(r#"(?i)src=["']([^"']+\.js[^"']*)["']"#)
                .expect("static regex compiles"),
            quoted_js_regex: Regex::new(r#"["']([^"']+\.js[^"']*)["']"#)
                .expect("static regex compiles"),
            manifest_regex: Regex::new(r"/_next/static/[^/]+/_buildManifest\.js")
                .expect("static regex compiles"),
        })
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            Error::fetch(&self.name, format!("Failed to reach {}: {}", url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(
                &self.name,
                format!("DesignArena responded with status {} for {}", status, url),
            ));
        }

        response.text().await.map_err(|e| {
            Error::fetch(&self.name, format!("Failed to read body of {}: {}", url, e))
        })
    }

    fn join_url(&self, path: &str) -> Result<String> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(path.to_string());
        }
        let base = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::config(format!("Invalid base URL {}: {}", self.base_url, e)))?;
        let joined = base
            .join(path)
            .map_err(|e| Error::fetch(&self.name, format!("Invalid script path {}: {}", path, e)))?;
        Ok(joined.to_string())
    }

    /// Candidate script paths referenced by a page or manifest
    fn extract_script_urls(&self, text: &str) -> Vec<String> {
        let mut paths = Vec::new();

        for captures in self.script_src_regex.captures_iter(text) {
            paths.push(normalize_script_path(&captures[1]));
        }

        // Fallback: any quoted .js reference in the text.
        for captures in self.quoted_js_regex.captures_iter(text) {
            paths.push(normalize_script_path(&captures[1]));
        }

        paths.sort();
        paths.dedup();
        paths
    }

    /// Find and fetch the bundle that contains the model mapping
    async fn fetch_bundle_with_mapping(&self) -> Result<String> {
        let html = self.fetch_text(&self.base_url).await?;

        let mut candidates = self.extract_script_urls(&html);

        if let Some(manifest) = self.manifest_regex.find(&html) {
            let manifest_url = self.join_url(manifest.as_str())?;
            if let Ok(manifest_text) = self.fetch_text(&manifest_url).await {
                for path in self.extract_script_urls(&manifest_text) {
                    if !candidates.contains(&path) {
                        candidates.push(path);
                    }
                }
            }
        }

        if candidates.is_empty() {
            return Err(Error::fetch(
                &self.name,
                "No script candidates found in DesignArena HTML",
            ));
        }

        let mut tried = Vec::new();
        for path in candidates {
            let url = self.join_url(&path)?;
            let text = match self.fetch_text(&url).await {
                Ok(text) => text,
                Err(_) => {
                    tried.push(url);
                    continue;
                }
            };
            if text.contains(BUNDLE_MARKER) {
                return Ok(text);
            }
            tried.push(url);
        }

        let shown = tried.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
        let suffix = if tried.len() > 5 { "..." } else { "" };
        Err(Error::fetch(
            &self.name,
            format!(
                "Could not locate DesignArena model bundle after checking scripts. Tried: {}{}",
                shown, suffix
            ),
        ))
    }
}

#[async_trait]
impl ModelSource for DesignArenaSource {
    async fn fetch_models(&self) -> Result<Vec<ModelEntry>> {
        let bundle = self.fetch_bundle_with_mapping().await?;

        let block = find_largest_model_block(&bundle).ok_or_else(|| {
            Error::fetch(&self.name, "No models found in the DesignArena bundle")
        })?;

        let pairs = extract_model_entries(block);
        if pairs.is_empty() {
            return Err(Error::fetch(
                &self.name,
                "No models found in the DesignArena bundle",
            ));
        }

        Ok(pairs
            .into_iter()
            .map(|(identifier, display_name)| ModelEntry::new(identifier, display_name))
            .collect())
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Normalize a script reference into a joinable path
fn normalize_script_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    if path.starts_with("http://") || path.starts_with("https://") || path.starts_with('/') {
        return path.to_string();
    }
    format!("/{}", path)
}

/// Find the index of the brace matching the one at `start`, skipping quoted
/// strings and escapes. The bundle is minified JS, so naive depth counting
/// would trip over braces inside string literals.
fn find_matching_brace(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth: i64 = 0;
    let mut quote: Option<u8> = None;
    let mut escape = false;

    for (index, &byte) in bytes.iter().enumerate().skip(start) {
        if escape {
            escape = false;
            continue;
        }
        if byte == b'\\' {
            escape = true;
            continue;
        }
        if let Some(q) = quote {
            if byte == q {
                quote = None;
            }
            continue;
        }
        match byte {
            b'"' | b'\'' => quote = Some(byte),
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the object-typed values of a top-level `{key: {...}, ...}`
/// mapping starting at `start`
fn extract_top_level_object_values(text: &str, start: usize) -> Vec<&str> {
    let Some(end) = find_matching_brace(text, start) else {
        return Vec::new();
    };

    let bytes = text.as_bytes();
    let mut values = Vec::new();
    let mut depth: i64 = 0;
    let mut quote: Option<u8> = None;
    let mut escape = false;
    let mut index = start;

    while index <= end {
        let byte = bytes[index];
        if escape {
            escape = false;
            index += 1;
            continue;
        }
        if byte == b'\\' {
            escape = true;
            index += 1;
            continue;
        }
        if let Some(q) = quote {
            if byte == q {
                quote = None;
            }
            index += 1;
            continue;
        }
        match byte {
            b'"' | b'\'' => {
                quote = Some(byte);
                index += 1;
            }
            b'{' => {
                depth += 1;
                index += 1;
            }
            b'}' => {
                depth -= 1;
                index += 1;
            }
            b':' if depth == 1 => {
                let mut scan = index + 1;
                while scan <= end && bytes[scan].is_ascii_whitespace() {
                    scan += 1;
                }
                if scan <= end && bytes[scan] == b'{' {
                    if let Some(block_end) = find_matching_brace(text, scan) {
                        values.push(&text[scan..=block_end]);
                        index = block_end + 1;
                        continue;
                    }
                }
                index += 1;
            }
            _ => index += 1,
        }
    }

    values
}

/// All balanced `{...}` spans in the text, innermost first per nesting
fn object_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut stack = Vec::new();
    let mut spans = Vec::new();
    let mut quote: Option<u8> = None;
    let mut escape = false;

    for (index, &byte) in bytes.iter().enumerate() {
        if escape {
            escape = false;
            continue;
        }
        if byte == b'\\' {
            escape = true;
            continue;
        }
        if let Some(q) = quote {
            if byte == q {
                quote = None;
            }
            continue;
        }
        match byte {
            b'"' | b'\'' => quote = Some(byte),
            b'{' => stack.push(index),
            b'}' => {
                if let Some(start) = stack.pop() {
                    spans.push((start, index));
                }
            }
            _ => {}
        }
    }
    spans
}

/// The brace-delimited block yielding the most model entries
fn find_largest_model_block(text: &str) -> Option<&str> {
    let mut best_block = None;
    let mut best_count = 0;

    for (start, end) in object_spans(text) {
        if end - start < MIN_MODEL_BLOCK_LEN {
            continue;
        }
        let segment = &text[start..=end];
        if !segment.contains("displayName") || !segment.contains("id") {
            continue;
        }
        let count = extract_model_entries(segment).len();
        if count > best_count {
            best_count = count;
            best_block = Some(segment);
        }
    }
    best_block
}

/// Extract (id, displayName) pairs from one mapping block
fn extract_model_entries(block: &str) -> Vec<(String, String)> {
    static ID_REGEX: OnceLock<Regex> = OnceLock::new();
    static DISPLAY_REGEX: OnceLock<Regex> = OnceLock::new();
    let id_regex = ID_REGEX.get_or_init(|| {
        Regex::new(r#"\bid\s*:\s*['"]([^'"]+)['"]"#).expect("static regex compiles")
    });
    let display_regex = DISPLAY_REGEX.get_or_init(|| {
        Regex::new(r#"\bdisplayName\s*:\s*['"]([^'"]+)['"]"#).expect("static regex compiles")
    });

    let mut entries = Vec::new();
    for object in extract_top_level_object_values(block, 0) {
        let id = id_regex.captures(object).map(|c| c[1].to_string());
        let display = display_regex.captures(object).map(|c| c[1].to_string());
        if let (Some(id), Some(display)) = (id, display) {
            entries.push((id, display));
        }
    }
    entries
}

/// Factory registering the DesignArena source under the "design_arena" kind
pub struct DesignArenaSourceFactory;

impl ModelSourceFactory for DesignArenaSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn ModelSource>> {
        match &config.kind {
            SourceKind::DesignArena { base_url } => {
                Ok(Box::new(DesignArenaSource::new(&config.id, base_url)?))
            }
            other => Err(Error::config(format!(
                "DesignArena factory cannot build source kind {:?}",
                other.type_name()
            ))),
        }
    }
}

/// Register this source with a registry
pub fn register(registry: &SourceRegistry) {
    registry.register_source("design_arena", Box::new(DesignArenaSourceFactory));
}
