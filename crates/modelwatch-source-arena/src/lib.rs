// # Arena Model Source
//
// This crate provides the LMArena listing source for the model watcher.
//
// ## Payload shapes
//
// The arena endpoint serves either of:
// - a JSON document, with the model array at a configurable path
// - an HTML/JS page embedding the array as an escaped `initialModels`
//   script object, extracted by bracket-depth scanning and unescaping
//
// ## Extraction rules
//
// - identifier: the configured id path, or the first non-empty of
//   id / slug / identifier / name / model
// - display name: the first non-empty of name / publicName / displayName,
//   falling back to the identifier
// - capabilities: `capabilities.inputCapabilities` /
//   `capabilities.outputCapabilities` objects; keys with truthy values form
//   the set, a missing object leaves that side unreported
//
// The source is an observer only: it never retries, caches, or decides what
// a listing means; that is the engine's job.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use modelwatch_core::config::{SourceConfig, SourceKind};
use modelwatch_core::model::{Capabilities, ModelEntry};
use modelwatch_core::registry::SourceRegistry;
use modelwatch_core::traits::{ModelSource, ModelSourceFactory};
use modelwatch_core::{Error, Result};

/// Default HTTP timeout for listing requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Identifier keys tried in order when no id path is configured
const IDENTIFIER_KEYS: &[&str] = &["id", "slug", "identifier", "name", "model"];

/// Display-name keys tried in order
const NAME_KEYS: &[&str] = &["name", "publicName", "displayName"];

/// LMArena listing source
pub struct ArenaSource {
    /// Source id, used in logs and error messages
    name: String,
    /// URL serving the model listing
    models_url: String,
    /// Path segments to the model array within a JSON payload
    json_path: Vec<String>,
    /// Path segments to the identifier within one model object
    model_id_path: Vec<String>,
    /// HTTP client with extra request headers baked in
    client: reqwest::Client,
}

impl ArenaSource {
    /// Create an arena source
    pub fn new(
        name: impl Into<String>,
        models_url: impl Into<String>,
        json_path: Vec<String>,
        model_id_path: Vec<String>,
        headers: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in headers {
            let header_name: reqwest::header::HeaderName = key
                .parse()
                .map_err(|_| Error::config(format!("Invalid request header name: {}", key)))?;
            let header_value = value
                .parse()
                .map_err(|_| Error::config(format!("Invalid request header value for {}", key)))?;
            header_map.insert(header_name, header_value);
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .default_headers(header_map)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            models_url: models_url.into(),
            json_path,
            model_id_path,
            client,
        })
    }

    fn parse_entries(&self, models: &[Value]) -> Result<Vec<ModelEntry>> {
        let mut entries = Vec::with_capacity(models.len());
        for item in models {
            let Some(object) = item.as_object() else {
                tracing::debug!("Skipping model entry because it is not an object: {}", item);
                continue;
            };

            let identifier = self.extract_identifier(item, object)?;
            let name = extract_name(object, &identifier);
            let capabilities = extract_capabilities(object);

            entries.push(ModelEntry {
                identifier,
                name,
                capabilities,
            });
        }
        Ok(entries)
    }

    fn extract_identifier(
        &self,
        item: &Value,
        fields: &serde_json::Map<String, Value>,
    ) -> Result<String> {
        if !self.model_id_path.is_empty() {
            let value = extract_path(item, &self.model_id_path)
                .map_err(|e| Error::fetch(&self.name, e))?;
            return match value {
                Some(v) if !value_is_empty(v) => Ok(scalar_to_string(v)),
                _ => Err(Error::fetch(
                    &self.name,
                    "Configured model id path could not be resolved for a model",
                )),
            };
        }

        for key in IDENTIFIER_KEYS {
            if let Some(value) = fields.get(*key) {
                if !value_is_empty(value) {
                    return Ok(scalar_to_string(value));
                }
            }
        }
        Err(Error::fetch(
            &self.name,
            "Could not determine identifier for model entry; consider configuring a model id path",
        ))
    }
}

#[async_trait]
impl ModelSource for ArenaSource {
    async fn fetch_models(&self) -> Result<Vec<ModelEntry>> {
        let response = self
            .client
            .get(&self.models_url)
            .send()
            .await
            .map_err(|e| Error::fetch(&self.name, format!("Failed to reach {}: {}", self.models_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(
                &self.name,
                format!("Arena responded with status {} for {}", status, self.models_url),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| Error::fetch(&self.name, format!("Failed to read response body: {}", e)))?;

        let models = if content_type.contains("application/json") {
            let payload: Value = serde_json::from_str(&body).map_err(|_| {
                Error::fetch(&self.name, "Arena response did not contain valid JSON")
            })?;
            let resolved = if self.json_path.is_empty() {
                Some(&payload)
            } else {
                extract_path(&payload, &self.json_path)
                    .map_err(|e| Error::fetch(&self.name, e))?
            };
            match resolved.and_then(Value::as_array) {
                Some(array) => array.clone(),
                None => {
                    return Err(Error::fetch(
                        &self.name,
                        "Arena response did not resolve to a list of models; \
                         consider adjusting the JSON path",
                    ));
                }
            }
        } else {
            parse_initial_models(&body).map_err(|e| Error::fetch(&self.name, e))?
        };

        self.parse_entries(&models)
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Traverse a JSON value along path segments.
///
/// Objects are indexed by key, arrays by integer segment. A missing key
/// terminates the walk with `None`; a segment that cannot apply to the
/// current value (e.g. a non-integer index into an array) is an error.
fn extract_path<'a>(
    data: &'a Value,
    path: &[String],
) -> std::result::Result<Option<&'a Value>, String> {
    let mut current = data;
    for part in path {
        let next = match current {
            Value::Object(map) => map.get(part.as_str()),
            Value::Array(items) => {
                let index: usize = part.parse().map_err(|_| {
                    format!("Path segment {:?} is not an integer for list traversal", part)
                })?;
                let item = items.get(index);
                if item.is_none() {
                    return Err(format!("Index {} is out of range in path traversal", index));
                }
                item
            }
            other => {
                return Err(format!(
                    "Cannot traverse path segment {:?} in a {}",
                    part,
                    json_type_name(other)
                ));
            }
        };
        match next {
            Some(value) if !value.is_null() => current = value,
            _ => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Extract the escaped `initialModels` array embedded in an HTML/JS page.
///
/// The array lives inside a JS string, so its quotes arrive backslash-escaped:
/// the marker is the literal `initialModels\":`. The matching close bracket
/// is found by depth counting, then the segment is unescaped and parsed as
/// JSON.
fn parse_initial_models(html: &str) -> std::result::Result<Vec<Value>, String> {
    const MARKER: &str = "initialModels\\\":";

    let marker_pos = html
        .find(MARKER)
        .ok_or_else(|| "initialModels array not found in page".to_string())?;
    let array_start = marker_pos + MARKER.len();

    let bytes = html.as_bytes();
    let mut depth = 0usize;
    let mut array_end = None;
    for (offset, byte) in bytes[array_start..].iter().enumerate() {
        match byte {
            b'[' => depth += 1,
            b']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "initialModels array did not terminate properly".to_string())?;
                if depth == 0 {
                    array_end = Some(array_start + offset);
                    break;
                }
            }
            _ => {}
        }
    }

    let array_end =
        array_end.ok_or_else(|| "initialModels array did not terminate properly".to_string())?;
    let raw_segment = &html[array_start..=array_end];

    let decoded = unescape_js_string(raw_segment)?;
    let parsed: Value = serde_json::from_str(&decoded)
        .map_err(|_| "Failed to parse initialModels array".to_string())?;
    parsed
        .as_array()
        .cloned()
        .ok_or_else(|| "initialModels did not decode to an array".to_string())
}

/// Undo one level of JS string escaping (`\"`, `\\`, `\uXXXX`, ...)
fn unescape_js_string(input: &str) -> std::result::Result<String, String> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => output.push('"'),
            Some('\\') => output.push('\\'),
            Some('/') => output.push('/'),
            Some('n') => output.push('\n'),
            Some('r') => output.push('\r'),
            Some('t') => output.push('\t'),
            Some('b') => output.push('\u{0008}'),
            Some('f') => output.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return Err("Truncated unicode escape in initialModels array".to_string());
                }
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| "Invalid unicode escape in initialModels array".to_string())?;
                match char::from_u32(code) {
                    Some(ch) => output.push(ch),
                    // Surrogate halves re-encode as an escape so the JSON
                    // parser can pair them.
                    None => {
                        output.push_str("\\u");
                        output.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                output.push('\\');
                output.push(other);
            }
            None => return Err("Dangling escape in initialModels array".to_string()),
        }
    }
    Ok(output)
}

/// Python-style truthiness for payload values
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn value_is_empty(value: &Value) -> bool {
    !is_truthy(value)
}

/// Render a scalar payload value as an identifier/name string
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn extract_name(item: &serde_json::Map<String, Value>, fallback: &str) -> String {
    for key in NAME_KEYS {
        if let Some(value) = item.get(*key) {
            if !value_is_empty(value) {
                return scalar_to_string(value);
            }
        }
    }
    fallback.to_string()
}

/// Build one capability side from a `*Capabilities` object: keys with
/// truthy values are enabled
fn capability_side(node: Option<&Value>) -> Option<BTreeSet<String>> {
    let object = node?.as_object()?;
    Some(
        object
            .iter()
            .filter(|(_, value)| is_truthy(value))
            .map(|(key, _)| key.clone())
            .collect(),
    )
}

fn extract_capabilities(item: &serde_json::Map<String, Value>) -> Option<Capabilities> {
    let capabilities = item.get("capabilities")?.as_object()?;
    Some(Capabilities {
        input: capability_side(capabilities.get("inputCapabilities")),
        output: capability_side(capabilities.get("outputCapabilities")),
    })
}

/// Factory registering the arena source under the "arena" kind
pub struct ArenaSourceFactory;

impl ModelSourceFactory for ArenaSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn ModelSource>> {
        match &config.kind {
            SourceKind::Arena {
                models_url,
                json_path,
                model_id_path,
                headers,
            } => Ok(Box::new(ArenaSource::new(
                &config.id,
                models_url,
                json_path.clone(),
                model_id_path.clone(),
                headers,
            )?)),
            other => Err(Error::config(format!(
                "Arena factory cannot build source kind {:?}",
                other.type_name()
            ))),
        }
    }
}

/// Register this source with a registry
pub fn register(registry: &SourceRegistry) {
    registry.register_source("arena", Box::new(ArenaSourceFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> ArenaSource {
        ArenaSource::new(
            "arena",
            "https://example.test/models",
            vec![],
            vec![],
            &HashMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn extract_path_walks_objects_and_arrays() {
        let payload = json!({"pageProps": {"models": [{"id": "m1"}]}});
        let path = vec!["pageProps".to_string(), "models".to_string()];
        let resolved = extract_path(&payload, &path).unwrap().unwrap();
        assert!(resolved.is_array());

        let deep = vec![
            "pageProps".to_string(),
            "models".to_string(),
            "0".to_string(),
            "id".to_string(),
        ];
        assert_eq!(
            extract_path(&payload, &deep).unwrap().unwrap(),
            &json!("m1")
        );
    }

    #[test]
    fn extract_path_missing_key_is_none_and_bad_traversal_is_an_error() {
        let payload = json!({"models": [1, 2]});
        assert_eq!(
            extract_path(&payload, &["nope".to_string()]).unwrap(),
            None
        );
        assert!(extract_path(&payload, &["models".to_string(), "x".to_string()]).is_err());
        assert!(
            extract_path(&payload, &["models".to_string(), "0".to_string(), "k".to_string()])
                .is_err()
        );
    }

    #[test]
    fn entries_use_identifier_key_fallbacks() {
        let models = vec![
            json!({"id": "m1", "publicName": "Model One"}),
            json!({"slug": "m2"}),
            json!("not an object"),
        ];
        let entries = source().parse_entries(&models).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identifier, "m1");
        assert_eq!(entries[0].name, "Model One");
        assert_eq!(entries[1].identifier, "m2");
        assert_eq!(entries[1].name, "m2", "name falls back to the identifier");
    }

    #[test]
    fn configured_id_path_is_required_to_resolve() {
        let source = ArenaSource::new(
            "arena",
            "https://example.test/models",
            vec![],
            vec!["meta".to_string(), "key".to_string()],
            &HashMap::new(),
        )
        .unwrap();

        let ok = vec![json!({"meta": {"key": "m1"}})];
        assert_eq!(source.parse_entries(&ok).unwrap()[0].identifier, "m1");

        let missing = vec![json!({"meta": {}})];
        assert!(source.parse_entries(&missing).is_err());
    }

    #[test]
    fn capabilities_keep_truthy_keys_only() {
        let models = vec![json!({
            "id": "m1",
            "capabilities": {
                "inputCapabilities": {"text": true, "image": true, "audio": false},
                "outputCapabilities": {}
            }
        })];
        let entries = source().parse_entries(&models).unwrap();
        let caps = entries[0].capabilities.as_ref().unwrap();
        assert_eq!(
            caps.input,
            Some(["text".to_string(), "image".to_string()].into())
        );
        assert_eq!(caps.output, Some(BTreeSet::new()));
    }

    #[test]
    fn missing_capability_side_stays_unreported() {
        let models = vec![json!({
            "id": "m1",
            "capabilities": {"inputCapabilities": {"text": 1}}
        })];
        let entries = source().parse_entries(&models).unwrap();
        let caps = entries[0].capabilities.as_ref().unwrap();
        assert_eq!(caps.input, Some(["text".to_string()].into()));
        assert_eq!(caps.output, None);

        let bare = vec![json!({"id": "m2"})];
        let entries = source().parse_entries(&bare).unwrap();
        assert_eq!(entries[0].capabilities, None);
    }

    #[test]
    fn embedded_initial_models_array_is_extracted() {
        let html = r#"<script>self.__next_f.push([1,"{\"initialModels\":[{\"id\":\"m1\",\"publicName\":\"Model One\"},{\"id\":\"m2\",\"publicName\":\"Café\"}]}"])</script>"#;
        let models = parse_initial_models(html).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0]["id"], json!("m1"));
        assert_eq!(models[1]["publicName"], json!("Café"));
    }

    #[test]
    fn nested_arrays_inside_models_are_balanced() {
        let html = r#"{\"initialModels\":[{\"id\":\"m1\",\"tags\":[\"a\",\"b\"]}] trailing"#;
        let models = parse_initial_models(html).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0]["tags"], json!(["a", "b"]));
    }

    #[test]
    fn missing_marker_is_an_error() {
        assert!(parse_initial_models("<html>no models here</html>").is_err());
    }

    #[test]
    fn unterminated_array_is_an_error() {
        let html = r#"{\"initialModels\":[{\"id\":\"m1\"}"#;
        assert!(parse_initial_models(html).is_err());
    }
}
