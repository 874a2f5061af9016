// # modelwatchd - Model Watcher Daemon
//
// Thin integration layer over modelwatch-core:
// 1. Read configuration from environment variables
// 2. Initialize tracing and the runtime
// 3. Register source adapters and the notifier
// 4. Start the watcher engine and the Telegram command loop
//
// All watching logic lives in modelwatch-core; this binary only wires it.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Telegram
// - `TELEGRAM_BOT_TOKEN`: Bot token (required)
// - `ADMIN_USER_IDS`: Comma-separated user ids allowed to tag models
//
// ### Arena source
// - `ARENA_MODELS_URL`: Listing URL (enables the source)
// - `ARENA_MODELS_JSON_PATH`: Comma-separated path to the model array
// - `ARENA_MODEL_ID_PATH`: Comma-separated path to the identifier
// - `ARENA_REQUEST_HEADERS`: JSON object of extra request headers
// - `ARENA_REQUEST_COOKIES`: JSON object folded into a Cookie header
// - `POLL_INTERVAL_SECONDS`: Arena poll interval (default 30)
//
// ### DesignArena source
// - `DESIGNARENA_BASE_URL`: Site base URL (enables the source)
// - `DESIGNARENA_POLL_INTERVAL_SECONDS`: Poll interval
//
// ### OpenAI source
// - `OPENAI_API_KEY`: API key (enables the source)
// - `OPENAI_POLL_INTERVAL_SECONDS`: Poll interval
//
// ### Google source
// - `GOOGLE_API_KEY` / `GENAI_API_KEY` / `GEMINI_API_KEY`: API key
//   (first one set enables the source)
// - `GOOGLE_POLL_INTERVAL_SECONDS`: Poll interval
//
// ### Engine
// - `STATE_PATH`: State file path (default data/state.json)
// - `GRACE_PERIOD_SECONDS`: Removal grace period (default 300; <= 0
//   disables removal debouncing)
// - `LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export TELEGRAM_BOT_TOKEN=123456:token
// export ARENA_MODELS_URL=https://lmarena.ai/
// export OPENAI_API_KEY=sk-...
// export STATE_PATH=/var/lib/modelwatch/state.json
//
// modelwatchd
// ```

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use anyhow::Result;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

use modelwatch_core::config::{
    NotifierConfig, SourceConfig, SourceKind, StateStoreConfig, WatcherConfig,
};
use modelwatch_core::engine::{EngineSource, WatcherEngine};
use modelwatch_core::state::{FileStateStore, MemoryStateStore};
use modelwatch_core::traits::StateStore;
use modelwatch_core::{EngineConfig, SourceRegistry};
use modelwatch_notify_telegram::{TelegramApi, TelegramBot};

/// Default state file location
const DEFAULT_STATE_PATH: &str = "data/state.json";

/// Default arena poll interval in seconds
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Exit codes following systemd conventions
#[derive(Debug, Clone, Copy)]
enum WatcherExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<WatcherExitCode> for ExitCode {
    fn from(code: WatcherExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    telegram_token: String,
    admin_user_ids: Vec<i64>,
    arena_models_url: Option<String>,
    arena_json_path: Vec<String>,
    arena_model_id_path: Vec<String>,
    arena_headers: HashMap<String, String>,
    poll_interval_secs: u64,
    designarena_base_url: Option<String>,
    designarena_poll_interval_secs: Option<u64>,
    openai_api_key: Option<String>,
    openai_poll_interval_secs: Option<u64>,
    google_api_key: Option<String>,
    google_poll_interval_secs: Option<u64>,
    state_path: Option<String>,
    grace_period_secs: i64,
    log_level: String,
}

/// Split a comma-separated environment value into trimmed items
fn split_env_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a JSON-object environment value into a string map
fn load_json_env(name: &str) -> Result<HashMap<String, String>> {
    let Ok(raw) = env::var(name) else {
        return Ok(HashMap::new());
    };
    if raw.is_empty() {
        return Ok(HashMap::new());
    }
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("{} is not valid JSON: {}", name, e))?;
    let object = value
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("{} must be a JSON object", name))?;
    Ok(object
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect())
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let telegram_token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| anyhow::anyhow!("TELEGRAM_BOT_TOKEN environment variable is required"))?;

        let admin_user_ids = split_env_list(env::var("ADMIN_USER_IDS").ok())
            .into_iter()
            .map(|raw| {
                raw.parse::<i64>().map_err(|_| {
                    anyhow::anyhow!("Expected ADMIN_USER_IDS to contain integers but got {:?}", raw)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut arena_headers = load_json_env("ARENA_REQUEST_HEADERS")?;
        let cookies = load_json_env("ARENA_REQUEST_COOKIES")?;
        if !cookies.is_empty() {
            let cookie_header = cookies
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>()
                .join("; ");
            arena_headers.insert("cookie".to_string(), cookie_header);
        }

        let parse_interval = |name: &str| -> Result<Option<u64>> {
            match env::var(name) {
                Ok(raw) => raw
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| anyhow::anyhow!("{} must be a positive integer", name)),
                Err(_) => Ok(None),
            }
        };

        Ok(Self {
            telegram_token,
            admin_user_ids,
            arena_models_url: env::var("ARENA_MODELS_URL").ok().filter(|s| !s.is_empty()),
            arena_json_path: split_env_list(env::var("ARENA_MODELS_JSON_PATH").ok()),
            arena_model_id_path: split_env_list(env::var("ARENA_MODEL_ID_PATH").ok()),
            arena_headers,
            poll_interval_secs: parse_interval("POLL_INTERVAL_SECONDS")?
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            designarena_base_url: env::var("DESIGNARENA_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            designarena_poll_interval_secs: parse_interval("DESIGNARENA_POLL_INTERVAL_SECONDS")?,
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
            openai_poll_interval_secs: parse_interval("OPENAI_POLL_INTERVAL_SECONDS")?,
            google_api_key: env::var("GOOGLE_API_KEY")
                .or_else(|_| env::var("GENAI_API_KEY"))
                .or_else(|_| env::var("GEMINI_API_KEY"))
                .ok()
                .filter(|s| !s.is_empty()),
            google_poll_interval_secs: parse_interval("GOOGLE_POLL_INTERVAL_SECONDS")?,
            state_path: env::var("STATE_PATH").ok().filter(|s| !s.is_empty()),
            grace_period_secs: match env::var("GRACE_PERIOD_SECONDS") {
                Ok(raw) => raw
                    .parse::<i64>()
                    .map_err(|_| anyhow::anyhow!("GRACE_PERIOD_SECONDS must be an integer"))?,
                Err(_) => 300,
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.telegram_token.is_empty() {
            anyhow::bail!("TELEGRAM_BOT_TOKEN cannot be empty");
        }

        if self.arena_models_url.is_none()
            && self.designarena_base_url.is_none()
            && self.openai_api_key.is_none()
            && self.google_api_key.is_none()
        {
            anyhow::bail!(
                "No sources configured. Set at least one of ARENA_MODELS_URL, \
                DESIGNARENA_BASE_URL, OPENAI_API_KEY, GOOGLE_API_KEY"
            );
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("POLL_INTERVAL_SECONDS must be > 0");
        }

        if let Some(url) = &self.arena_models_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("ARENA_MODELS_URL must use HTTP or HTTPS scheme. Got: {}", url);
            }
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                other
            ),
        }

        Ok(())
    }

    /// Build the core configuration from the environment settings
    fn to_watcher_config(&self) -> WatcherConfig {
        let mut sources = Vec::new();

        if let Some(models_url) = &self.arena_models_url {
            sources.push(
                SourceConfig::new(
                    "arena",
                    SourceKind::Arena {
                        models_url: models_url.clone(),
                        json_path: self.arena_json_path.clone(),
                        model_id_path: self.arena_model_id_path.clone(),
                        headers: self.arena_headers.clone(),
                    },
                )
                .with_poll_interval_secs(self.poll_interval_secs)
                .with_grace_period_secs(self.grace_period_secs),
            );
        }

        if let Some(base_url) = &self.designarena_base_url {
            sources.push(
                SourceConfig::new(
                    "design_arena",
                    SourceKind::DesignArena {
                        base_url: base_url.clone(),
                    },
                )
                .with_poll_interval_secs(
                    self.designarena_poll_interval_secs
                        .unwrap_or(self.poll_interval_secs),
                )
                .with_grace_period_secs(self.grace_period_secs),
            );
        }

        if let Some(api_key) = &self.openai_api_key {
            sources.push(
                SourceConfig::new(
                    "openai",
                    SourceKind::OpenAi {
                        api_key: api_key.clone(),
                    },
                )
                .with_poll_interval_secs(
                    self.openai_poll_interval_secs.unwrap_or(self.poll_interval_secs),
                )
                .with_grace_period_secs(self.grace_period_secs),
            );
        }

        if let Some(api_key) = &self.google_api_key {
            sources.push(
                SourceConfig::new(
                    "google",
                    SourceKind::Google {
                        api_key: api_key.clone(),
                    },
                )
                .with_poll_interval_secs(
                    self.google_poll_interval_secs.unwrap_or(self.poll_interval_secs),
                )
                .with_grace_period_secs(self.grace_period_secs),
            );
        }

        WatcherConfig {
            sources,
            state_store: StateStoreConfig::File {
                path: self
                    .state_path
                    .clone()
                    .unwrap_or_else(|| DEFAULT_STATE_PATH.to_string()),
            },
            notifier: NotifierConfig::Telegram {
                bot_token: self.telegram_token.clone(),
                admin_user_ids: self.admin_user_ids.clone(),
            },
            engine: EngineConfig::default(),
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return WatcherExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return WatcherExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WatcherExitCode::ConfigError.into();
    }

    info!("Starting modelwatchd daemon");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WatcherExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            WatcherExitCode::RuntimeError
        } else {
            WatcherExitCode::CleanShutdown
        }
    })
    .into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    // Register built-in sources and the notifier
    let registry = SourceRegistry::new();

    #[cfg(feature = "arena")]
    modelwatch_source_arena::register(&registry);
    #[cfg(feature = "designarena")]
    modelwatch_source_designarena::register(&registry);
    #[cfg(feature = "openai")]
    modelwatch_source_openai::register(&registry);
    #[cfg(feature = "google")]
    modelwatch_source_google::register(&registry);
    modelwatch_notify_telegram::register(&registry);

    let watcher_config = config.to_watcher_config();
    watcher_config.validate()?;

    // Build each configured source through the registry
    let mut engine_sources = Vec::with_capacity(watcher_config.sources.len());
    for source_config in &watcher_config.sources {
        let source = registry.create_source(source_config)?;
        info!(
            "Watching source {} every {}s (grace period {}s)",
            source_config.id, source_config.poll_interval_secs, source_config.grace_period_secs
        );
        engine_sources.push(EngineSource::from_config(source_config, source));
    }

    let notifier = registry.create_notifier(&watcher_config.notifier)?;

    let store: Box<dyn StateStore> = match &watcher_config.state_store {
        StateStoreConfig::File { path } => {
            info!("State file: {}", path);
            Box::new(FileStateStore::new(path).await?)
        }
        StateStoreConfig::Memory => Box::new(MemoryStateStore::new()),
        StateStoreConfig::Custom { factory, .. } => {
            anyhow::bail!("Unknown state store kind: {}", factory)
        }
    };

    let (engine, mut events) = WatcherEngine::new(
        engine_sources,
        notifier,
        store,
        watcher_config.engine.clone(),
    )
    .await?;

    info!(
        "Engine ready: {} source(s), {} subscriber(s)",
        engine.source_ids().len(),
        engine.subscriber_count().await
    );

    // Surface engine events in the logs
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "engine event");
        }
    });

    // Telegram command loop shares the engine's administrative surface
    let api = TelegramApi::new(&config.telegram_token)?;
    let bot = TelegramBot::new(api, engine.clone(), config.admin_user_ids.clone());

    tokio::select! {
        result = engine.run() => result?,
        result = bot.run() => result?,
    }

    Ok(())
}
