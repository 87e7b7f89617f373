use serde::Deserialize;
use std::path::Path;
use validator::Validate;

pub const DEFAULT_SERVER_PORT: u16 = 8000;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://assistant.db";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Answer questions clearly and concisely.";
pub const DEFAULT_MEMORY_WINDOW: u64 = 20;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Main configuration for the assistant backend
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct Config {
    pub app_name: String,

    pub app_description: String,

    /// HTTP server port
    #[validate(range(min = 1024, max = 65535))]
    pub server_port: u16,

    /// Database URL (SeaORM / SQLite)
    pub database_url: String,

    /// Origin of the web client, allowed by CORS
    pub frontend_url: String,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,

    /// Enables the demo login endpoint
    pub demo_mode: bool,

    /// Verify TLS certificates of model providers
    pub ssl_verify: bool,

    /// Model used when a turn does not name one
    pub default_model: String,

    pub system_prompt: String,

    /// Number of recent session messages sent with every turn
    #[validate(range(min = 1, max = 500))]
    pub memory_window: u64,

    /// Run fact extraction on per-user background workers instead of inline
    pub background_extraction: bool,

    pub openai_api_key: String,
    pub openai_base_url: String,

    pub deepseek_api_key: String,
    pub deepseek_base_url: String,

    pub competition_api_key: String,
    pub competition_base_url: String,
    /// Comma-separated model ids served by the competition endpoint
    pub competition_model_ids: String,
    /// Talk to the competition endpoint with the bespoke JSON payload
    pub competition_use_raw_http: bool,

    /// Timeout for chat-completions calls
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,

    /// Timeout for raw-HTTP provider calls
    #[validate(range(min = 1, max = 600))]
    pub raw_http_timeout_secs: u64,
}

impl Config {
    /// Loads `~/.assistant/config.*` (if present) and `ASSISTANT__*` variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = format!(
            "{}/.assistant/config",
            std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
        );
        Self::build(config::File::with_name(&path).required(false))
    }

    /// Loads an explicit config file; its format follows the extension.
    pub fn load_from(path: &Path, required: bool) -> Result<Self, config::ConfigError> {
        Self::build(config::File::from(path).required(required))
    }

    fn build(
        file: config::File<config::FileSourceFile, config::FileFormat>,
    ) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .set_default("app_name", "AI Assistant")?
            .set_default("app_description", "Your intelligent AI-powered assistant")?
            .set_default("server_port", DEFAULT_SERVER_PORT as i64)?
            .set_default("database_url", DEFAULT_DATABASE_URL)?
            .set_default("frontend_url", "http://localhost:5173")?
            .set_default("log_level", "info")?
            .set_default("demo_mode", true)?
            .set_default("ssl_verify", true)?
            .set_default("default_model", DEFAULT_MODEL)?
            .set_default("system_prompt", DEFAULT_SYSTEM_PROMPT)?
            .set_default("memory_window", DEFAULT_MEMORY_WINDOW as i64)?
            .set_default("background_extraction", true)?
            .set_default("openai_api_key", "")?
            .set_default("openai_base_url", DEFAULT_OPENAI_BASE_URL)?
            .set_default("deepseek_api_key", "")?
            .set_default("deepseek_base_url", DEFAULT_DEEPSEEK_BASE_URL)?
            .set_default("competition_api_key", "")?
            .set_default("competition_base_url", "")?
            .set_default("competition_model_ids", "")?
            .set_default("competition_use_raw_http", false)?
            .set_default("request_timeout_secs", 60i64)?
            .set_default("raw_http_timeout_secs", 30i64)?
            .add_source(file)
            // Environment overrides: ASSISTANT__SERVER_PORT, ASSISTANT__OPENAI_API_KEY, etc.
            .add_source(config::Environment::with_prefix("ASSISTANT").separator("__"))
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Ids listed in `competition_model_ids`, trimmed, empties dropped.
    pub fn competition_ids(&self) -> Vec<String> {
        self.competition_model_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "AI Assistant".to_string(),
            app_description: "Your intelligent AI-powered assistant".to_string(),
            server_port: DEFAULT_SERVER_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            log_level: "info".to_string(),
            demo_mode: true,
            ssl_verify: true,
            default_model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            memory_window: DEFAULT_MEMORY_WINDOW,
            background_extraction: true,
            openai_api_key: String::new(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            deepseek_api_key: String::new(),
            deepseek_base_url: DEFAULT_DEEPSEEK_BASE_URL.to_string(),
            competition_api_key: String::new(),
            competition_base_url: String::new(),
            competition_model_ids: String::new(),
            competition_use_raw_http: false,
            request_timeout_secs: 60,
            raw_http_timeout_secs: 30,
        }
    }
}
