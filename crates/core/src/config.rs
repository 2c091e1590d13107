use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::DEFAULT_TRIGGER_PREFIX;
use crate::protocol::{DEFAULT_BRIDGE_TIMEOUT, DEFAULT_FROM_AGENT};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub bridge: BridgeConfig,
    pub registry: RegistryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub country: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub timeout_ms: u64,
    pub from_agent: String,
    pub trigger_prefix: String,
}

#[derive(Clone, Debug, Default)]
pub struct RegistryConfig {
    pub agents: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Sessions untouched for this long are dropped from memory.
    pub session_idle_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Keyword rules only; no model is called.
    Disabled,
    OpenAi,
    Groq,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub search_api_key: Option<String>,
    pub bridge_timeout_ms: Option<u64>,
    pub registry_agents: Option<BTreeMap<String, String>>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Disabled,
                api_key: None,
                base_url: None,
                model: "llama-3.1-8b-instant".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            search: SearchConfig {
                base_url: "https://api.openwebninja.com/realtime-amazon-data".to_string(),
                api_key: None,
                country: "US".to_string(),
                timeout_secs: 10,
            },
            bridge: BridgeConfig {
                timeout_ms: DEFAULT_BRIDGE_TIMEOUT.as_millis() as u64,
                from_agent: DEFAULT_FROM_AGENT.to_string(),
                trigger_prefix: DEFAULT_TRIGGER_PREFIX.to_string(),
            },
            registry: RegistryConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8001,
                graceful_shutdown_secs: 15,
                session_idle_secs: 1_800,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::Disabled => None,
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::Ollama => Some("http://localhost:11434/v1"),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" | "rules" => Ok(Self::Disabled),
            "openai" => Ok(Self::OpenAi),
            "groq" => Ok(Self::Groq),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected disabled|openai|groq|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("santai.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Base URL the LLM client should call: the configured one, else the provider default.
    pub fn llm_base_url(&self) -> Option<String> {
        self.llm
            .base_url
            .clone()
            .or_else(|| self.llm.provider.default_base_url().map(str::to_string))
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(search) = patch.search {
            if let Some(base_url) = search.base_url {
                self.search.base_url = base_url;
            }
            if let Some(search_api_key_value) = search.api_key {
                self.search.api_key = Some(secret_value(search_api_key_value));
            }
            if let Some(country) = search.country {
                self.search.country = country;
            }
            if let Some(timeout_secs) = search.timeout_secs {
                self.search.timeout_secs = timeout_secs;
            }
        }

        if let Some(bridge) = patch.bridge {
            if let Some(timeout_ms) = bridge.timeout_ms {
                self.bridge.timeout_ms = timeout_ms;
            }
            if let Some(from_agent) = bridge.from_agent {
                self.bridge.from_agent = from_agent;
            }
            if let Some(trigger_prefix) = bridge.trigger_prefix {
                self.bridge.trigger_prefix = trigger_prefix;
            }
        }

        if let Some(registry) = patch.registry {
            if let Some(agents) = registry.agents {
                self.registry.agents = agents;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(session_idle_secs) = server.session_idle_secs {
                self.server.session_idle_secs = session_idle_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SANTAI_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("SANTAI_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SANTAI_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("SANTAI_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SANTAI_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SANTAI_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SANTAI_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("SANTAI_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("SANTAI_SEARCH_BASE_URL") {
            self.search.base_url = value;
        }
        if let Some(value) = read_env("SANTAI_SEARCH_API_KEY") {
            self.search.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SANTAI_SEARCH_COUNTRY") {
            self.search.country = value;
        }
        if let Some(value) = read_env("SANTAI_SEARCH_TIMEOUT_SECS") {
            self.search.timeout_secs = parse_u64("SANTAI_SEARCH_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SANTAI_BRIDGE_TIMEOUT_MS") {
            self.bridge.timeout_ms = parse_u64("SANTAI_BRIDGE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("SANTAI_BRIDGE_FROM_AGENT") {
            self.bridge.from_agent = value;
        }
        if let Some(value) = read_env("SANTAI_BRIDGE_TRIGGER_PREFIX") {
            self.bridge.trigger_prefix = value;
        }

        if let Some(value) = read_env("SANTAI_REGISTRY_AGENTS") {
            self.registry.agents = parse_agent_list("SANTAI_REGISTRY_AGENTS", &value)?;
        }

        if let Some(value) = read_env("SANTAI_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SANTAI_SERVER_PORT") {
            self.server.port = parse_u16("SANTAI_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SANTAI_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SANTAI_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("SANTAI_SERVER_SESSION_IDLE_SECS") {
            self.server.session_idle_secs = parse_u64("SANTAI_SERVER_SESSION_IDLE_SECS", &value)?;
        }

        let log_level = read_env("SANTAI_LOGGING_LEVEL").or_else(|| read_env("SANTAI_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SANTAI_LOGGING_FORMAT").or_else(|| read_env("SANTAI_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(search_api_key) = overrides.search_api_key {
            self.search.api_key = Some(secret_value(search_api_key));
        }
        if let Some(timeout_ms) = overrides.bridge_timeout_ms {
            self.bridge.timeout_ms = timeout_ms;
        }
        if let Some(agents) = overrides.registry_agents {
            self.registry.agents = agents;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_search(&self.search)?;
        validate_bridge(&self.bridge)?;
        validate_registry(&self.registry)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("santai.toml"), PathBuf::from("config/santai.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::Disabled | LlmProvider::Ollama => {}
        LlmProvider::OpenAi | LlmProvider::Groq => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/groq providers".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        ensure_http_url("llm.base_url", base_url)?;
    }

    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    ensure_http_url("search.base_url", &search.base_url)?;

    if search.timeout_secs == 0 || search.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "search.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_bridge(bridge: &BridgeConfig) -> Result<(), ConfigError> {
    if bridge.timeout_ms == 0 || bridge.timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "bridge.timeout_ms must be in range 1..=60000".to_string(),
        ));
    }

    if bridge.from_agent.trim().is_empty() {
        return Err(ConfigError::Validation("bridge.from_agent must not be empty".to_string()));
    }

    if bridge.trigger_prefix.trim().is_empty() {
        return Err(ConfigError::Validation(
            "bridge.trigger_prefix must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_registry(registry: &RegistryConfig) -> Result<(), ConfigError> {
    if registry.agents.is_empty() {
        return Err(ConfigError::Validation(
            "registry.agents must list at least one agent \
             (`[registry.agents] name = \"http://host:port\"` \
             or SANTAI_REGISTRY_AGENTS=name=url,...)"
                .to_string(),
        ));
    }

    for (name, address) in &registry.agents {
        if name.trim().trim_start_matches('@').is_empty() {
            return Err(ConfigError::Validation(
                "registry.agents contains an empty agent name".to_string(),
            ));
        }
        ensure_http_url(&format!("registry.agents.{name}"), address)?;
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if server.session_idle_secs == 0 {
        return Err(ConfigError::Validation(
            "server.session_idle_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn ensure_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        return Ok(());
    }
    Err(ConfigError::Validation(format!("{field} must start with http:// or https://")))
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// `name=url,name=url`.
fn parse_agent_list(key: &str, value: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut agents = BTreeMap::new();
    for entry in value.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let Some((name, address)) = entry.split_once('=') else {
            return Err(ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value: value.to_string(),
            });
        };
        agents.insert(name.trim().to_string(), address.trim().to_string());
    }
    Ok(agents)
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    search: Option<SearchPatch>,
    bridge: Option<BridgePatch>,
    registry: Option<RegistryPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    country: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BridgePatch {
    timeout_ms: Option<u64>,
    from_agent: Option<String>,
    trigger_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryPatch {
    agents: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    session_idle_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const AGENTS: &str = "devam=http://127.0.0.1:8002,parth=http://127.0.0.1:8003";

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SEARCH_API_KEY", "search-key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("santai.toml");
            fs::write(
                &path,
                r#"
[search]
api_key = "${TEST_SEARCH_API_KEY}"

[registry.agents]
devam = "http://127.0.0.1:8002"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.search.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("search-key-from-env".to_string()),
                "search api key should be loaded from environment",
            )?;
            ensure(
                config.registry.agents.get("devam").map(String::as_str)
                    == Some("http://127.0.0.1:8002"),
                "registry should be loaded from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SEARCH_API_KEY"]);
        result
    }

    #[test]
    fn registry_env_list_and_defaults() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SANTAI_REGISTRY_AGENTS", AGENTS);
        env::set_var("SANTAI_LOG_LEVEL", "warn");
        env::set_var("SANTAI_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.registry.agents.len() == 2, "both agents should be registered")?;
            ensure(config.bridge.timeout_ms == 5_000, "bridge timeout defaults to five seconds")?;
            ensure(config.bridge.from_agent == "santa_clause", "default from agent")?;
            ensure(config.llm.provider == LlmProvider::Disabled, "llm is off by default")?;
            ensure(config.logging.level == "warn", "log level alias should apply")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["SANTAI_REGISTRY_AGENTS", "SANTAI_LOG_LEVEL", "SANTAI_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SANTAI_BRIDGE_TIMEOUT_MS", "2500");
        env::set_var("SANTAI_SERVER_PORT", "9100");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("santai.toml");
            fs::write(
                &path,
                r#"
[bridge]
timeout_ms = 1000
trigger_prefix = "@gift bot"

[server]
port = 9000

[registry.agents]
devam = "http://127.0.0.1:8002"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let mut agents = BTreeMap::new();
            agents.insert("mia".to_string(), "https://mia.agents.example".to_string());

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    registry_agents: Some(agents),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.bridge.timeout_ms == 2_500, "env bridge timeout should beat file")?;
            ensure(config.server.port == 9_100, "env port should beat file")?;
            ensure(config.bridge.trigger_prefix == "@gift bot", "file prefix should beat default")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.registry.agents.keys().collect::<Vec<_>>() == vec!["mia"],
                "override registry should win",
            )?;
            Ok(())
        })();

        clear_vars(&["SANTAI_BRIDGE_TIMEOUT_MS", "SANTAI_SERVER_PORT"]);
        result
    }

    #[test]
    fn empty_registry_is_fatal_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string())
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("registry.agents")
        );
        ensure(has_message, "validation failure should mention registry.agents")
    }

    #[test]
    fn malformed_agent_list_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SANTAI_REGISTRY_AGENTS", "devam http://127.0.0.1:8002");
        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "SANTAI_REGISTRY_AGENTS", "error should name the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("malformed agent list should fail".to_string()),
        };

        clear_vars(&["SANTAI_REGISTRY_AGENTS"]);
        result
    }

    #[test]
    fn session_idle_window_is_configurable_but_never_zero() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SANTAI_REGISTRY_AGENTS", AGENTS);
        env::set_var("SANTAI_SERVER_SESSION_IDLE_SECS", "120");
        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.server.session_idle_secs == 120, "idle window should come from env")?;

            env::set_var("SANTAI_SERVER_SESSION_IDLE_SECS", "0");
            match AppConfig::load(LoadOptions::default()) {
                Err(ConfigError::Validation(message)) => ensure(
                    message.contains("server.session_idle_secs"),
                    "validation should name the idle window",
                ),
                Err(other) => Err(format!("unexpected error: {other}")),
                Ok(_) => Err("a zero idle window should fail".to_string()),
            }
        })();

        clear_vars(&["SANTAI_REGISTRY_AGENTS", "SANTAI_SERVER_SESSION_IDLE_SECS"]);
        result
    }

    #[test]
    fn hosted_llm_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SANTAI_REGISTRY_AGENTS", AGENTS);
        env::set_var("SANTAI_LLM_PROVIDER", "groq");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("groq without api key should fail".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("llm.api_key")
                ),
                "validation failure should mention llm.api_key",
            )?;

            env::set_var("SANTAI_LLM_API_KEY", "gsk-test");
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(
                config.llm_base_url().as_deref() == Some("https://api.groq.com/openai/v1"),
                "groq base url should default",
            )
        })();

        clear_vars(&["SANTAI_REGISTRY_AGENTS", "SANTAI_LLM_PROVIDER", "SANTAI_LLM_API_KEY"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SANTAI_REGISTRY_AGENTS", AGENTS);
        env::set_var("SANTAI_SEARCH_API_KEY", "search-secret-value");
        env::set_var("SANTAI_LLM_API_KEY", "llm-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("search-secret-value"), "debug must hide the search key")?;
            ensure(!debug.contains("llm-secret-value"), "debug must hide the llm key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["SANTAI_REGISTRY_AGENTS", "SANTAI_SEARCH_API_KEY", "SANTAI_LLM_API_KEY"]);
        result
    }
}
