use std::env;
use std::fs;
use std::path::PathBuf;

use santai_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use super::CommandResult;

/// Exit code for a configuration that fails to load or validate.
pub const CONFIG_INVALID_EXIT: u8 = 2;

/// The config file found on disk, kept for source attribution.
pub struct ConfigFile {
    pub path: PathBuf,
    pub doc: Value,
}

pub fn run() -> CommandResult {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => CommandResult::text(render(&config, load_config_file().as_ref())),
        Err(error) => CommandResult::failure(
            "config",
            "config_validation",
            format!("config validation failed: {error}"),
            CONFIG_INVALID_EXIT,
        ),
    }
}

/// One line per setting, with secrets redacted and the layer that supplied each value.
pub fn render(config: &AppConfig, file: Option<&ConfigFile>) -> String {
    let secret = |value: Option<&secrecy::SecretString>| match value {
        Some(value) => redact_secret(value.expose_secret()),
        None => "<unset>".to_string(),
    };

    let agents = if config.registry.agents.is_empty() {
        "<none>".to_string()
    } else {
        config
            .registry
            .agents
            .iter()
            .map(|(name, url)| format!("{name}={url}"))
            .collect::<Vec<_>>()
            .join(",")
    };

    let entries: Vec<(&str, &str, String)> = vec![
        ("llm.provider", "SANTAI_LLM_PROVIDER", format!("{:?}", config.llm.provider)),
        ("llm.model", "SANTAI_LLM_MODEL", config.llm.model.clone()),
        (
            "llm.base_url",
            "SANTAI_LLM_BASE_URL",
            config.llm_base_url().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("llm.api_key", "SANTAI_LLM_API_KEY", secret(config.llm.api_key.as_ref())),
        ("llm.timeout_secs", "SANTAI_LLM_TIMEOUT_SECS", config.llm.timeout_secs.to_string()),
        ("llm.max_retries", "SANTAI_LLM_MAX_RETRIES", config.llm.max_retries.to_string()),
        ("search.base_url", "SANTAI_SEARCH_BASE_URL", config.search.base_url.clone()),
        ("search.api_key", "SANTAI_SEARCH_API_KEY", secret(config.search.api_key.as_ref())),
        ("search.country", "SANTAI_SEARCH_COUNTRY", config.search.country.clone()),
        (
            "search.timeout_secs",
            "SANTAI_SEARCH_TIMEOUT_SECS",
            config.search.timeout_secs.to_string(),
        ),
        ("bridge.timeout_ms", "SANTAI_BRIDGE_TIMEOUT_MS", config.bridge.timeout_ms.to_string()),
        ("bridge.from_agent", "SANTAI_BRIDGE_FROM_AGENT", config.bridge.from_agent.clone()),
        (
            "bridge.trigger_prefix",
            "SANTAI_BRIDGE_TRIGGER_PREFIX",
            config.bridge.trigger_prefix.clone(),
        ),
        ("registry.agents", "SANTAI_REGISTRY_AGENTS", agents),
        ("server.bind_address", "SANTAI_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        ("server.port", "SANTAI_SERVER_PORT", config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            "SANTAI_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        (
            "server.session_idle_secs",
            "SANTAI_SERVER_SESSION_IDLE_SECS",
            config.server.session_idle_secs.to_string(),
        ),
        ("logging.level", "SANTAI_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "SANTAI_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, env_key, value) in entries {
        lines.push(format!("- {key} = {value} (source: {})", field_source(key, env_key, file)));
    }
    lines.join("\n")
}

fn load_config_file() -> Option<ConfigFile> {
    let path =
        ["santai.toml", "config/santai.toml"].into_iter().map(PathBuf::from).find(|p| p.exists())?;
    let doc = fs::read_to_string(&path).ok()?.parse::<Value>().ok()?;
    Some(ConfigFile { path, doc })
}

fn field_source(key_path: &str, env_key: &str, file: Option<&ConfigFile>) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(file) = file {
        if contains_path(&file.doc, key_path) {
            return format!("file ({})", file.path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps at most the first four characters of a key so operators can tell keys apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }
    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}
