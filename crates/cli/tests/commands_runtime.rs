use std::env;
use std::sync::{Mutex, OnceLock};

use santai_cli::commands::{config, doctor};
use serde_json::Value;

const AGENTS: &str = "devam=http://127.0.0.1:8002,lulu=http://127.0.0.1:8003";

#[test]
fn config_renders_redacted_effective_values() {
    with_env(
        &[("SANTAI_REGISTRY_AGENTS", AGENTS), ("SANTAI_SEARCH_API_KEY", "owk-0123456789abcdef")],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0, "expected config to render");

            assert!(result.output.contains("registry.agents = devam=http://127.0.0.1:8002"));
            assert!(result.output.contains("(source: env (SANTAI_REGISTRY_AGENTS))"));
            assert!(result.output.contains("search.api_key = owk-***"));
            assert!(!result.output.contains("0123456789abcdef"));
        },
    );
}

#[test]
fn config_reports_validation_failure_without_agents() {
    with_env(&[], || {
        let result = config::run();
        assert_eq!(result.exit_code, config::CONFIG_INVALID_EXIT);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_with_registered_agents() {
    with_env(&[("SANTAI_REGISTRY_AGENTS", AGENTS)], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected doctor to pass");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(payload["checks"][1]["name"], "agent_registry");
        assert_eq!(payload["checks"][1]["details"], "2 agent(s) registered: devam, lulu");
    });
}

#[test]
fn doctor_fails_when_config_invalid() {
    with_env(&[("SANTAI_BRIDGE_TIMEOUT_MS", "soon")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, doctor::DOCTOR_FAILED_EXIT);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] agent_registry:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SANTAI_LLM_PROVIDER",
        "SANTAI_LLM_API_KEY",
        "SANTAI_LLM_BASE_URL",
        "SANTAI_LLM_MODEL",
        "SANTAI_LLM_TIMEOUT_SECS",
        "SANTAI_LLM_MAX_RETRIES",
        "SANTAI_SEARCH_BASE_URL",
        "SANTAI_SEARCH_API_KEY",
        "SANTAI_SEARCH_COUNTRY",
        "SANTAI_SEARCH_TIMEOUT_SECS",
        "SANTAI_BRIDGE_TIMEOUT_MS",
        "SANTAI_BRIDGE_FROM_AGENT",
        "SANTAI_BRIDGE_TRIGGER_PREFIX",
        "SANTAI_REGISTRY_AGENTS",
        "SANTAI_SERVER_BIND_ADDRESS",
        "SANTAI_SERVER_PORT",
        "SANTAI_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "SANTAI_SERVER_SESSION_IDLE_SECS",
        "SANTAI_LOGGING_LEVEL",
        "SANTAI_LOGGING_FORMAT",
        "SANTAI_LOG_LEVEL",
        "SANTAI_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
