use santai_core::config::{AppConfig, LlmProvider, LoadOptions};
use serde::Serialize;

use super::{escape_json, CommandResult};

/// Exit code when at least one readiness check fails.
pub const DOCTOR_FAILED_EXIT: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    pub fn passed(&self) -> bool {
        self.overall_status == CheckStatus::Pass
    }
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report(AppConfig::load(LoadOptions::default()).map_err(|e| e.to_string()));
    let exit_code = if report.passed() { 0 } else { DOCTOR_FAILED_EXIT };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

/// Warnings leave the overall status passing; only failures and skips do not.
pub fn build_report(loaded: Result<AppConfig, String>) -> DoctorReport {
    let mut checks = Vec::new();

    match loaded {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_registry(&config));
            checks.push(check_llm(&config));
            checks.push(check_search(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error,
            });
            for name in ["agent_registry", "llm_provider", "product_search"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let passing = checks
        .iter()
        .all(|check| matches!(check.status, CheckStatus::Pass | CheckStatus::Warn));
    let overall_status = if passing { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if passing {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_registry(config: &AppConfig) -> DoctorCheck {
    let bad: Vec<&str> = config
        .registry
        .agents
        .iter()
        .filter(|(_, url)| !(url.starts_with("http://") || url.starts_with("https://")))
        .map(|(name, _)| name.as_str())
        .collect();

    if config.registry.agents.is_empty() {
        return DoctorCheck {
            name: "agent_registry",
            status: CheckStatus::Fail,
            details: "no agents registered".to_string(),
        };
    }
    if !bad.is_empty() {
        return DoctorCheck {
            name: "agent_registry",
            status: CheckStatus::Fail,
            details: format!("agents without an http(s) url: {}", bad.join(", ")),
        };
    }

    let names: Vec<&str> = config.registry.agents.keys().map(String::as_str).collect();
    DoctorCheck {
        name: "agent_registry",
        status: CheckStatus::Pass,
        details: format!("{} agent(s) registered: {}", names.len(), names.join(", ")),
    }
}

fn check_llm(config: &AppConfig) -> DoctorCheck {
    match config.llm.provider {
        LlmProvider::Disabled => DoctorCheck {
            name: "llm_provider",
            status: CheckStatus::Warn,
            details: "no model configured; preferences come from keyword rules only".to_string(),
        },
        provider => DoctorCheck {
            name: "llm_provider",
            status: CheckStatus::Pass,
            details: format!("{provider:?} using model `{}`", config.llm.model),
        },
    }
}

fn check_search(config: &AppConfig) -> DoctorCheck {
    match config.search.api_key {
        Some(_) => DoctorCheck {
            name: "product_search",
            status: CheckStatus::Pass,
            details: format!("api key present for `{}`", config.search.base_url),
        },
        None => DoctorCheck {
            name: "product_search",
            status: CheckStatus::Warn,
            details: "no api key; searches will fall back to category suggestions".to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
