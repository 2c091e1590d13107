use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use santai_agent::store::StoreStats;
use santai_agent::AgentRuntime;
use santai_core::audit::InMemoryAuditSink;
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    runtime: Arc<AgentRuntime>,
    registered_agents: usize,
    audit: Arc<InMemoryAuditSink>,
}

impl HealthState {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        registered_agents: usize,
        audit: Arc<InMemoryAuditSink>,
    ) -> Self {
        Self { runtime, registered_agents, audit }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub registry: HealthCheck,
    pub sessions: StoreStats,
    pub audit_events: usize,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let registry = registry_check(state.registered_agents);
    let healthy = registry.status == "ok";

    if !healthy {
        warn!(
            event_name = "system.health.degraded",
            correlation_id = "health",
            detail = %registry.detail,
            "health check reported degraded registry"
        );
    }

    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        service: HealthCheck { status: "ok", detail: "santai-server running".to_string() },
        registry,
        sessions: state.runtime.store().stats(),
        audit_events: state.audit.events().len(),
        checked_at: Utc::now().to_rfc3339(),
    };
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (status, Json(response))
}

fn registry_check(registered_agents: usize) -> HealthCheck {
    match registered_agents {
        0 => HealthCheck { status: "error", detail: "no agents registered".to_string() },
        1 => HealthCheck { status: "ok", detail: "1 agent registered".to_string() },
        count => HealthCheck { status: "ok", detail: format!("{count} agents registered") },
    }
}
