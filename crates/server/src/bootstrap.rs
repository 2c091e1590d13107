use std::sync::Arc;
use std::time::Duration;

use santai_agent::AgentRuntime;
use santai_core::audit::InMemoryAuditSink;
use santai_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
    pub audit: Arc<InMemoryAuditSink>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent runtime could not be built: {0}")]
    Runtime(#[source] anyhow::Error),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let audit = Arc::new(InMemoryAuditSink::default());
    let runtime =
        AgentRuntime::from_config(&config, audit.clone()).map_err(BootstrapError::Runtime)?;

    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        registered_agents = config.registry.agents.len(),
        bridge_timeout_ms = config.bridge.timeout_ms,
        "agent runtime initialized"
    );

    Ok(Application { config, runtime: Arc::new(runtime), audit })
}

/// Periodically drops sessions idle for longer than the runtime's window.
pub fn spawn_session_sweeper(runtime: Arc<AgentRuntime>) -> JoinHandle<()> {
    let period =
        (runtime.session_idle() / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
    info!(
        event_name = "system.session_sweeper.started",
        correlation_id = "bootstrap",
        period_secs = period.as_secs(),
        "idle session sweeper running"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            runtime.evict_idle_sessions();
        }
    })
}
