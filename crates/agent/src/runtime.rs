use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use santai_core::audit::AuditSink;
use santai_core::config::AppConfig;
use santai_core::domain::session::SessionId;
use santai_core::errors::ApplicationError;
use santai_core::flows::{ConversationState, FlowType};
use santai_core::input::TriggerGrammar;
use santai_core::protocol::Acknowledgment;
use santai_core::registry::StaticAgentRegistry;

use crate::bridge::{AgentBridge, HttpAgentTransport};
use crate::categories::{CategoryProvider, LlmCategoryProvider, StaticCategoryProvider};
use crate::conversation::{FallbackExtractor, LlmPreferenceExtractor, PreferenceExtractor};
use crate::flow::{ConversationFlowManager, Reply};
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{LlmClient, OpenAiCompatibleClient};
use crate::orchestrator::GiftSendingOrchestrator;
use crate::search::HttpProductSearch;
use crate::store::SessionStore;

/// Entry point for inbound chat messages and acknowledgments.
///
/// Messages for one session are handled one at a time; messages for different sessions run
/// concurrently.
pub struct AgentRuntime {
    flow: Arc<ConversationFlowManager>,
    orchestrator: Arc<GiftSendingOrchestrator>,
    guardrails: GuardrailPolicy,
    triggers: TriggerGrammar,
    session_idle: Duration,
}

const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(1_800);

impl AgentRuntime {
    pub fn new(
        flow: Arc<ConversationFlowManager>,
        orchestrator: Arc<GiftSendingOrchestrator>,
    ) -> Self {
        Self {
            flow,
            orchestrator,
            guardrails: GuardrailPolicy::default(),
            triggers: TriggerGrammar::default(),
            session_idle: DEFAULT_SESSION_IDLE,
        }
    }

    pub fn with_session_idle(mut self, idle: Duration) -> Self {
        self.session_idle = idle;
        self
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn with_triggers(mut self, triggers: TriggerGrammar) -> Self {
        self.triggers = triggers;
        self
    }

    /// Wires the production collaborators: the configured model (if any), the HTTP product
    /// search and the HTTP agent transport.
    pub fn from_config(config: &AppConfig, audit: Arc<dyn AuditSink>) -> Result<Self> {
        let llm: Option<Arc<dyn LlmClient>> = OpenAiCompatibleClient::from_config(config)?
            .map(|client| Arc::new(client) as Arc<dyn LlmClient>);

        let extractor = FallbackExtractor::new(llm.clone().map(|client| {
            Arc::new(LlmPreferenceExtractor::new(client)) as Arc<dyn PreferenceExtractor>
        }));
        let categories: Arc<dyn CategoryProvider> = match llm {
            Some(client) => Arc::new(LlmCategoryProvider::new(client)),
            None => Arc::new(StaticCategoryProvider),
        };
        let search = HttpProductSearch::from_config(&config.search)?;

        let flow = Arc::new(ConversationFlowManager::new(
            Arc::new(SessionStore::new()),
            Arc::new(extractor),
            categories,
            Arc::new(search),
            Arc::clone(&audit),
        ));

        let registry = StaticAgentRegistry::from_entries(config.registry.agents.clone());
        let bridge = AgentBridge::new(Arc::new(registry), Arc::new(HttpAgentTransport::new()?))
            .with_timeout(Duration::from_millis(config.bridge.timeout_ms))
            .with_from_agent(config.bridge.from_agent.clone());
        let orchestrator =
            Arc::new(GiftSendingOrchestrator::new(Arc::clone(&flow), Arc::new(bridge), audit));

        let triggers = TriggerGrammar::new(&config.bridge.trigger_prefix)
            .context("compiling send-gift trigger patterns")?;

        Ok(Self::new(flow, orchestrator)
            .with_triggers(triggers)
            .with_session_idle(Duration::from_secs(config.server.session_idle_secs)))
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        self.flow.store()
    }

    pub async fn handle_message(
        &self,
        id: &SessionId,
        text: &str,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        match self.guardrails.evaluate(text) {
            GuardrailDecision::Allow => {}
            GuardrailDecision::Deny { reason_code, user_message, fallback_path }
            | GuardrailDecision::Degrade { reason_code, user_message, fallback_path } => {
                tracing::info!(
                    event_name = "guardrail.intercepted",
                    session_id = %id,
                    correlation_id,
                    reason_code,
                    fallback_path,
                    "message did not reach the conversation"
                );
                let state = self
                    .store()
                    .peek(id)
                    .map_or(ConversationState::Collecting, |session| session.state);
                return Ok(Reply::new(id.clone(), state, user_message));
            }
        }

        let _turn = self.store().begin_turn(id).await;

        if let Some(trigger) = self.triggers.detect(text) {
            tracing::info!(
                event_name = "runtime.send_requested",
                session_id = %id,
                correlation_id,
                recipient = %trigger.recipient,
                "send-gift request detected"
            );
            return self.orchestrator.start_send(id, &trigger, correlation_id).await;
        }

        match self.store().snapshot(id).flow_type {
            FlowType::SendToRecipient => self.orchestrator.handle(id, text, correlation_id).await,
            FlowType::SelfGift => self.flow.handle(id, text, correlation_id).await,
        }
    }

    /// Starts the session over once any in-flight message for it has finished.
    pub async fn reset_session(
        &self,
        id: &SessionId,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        let _turn = self.store().begin_turn(id).await;
        self.flow.reset(id, correlation_id)
    }

    /// Drops sessions nobody has written to within the idle window. Returns how many went.
    pub fn evict_idle_sessions(&self) -> usize {
        let evicted = self.store().evict_idle(self.session_idle);
        if evicted > 0 {
            tracing::info!(
                event_name = "runtime.sessions_evicted",
                evicted,
                idle_secs = self.session_idle.as_secs(),
                "idle sessions dropped"
            );
        }
        evicted
    }

    pub fn session_idle(&self) -> Duration {
        self.session_idle
    }

    /// Attaches a recipient's acknowledgment to the session that sent the gift. Returns that
    /// session, or `None` when no session matches.
    pub fn record_acknowledgment(&self, acknowledgment: Acknowledgment) -> Option<SessionId> {
        let store = self.store();
        let target = match &acknowledgment.session_id {
            Some(id) if store.attach_acknowledgment(id, acknowledgment.clone()) => {
                Some(id.clone())
            }
            _ => store
                .find_notified(&acknowledgment.recipient, &acknowledgment.gift_name)
                .filter(|id| store.attach_acknowledgment(id, acknowledgment.clone())),
        };

        match &target {
            Some(id) => tracing::info!(
                event_name = "bridge.acknowledgment_received",
                session_id = %id,
                recipient = %acknowledgment.recipient,
                gift = %acknowledgment.gift_name,
                "recipient acknowledged gift"
            ),
            None => tracing::warn!(
                event_name = "bridge.acknowledgment_unmatched",
                recipient = %acknowledgment.recipient,
                gift = %acknowledgment.gift_name,
                "acknowledgment matches no session"
            ),
        }
        target
    }
}
