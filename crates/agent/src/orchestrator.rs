use std::sync::Arc;

use santai_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use santai_core::domain::candidate::RankingMode;
use santai_core::domain::preferences::PreferenceUpdate;
use santai_core::domain::session::SessionId;
use santai_core::errors::{ApplicationError, DomainError, GiftFlowError};
use santai_core::flows::{ConversationState, FlowEvent};
use santai_core::input::SendTrigger;
use santai_core::protocol::SentNotification;
use santai_core::registry::normalize_agent_name;

use crate::bridge::{AgentBridge, BridgeOutcome, NoResponseReason};
use crate::flow::{ConversationFlowManager, Reply};
use crate::replies;

const ACTOR: &str = "gift-orchestrator";

/// Sends a gift on the user's behalf: asks the recipient's agent what they like, runs the
/// normal search and selection steps, then tells the recipient's agent what was chosen.
pub struct GiftSendingOrchestrator {
    flow: Arc<ConversationFlowManager>,
    bridge: Arc<AgentBridge>,
    audit: Arc<dyn AuditSink>,
}

impl GiftSendingOrchestrator {
    pub fn new(
        flow: Arc<ConversationFlowManager>,
        bridge: Arc<AgentBridge>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { flow, bridge, audit }
    }

    /// Starts a fresh send for `trigger.recipient`, discarding whatever the session held.
    /// A name missing from the registry leaves the session untouched.
    pub async fn start_send(
        &self,
        id: &SessionId,
        trigger: &SendTrigger,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        let store = self.flow.store();
        let recipient = normalize_agent_name(&trigger.recipient);

        if let Err(error) = self.bridge.resolve(&recipient) {
            tracing::info!(
                event_name = "orchestrator.recipient_unknown",
                session_id = %id,
                correlation_id,
                error = %error,
                "send not started"
            );
            return Ok(self.flow.resume(id, &error.user_message()).with_error(error));
        }

        self.flow.reset(id, correlation_id)?;
        store.update(id, |session| session.begin_send(recipient.clone()));

        if !trigger.remainder.is_empty() {
            if let Err(error) = self.flow.absorb(id, &trigger.remainder).await {
                tracing::debug!(
                    event_name = "orchestrator.remainder_ignored",
                    session_id = %id,
                    error = %error,
                    "could not read preferences from the send request"
                );
            }
        }
        if store.get(id).recipient.is_none() {
            store.merge(id, &PreferenceUpdate::default().with_recipient(recipient.clone()));
        }

        self.flow.advance(id, FlowEvent::SendRequested, correlation_id)?;

        let outcome = match self.bridge.request_preferences(&recipient, Some(id)).await {
            Ok(outcome) => outcome,
            Err(error) => return self.recipient_unreachable(id, error, correlation_id),
        };
        self.audit_exchange(id, correlation_id, &recipient, &outcome);

        let (lead, error) = match &outcome {
            BridgeOutcome::Responded(_) => (replies::asked_recipient(&recipient, true), None),
            BridgeOutcome::NoResponse(NoResponseReason::TimedOut) => {
                let error = GiftFlowError::BridgeTimeout {
                    name: recipient.clone(),
                    timeout_ms: self.bridge.timeout().as_millis() as u64,
                };
                (error.user_message(), Some(error))
            }
            BridgeOutcome::NoResponse(_) => (replies::asked_recipient(&recipient, false), None),
        };

        let preferences = outcome.preferences_or_fallback(&recipient);
        store.update(id, |session| session.record.absorb_remote(&preferences));
        self.flow.advance(id, FlowEvent::RecipientResolved, correlation_id)?;

        let reply = self.flow.run_search(id, RankingMode::Weighted, correlation_id).await?;
        let reply = reply.prefixed(&lead);
        Ok(match error {
            Some(error) if reply.error.is_none() => reply.with_error(error),
            _ => reply,
        })
    }

    /// Handles an ordinary message, finishing the send when a candidate gets selected.
    pub async fn handle(
        &self,
        id: &SessionId,
        text: &str,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        let reply = self.flow.handle(id, text, correlation_id).await?;
        if reply.state != ConversationState::Notifying {
            return Ok(reply);
        }
        self.dispatch_notification(id, correlation_id).await
    }

    async fn dispatch_notification(
        &self,
        id: &SessionId,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        let session = self.flow.store().snapshot(id);
        let (Some(candidate), Some(recipient)) = (session.selected, session.pending_recipient)
        else {
            return Err(DomainError::InvariantViolation(
                "notifying without a selected gift and recipient".to_string(),
            )
            .into());
        };

        let notification = SentNotification::for_candidate(
            self.bridge.from_agent(),
            recipient.clone(),
            &candidate,
            Some(id.clone()),
        );
        let delivered = self.bridge.notify_gift_sent(&notification).await;

        self.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                correlation_id,
                "bridge.notification_sent",
                AuditCategory::Bridge,
                ACTOR,
                if delivered { AuditOutcome::Success } else { AuditOutcome::Failed },
            )
            .with_metadata("recipient", recipient.as_str())
            .with_metadata("gift", candidate.name.as_str()),
        );

        if delivered {
            self.flow.store().update(id, |session| session.notification = Some(notification));
        }
        self.flow.advance(id, FlowEvent::NotificationDispatched, correlation_id)?;

        let text = replies::gift_sent(&candidate, &recipient, delivered);
        Ok(Reply::new(id.clone(), ConversationState::Completed, text)
            .with_candidates(vec![candidate]))
    }

    fn recipient_unreachable(
        &self,
        id: &SessionId,
        error: GiftFlowError,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        self.flow.advance(id, FlowEvent::RecipientUnknown, correlation_id)?;
        let store = self.flow.store();
        store.update(id, |session| {
            // The unknown name must not stand in for a real recipient.
            if session.record.recipient == session.pending_recipient {
                session.record.recipient = None;
            }
            session.abandon_send();
        });

        tracing::info!(
            event_name = "orchestrator.recipient_unknown",
            session_id = %id,
            correlation_id,
            error = %error,
            "send abandoned"
        );

        let missing = store.get(id).missing_fields();
        let prompt = replies::missing_fields_prompt(&missing);
        let text = format!("{}\n{prompt}", error.user_message());
        Ok(Reply::new(id.clone(), ConversationState::Collecting, text).with_error(error))
    }

    fn audit_exchange(
        &self,
        id: &SessionId,
        correlation_id: &str,
        recipient: &str,
        outcome: &BridgeOutcome,
    ) {
        let (result, detail) = match outcome {
            BridgeOutcome::Responded(_) => (AuditOutcome::Success, "responded".to_string()),
            BridgeOutcome::NoResponse(reason) => (AuditOutcome::Failed, format!("{reason:?}")),
        };
        self.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                correlation_id,
                "bridge.preferences_requested",
                AuditCategory::Bridge,
                ACTOR,
                result,
            )
            .with_metadata("recipient", recipient)
            .with_metadata("outcome", detail),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use santai_core::audit::{AuditOutcome, InMemoryAuditSink};
    use santai_core::domain::session::SessionId;
    use santai_core::errors::GiftFlowError;
    use santai_core::flows::{ConversationState, FlowType};
    use santai_core::input::TriggerGrammar;
    use santai_core::protocol::PreferenceResponse;
    use santai_core::registry::StaticAgentRegistry;

    use super::GiftSendingOrchestrator;
    use crate::bridge::AgentBridge;
    use crate::search::InMemoryCatalog;
    use crate::testing::{catalog_item, flow_manager, ScriptedTransport, TransportScript};

    fn catalog() -> Arc<InMemoryCatalog> {
        Arc::new(InMemoryCatalog::new(vec![
            catalog_item("Mechanical Keyboard", 85, 4.6, "tech gadget for typing"),
            catalog_item("Wireless Earbuds", 60, 4.4, "technology for music lovers"),
            catalog_item("Hardcover Classics", 40, 4.8, "books set"),
            catalog_item("Drone", 450, 4.9, "tech toy"),
        ]))
    }

    fn orchestrator(
        script: TransportScript,
    ) -> (GiftSendingOrchestrator, Arc<ScriptedTransport>, Arc<InMemoryAuditSink>) {
        let audit = Arc::new(InMemoryAuditSink::default());
        let transport = Arc::new(ScriptedTransport::new(script));
        let registry = StaticAgentRegistry::new().with_agent("devam", "http://devam.local");
        let bridge = AgentBridge::new(Arc::new(registry), transport.clone())
            .with_timeout(Duration::from_secs(5));
        let flow = Arc::new(flow_manager(catalog(), audit.clone()));
        let orchestrator = GiftSendingOrchestrator::new(flow, Arc::new(bridge), audit.clone());
        (orchestrator, transport, audit)
    }

    fn devam_answer() -> PreferenceResponse {
        PreferenceResponse {
            username: "devam".to_string(),
            interests: vec!["tech".to_string()],
            gift_preferences: "gadgets".to_string(),
            budget_range: "$50-100".to_string(),
            ..PreferenceResponse::default()
        }
    }

    fn trigger(text: &str) -> santai_core::input::SendTrigger {
        TriggerGrammar::default().detect(text).expect("text is a send request")
    }

    #[tokio::test]
    async fn send_uses_recipient_answer_and_notifies_on_selection() {
        let (orchestrator, transport, audit) =
            orchestrator(TransportScript::Respond(devam_answer()));
        let id = SessionId::from("s-send");

        let reply = orchestrator
            .start_send(&id, &trigger("@Santa Clause, send a gift to @devam"), "req-1")
            .await
            .expect("send starts");

        assert_eq!(reply.state, ConversationState::Presenting);
        assert!(reply.text.starts_with("I checked with @devam's agent"));
        assert_eq!(reply.candidates[0].name, "Mechanical Keyboard");
        assert!(reply.candidates.iter().all(|candidate| candidate.name != "Drone"));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1.recipient, "devam");
        assert_eq!(requests[0].1.session_id, Some(id.clone()));

        let done = orchestrator.handle(&id, "1", "req-2").await.expect("selection");

        assert_eq!(done.state, ConversationState::Completed);
        assert!(done.text.contains("let @devam's agent know"));
        let notifications = transport.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].gift_name, "Mechanical Keyboard");
        assert_eq!(notifications[0].session_id, Some(id.clone()));

        let session = orchestrator.flow.store().snapshot(&id);
        assert_eq!(session.notification.as_ref(), Some(&notifications[0]));
        let bridge_events: Vec<_> = audit
            .events_for(&id)
            .into_iter()
            .filter(|event| event.event_type.starts_with("bridge."))
            .collect();
        assert_eq!(bridge_events.len(), 2);
        assert!(bridge_events.iter().all(|event| event.outcome == AuditOutcome::Success));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_recipient_falls_back_to_default_preferences() {
        let (orchestrator, _transport, _audit) = orchestrator(TransportScript::Hang);
        let id = SessionId::from("s-timeout");

        let reply = orchestrator
            .start_send(&id, &trigger("@santa clause send a gift to devam"), "req-1")
            .await
            .expect("timeout is not fatal");

        assert_eq!(reply.state, ConversationState::Presenting);
        assert_eq!(
            reply.error,
            Some(GiftFlowError::BridgeTimeout { name: "devam".to_string(), timeout_ms: 5_000 })
        );
        let record = orchestrator.flow.store().get(&id);
        assert_eq!(record.interests[0], "technology");
        assert_eq!(record.budget.to_string(), "$25-$100");
    }

    #[tokio::test]
    async fn unknown_recipient_returns_to_self_gift_collection() {
        let (orchestrator, transport, _audit) =
            orchestrator(TransportScript::Respond(devam_answer()));
        let id = SessionId::from("s-unknown");

        let reply = orchestrator
            .start_send(&id, &trigger("@santa clause send a gift to @zed"), "req-1")
            .await
            .expect("unknown recipient is recoverable");

        assert_eq!(reply.state, ConversationState::Collecting);
        assert_eq!(reply.error, Some(GiftFlowError::RecipientUnknown { name: "zed".to_string() }));
        assert_eq!(transport.preference_calls(), 0);
        let session = orchestrator.flow.store().snapshot(&id);
        assert_eq!(session.flow_type, FlowType::SelfGift);
        assert!(session.pending_recipient.is_none());
        assert!(session.record.recipient.is_none());
    }

    #[tokio::test]
    async fn unknown_recipient_leaves_an_ongoing_conversation_intact() {
        let (orchestrator, transport, audit) =
            orchestrator(TransportScript::Respond(devam_answer()));
        let id = SessionId::from("s-midway");
        let offered = orchestrator
            .flow
            .handle(&id, "birthday gift for my friend who likes hiking, budget $50-100", "req-1")
            .await
            .expect("turn");
        assert_eq!(offered.state, ConversationState::CategorySelection);
        let events_before = audit.events_for(&id).len();

        let reply = orchestrator
            .start_send(&id, &trigger("@santa clause send a gift to @zed"), "req-2")
            .await
            .expect("unknown recipient is recoverable");

        assert_eq!(reply.state, ConversationState::CategorySelection);
        assert_eq!(reply.categories, offered.categories);
        assert_eq!(reply.error, Some(GiftFlowError::RecipientUnknown { name: "zed".to_string() }));
        assert_eq!(transport.preference_calls(), 0);
        assert_eq!(audit.events_for(&id).len(), events_before);

        let session = orchestrator.flow.store().snapshot(&id);
        assert_eq!(session.state, ConversationState::CategorySelection);
        assert_eq!(session.flow_type, FlowType::SelfGift);
        assert_eq!(session.record.occasion.as_deref(), Some("birthday"));
        assert_eq!(session.record.recipient.as_deref(), Some("friend"));
        assert_eq!(session.categories, offered.categories);

        let picked = orchestrator.flow.handle(&id, "1", "req-3").await.expect("turn");
        assert_ne!(picked.state, ConversationState::Collecting);
    }

    #[tokio::test]
    async fn failed_notification_still_completes_the_selection() {
        let (orchestrator, _transport, _audit) = orchestrator(TransportScript::Fail);
        let id = SessionId::from("s-fail");
        orchestrator
            .start_send(&id, &trigger("@santa clause, send a gift to @devam"), "req-1")
            .await
            .expect("send starts");

        let done = orchestrator.handle(&id, "1", "req-2").await.expect("selection");

        assert_eq!(done.state, ConversationState::Completed);
        assert!(done.text.contains("couldn't reach @devam's agent"));
        assert!(orchestrator.flow.store().snapshot(&id).notification.is_none());
    }
}
