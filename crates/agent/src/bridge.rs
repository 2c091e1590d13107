use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use santai_core::domain::session::SessionId;
use santai_core::errors::GiftFlowError;
use santai_core::protocol::{
    PreferenceRequest, PreferenceResponse, SentNotification, DEFAULT_BRIDGE_TIMEOUT,
    DEFAULT_FROM_AGENT,
};
use santai_core::registry::{normalize_agent_name, AgentAddress, AgentRegistry};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not reach agent at `{address}`: {message}")]
    Unreachable { address: String, message: String },
    #[error("agent at `{address}` answered with status {status}")]
    Status { address: String, status: u16 },
    #[error("agent at `{address}` sent an unreadable answer: {message}")]
    Decode { address: String, message: String },
}

/// How messages physically reach a personal agent.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn request_preferences(
        &self,
        address: &AgentAddress,
        request: &PreferenceRequest,
    ) -> Result<PreferenceResponse, TransportError>;

    async fn deliver_notification(
        &self,
        address: &AgentAddress,
        notification: &SentNotification,
    ) -> Result<(), TransportError>;
}

/// JSON over HTTP: `POST {address}/gift/preferences` and `POST {address}/gift/notifications`.
pub struct HttpAgentTransport {
    client: Client,
}

impl HttpAgentTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("santai/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn endpoint(address: &AgentAddress, path: &str) -> String {
        format!("{}/gift/{path}", address.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    async fn request_preferences(
        &self,
        address: &AgentAddress,
        request: &PreferenceRequest,
    ) -> Result<PreferenceResponse, TransportError> {
        let response = self
            .client
            .post(Self::endpoint(address, "preferences"))
            .json(request)
            .send()
            .await
            .map_err(|error| TransportError::Unreachable {
                address: address.to_string(),
                message: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                address: address.to_string(),
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|error| TransportError::Decode {
            address: address.to_string(),
            message: error.to_string(),
        })
    }

    async fn deliver_notification(
        &self,
        address: &AgentAddress,
        notification: &SentNotification,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .post(Self::endpoint(address, "notifications"))
            .json(notification)
            .send()
            .await
            .map_err(|error| TransportError::Unreachable {
                address: address.to_string(),
                message: error.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status { address: address.to_string(), status: status.as_u16() })
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NoResponseReason {
    TimedOut,
    DeliveryFailed(String),
    /// An answer arrived but on behalf of someone else.
    Mismatched { username: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeOutcome {
    Responded(PreferenceResponse),
    NoResponse(NoResponseReason),
}

impl BridgeOutcome {
    /// The recipient's answer, or the generic preference set when there was none.
    pub fn preferences_or_fallback(self, recipient: &str) -> PreferenceResponse {
        match self {
            Self::Responded(response) => response,
            Self::NoResponse(_) => PreferenceResponse::fallback(recipient),
        }
    }
}

/// Request/response exchange with recipients' personal agents.
///
/// Delivery is at most once: a request that fails or times out is not retried, and the
/// caller continues with default preferences. Every network wait is bounded by `timeout`.
/// Gift notifications are one-way; acknowledgments arrive through a separate inbound path.
pub struct AgentBridge {
    registry: Arc<dyn AgentRegistry>,
    transport: Arc<dyn AgentTransport>,
    timeout: Duration,
    from_agent: String,
}

impl AgentBridge {
    pub fn new(registry: Arc<dyn AgentRegistry>, transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            registry,
            transport,
            timeout: DEFAULT_BRIDGE_TIMEOUT,
            from_agent: DEFAULT_FROM_AGENT.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_from_agent(mut self, from_agent: impl Into<String>) -> Self {
        self.from_agent = from_agent.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn from_agent(&self) -> &str {
        &self.from_agent
    }

    pub fn resolve(&self, recipient: &str) -> Result<AgentAddress, GiftFlowError> {
        self.registry.resolve(recipient).ok_or_else(|| GiftFlowError::RecipientUnknown {
            name: normalize_agent_name(recipient),
        })
    }

    /// Asks `recipient`'s agent for their preferences. Only an unregistered name is an error;
    /// every other failure is reported as `NoResponse`.
    pub async fn request_preferences(
        &self,
        recipient: &str,
        session_id: Option<&SessionId>,
    ) -> Result<BridgeOutcome, GiftFlowError> {
        let address = self.resolve(recipient)?;
        let request =
            PreferenceRequest::new(self.from_agent.clone(), recipient, session_id.cloned());
        let session = session_id.map(SessionId::as_str).unwrap_or_default();

        tracing::info!(
            event_name = "bridge.preferences_requested",
            recipient,
            address = %address,
            session_id = session,
            "asking recipient agent for preferences"
        );

        let exchange = self.transport.request_preferences(&address, &request);
        let outcome = match tokio::time::timeout(self.timeout, exchange).await {
            Err(_) => BridgeOutcome::NoResponse(NoResponseReason::TimedOut),
            Ok(Err(error)) => BridgeOutcome::NoResponse(NoResponseReason::DeliveryFailed(
                error.to_string(),
            )),
            Ok(Ok(response)) if !response.answers(recipient) => {
                BridgeOutcome::NoResponse(NoResponseReason::Mismatched {
                    username: response.username,
                })
            }
            Ok(Ok(response)) => BridgeOutcome::Responded(response),
        };

        match &outcome {
            BridgeOutcome::Responded(_) => tracing::info!(
                event_name = "bridge.preferences_received",
                recipient,
                session_id = session,
                "recipient agent answered"
            ),
            BridgeOutcome::NoResponse(reason) => tracing::warn!(
                event_name = "bridge.no_response",
                recipient,
                session_id = session,
                timeout_ms = self.timeout.as_millis() as u64,
                reason = ?reason,
                "no usable answer from recipient agent, using default preferences"
            ),
        }

        Ok(outcome)
    }

    /// Sends the gift notification once. Failures are logged and reported as `false`.
    pub async fn notify_gift_sent(&self, notification: &SentNotification) -> bool {
        let address = match self.resolve(&notification.recipient) {
            Ok(address) => address,
            Err(error) => {
                tracing::warn!(
                    event_name = "bridge.notification_failed",
                    recipient = %notification.recipient,
                    error = %error,
                    "gift notification not sent"
                );
                return false;
            }
        };

        let delivery = self.transport.deliver_notification(&address, notification);
        let failure = match tokio::time::timeout(self.timeout, delivery).await {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error.to_string()),
            Err(_) => Some(format!("timed out after {}ms", self.timeout.as_millis())),
        };

        match failure {
            None => {
                tracing::info!(
                    event_name = "bridge.notification_sent",
                    recipient = %notification.recipient,
                    gift = %notification.gift_name,
                    "gift notification delivered"
                );
                true
            }
            Some(error) => {
                tracing::warn!(
                    event_name = "bridge.notification_failed",
                    recipient = %notification.recipient,
                    error = %error,
                    "gift notification not delivered"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use santai_core::domain::session::SessionId;
    use santai_core::errors::GiftFlowError;
    use santai_core::protocol::{PreferenceResponse, SentNotification};
    use santai_core::registry::{AgentAddress, StaticAgentRegistry};
    use tokio::time::Instant;

    use super::{AgentBridge, BridgeOutcome, HttpAgentTransport, NoResponseReason};
    use crate::testing::{candidate, ScriptedTransport, TransportScript};

    fn bridge(transport: Arc<ScriptedTransport>) -> AgentBridge {
        let registry = StaticAgentRegistry::new()
            .with_agent("devam", "http://devam.local")
            .with_agent("parth", "http://parth.local");
        AgentBridge::new(Arc::new(registry), transport).with_timeout(Duration::from_secs(5))
    }

    fn devam_answer() -> PreferenceResponse {
        PreferenceResponse {
            username: "devam".to_string(),
            interests: vec!["tech".to_string()],
            ..PreferenceResponse::default()
        }
    }

    #[tokio::test]
    async fn unknown_recipient_is_rejected_without_transport_call() {
        let transport = Arc::new(ScriptedTransport::new(TransportScript::Respond(devam_answer())));
        let error = bridge(Arc::clone(&transport))
            .request_preferences("@zed", None)
            .await
            .expect_err("zed is not registered");

        assert_eq!(error, GiftFlowError::RecipientUnknown { name: "zed".to_string() });
        assert_eq!(transport.preference_calls(), 0);
    }

    #[tokio::test]
    async fn matching_answer_is_returned() {
        let transport = Arc::new(ScriptedTransport::new(TransportScript::Respond(devam_answer())));
        let outcome = bridge(Arc::clone(&transport))
            .request_preferences("Devam", Some(&SessionId::from("s-1")))
            .await
            .expect("devam is registered");

        assert_eq!(outcome, BridgeOutcome::Responded(devam_answer()));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, AgentAddress("http://devam.local".to_string()));
        assert_eq!(requests[0].1.session_id, Some(SessionId::from("s-1")));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_agent_times_out_at_the_bound() {
        let transport = Arc::new(ScriptedTransport::new(TransportScript::Hang));
        let started = Instant::now();
        let outcome = bridge(Arc::clone(&transport))
            .request_preferences("devam", None)
            .await
            .expect("devam is registered");

        assert_eq!(outcome, BridgeOutcome::NoResponse(NoResponseReason::TimedOut));
        assert!(started.elapsed() <= Duration::from_secs(5) + Duration::from_millis(10));
        assert_eq!(transport.preference_calls(), 1);

        let fallback = outcome.preferences_or_fallback("devam");
        assert_eq!(fallback, PreferenceResponse::fallback("devam"));
    }

    #[tokio::test]
    async fn answer_for_someone_else_is_ignored() {
        let transport = Arc::new(ScriptedTransport::new(TransportScript::Respond(devam_answer())));
        let outcome = bridge(transport)
            .request_preferences("parth", None)
            .await
            .expect("parth is registered");

        assert_eq!(
            outcome,
            BridgeOutcome::NoResponse(NoResponseReason::Mismatched {
                username: "devam".to_string()
            })
        );
    }

    #[tokio::test]
    async fn delivery_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(TransportScript::Fail));
        let outcome = bridge(Arc::clone(&transport))
            .request_preferences("devam", None)
            .await
            .expect("devam is registered");

        assert!(matches!(outcome, BridgeOutcome::NoResponse(NoResponseReason::DeliveryFailed(_))));
        assert_eq!(transport.preference_calls(), 1);
    }

    #[tokio::test]
    async fn notification_is_delivered_once() {
        let transport = Arc::new(ScriptedTransport::new(TransportScript::Respond(devam_answer())));
        let gift = candidate("Speaker", 45, 4.5);
        let notification = SentNotification::for_candidate("santa_clause", "devam", &gift, None);

        assert!(bridge(Arc::clone(&transport)).notify_gift_sent(&notification).await);
        assert_eq!(transport.notifications(), vec![notification]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_notification_is_abandoned() {
        let transport = Arc::new(ScriptedTransport::new(TransportScript::Hang));
        let gift = candidate("Speaker", 45, 4.5);
        let notification = SentNotification::for_candidate("santa_clause", "devam", &gift, None);

        assert!(!bridge(transport).notify_gift_sent(&notification).await);
    }

    #[test]
    fn http_endpoints_are_joined_to_the_address() {
        let address = AgentAddress("http://devam.local:8002/".to_string());
        assert_eq!(
            HttpAgentTransport::endpoint(&address, "preferences"),
            "http://devam.local:8002/gift/preferences"
        );
    }
}
