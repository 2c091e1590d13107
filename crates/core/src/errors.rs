use thiserror::Error;

use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures a conversation recovers from. None of them end the session.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GiftFlowError {
    #[error("no agent is registered for `{name}`")]
    RecipientUnknown { name: String },
    #[error("agent `{name}` did not answer within {timeout_ms}ms")]
    BridgeTimeout { name: String, timeout_ms: u64 },
    #[error("product search unavailable: {0}")]
    SearchUnavailable(String),
    #[error("preference extraction unavailable: {0}")]
    ExtractionUnavailable(String),
    #[error("selection `{input}` is not between 1 and {max}")]
    InvalidSelection { input: String, max: usize },
}

impl GiftFlowError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RecipientUnknown { .. } => "recipient_unknown",
            Self::BridgeTimeout { .. } => "bridge_timeout",
            Self::SearchUnavailable(_) => "search_unavailable",
            Self::ExtractionUnavailable(_) => "extraction_unavailable",
            Self::InvalidSelection { .. } => "invalid_selection",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::RecipientUnknown { name } => format!(
                "I don't know how to reach @{name}. Check the name, or tell me about the \
                 gift and I'll help you pick it yourself."
            ),
            Self::BridgeTimeout { name, .. } => format!(
                "@{name}'s agent didn't answer in time, so I'm going with some popular picks."
            ),
            Self::SearchUnavailable(_) => {
                "The product search is having trouble right now. Pick a category and I'll \
                 try again."
                    .to_string()
            }
            Self::ExtractionUnavailable(_) => {
                "I couldn't quite follow that. Could you answer the questions below?".to_string()
            }
            Self::InvalidSelection { max, .. } => {
                format!("Please pick a number between 1 and {max}.")
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Flow(#[from] GiftFlowError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<FlowTransitionError> for ApplicationError {
    fn from(value: FlowTransitionError) -> Self {
        Self::Domain(DomainError::FlowTransition(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(DomainError::FlowTransition(_))
            | ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Flow(
                error @ (GiftFlowError::RecipientUnknown { .. }
                | GiftFlowError::InvalidSelection { .. }),
            ) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Flow(error) => Self::ServiceUnavailable {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, GiftFlowError, InterfaceError};
    use crate::flows::{ConversationState, FlowEvent, FlowTransitionError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "session without id".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn flow_transition_error_is_a_domain_error() {
        let error = ApplicationError::from(FlowTransitionError::InvalidTransition {
            state: ConversationState::Completed,
            event: FlowEvent::CategoryChosen,
        });

        assert!(matches!(error, ApplicationError::Domain(DomainError::FlowTransition(_))));
    }

    #[test]
    fn outage_maps_to_service_unavailable() {
        let interface = ApplicationError::from(GiftFlowError::SearchUnavailable(
            "catalog returned 503".to_owned(),
        ))
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn unknown_recipient_maps_to_bad_request() {
        let interface =
            ApplicationError::from(GiftFlowError::RecipientUnknown { name: "zed".to_owned() })
                .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::Configuration("registry is empty".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn gift_flow_errors_have_actionable_user_messages() {
        let invalid = GiftFlowError::InvalidSelection { input: "7".to_owned(), max: 5 };
        assert_eq!(invalid.user_message(), "Please pick a number between 1 and 5.");
        assert_eq!(invalid.code(), "invalid_selection");

        let unknown = GiftFlowError::RecipientUnknown { name: "zed".to_owned() };
        assert!(unknown.user_message().contains("@zed"));
    }
}
