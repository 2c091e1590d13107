use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{ConversationState, FlowContext, FlowEvent, FlowType, TransitionOutcome};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> ConversationState;
    fn transition(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// A user looking for a gift themselves.
#[derive(Clone, Debug, Default)]
pub struct GiftFinderFlow;

impl FlowDefinition for GiftFinderFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::SelfGift
    }

    fn initial_state(&self) -> ConversationState {
        ConversationState::Collecting
    }

    fn transition(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_gift(FlowType::SelfGift, current, event, context)
    }
}

/// A user asking the agent to send a gift to someone with a registered agent.
#[derive(Clone, Debug, Default)]
pub struct GiftSendingFlow;

impl FlowDefinition for GiftSendingFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::SendToRecipient
    }

    fn initial_state(&self) -> ConversationState {
        ConversationState::Collecting
    }

    fn transition(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_gift(FlowType::SendToRecipient, current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> ConversationState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ConversationState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.session_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("flow_type", format!("{:?}", self.flow_type()))
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.session_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<GiftFinderFlow> {
    fn default() -> Self {
        Self::new(GiftFinderFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required fields before transition from {state:?}: {missing_fields:?}")]
    MissingRequiredFields { state: ConversationState, missing_fields: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: ConversationState, event: FlowEvent },
}

fn transition_gift(
    flow_type: FlowType,
    current: &ConversationState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use ConversationState::{
        AwaitingSelection, CategorySelection, Collecting, Completed, Notifying, Presenting,
        ResolvingRecipient, Searching,
    };
    use FlowEvent::{
        CandidateSelected, CategoryChosen, MoreOptionsRequested, NoMatches,
        NotificationDispatched, PreferencesCorrected, RecipientResolved, RecipientUnknown,
        RequiredFieldsCollected, ResetRequested, ResultsReady, SearchUnavailable, SendRequested,
    };

    let sending = flow_type == FlowType::SendToRecipient;

    let to = match (current, event) {
        (_, ResetRequested) => Collecting,
        (Collecting, RequiredFieldsCollected) => {
            if !context.missing_required_fields.is_empty() {
                return Err(FlowTransitionError::MissingRequiredFields {
                    state: *current,
                    missing_fields: context.missing_required_fields.clone(),
                });
            }
            CategorySelection
        }
        (CategorySelection, CategoryChosen) => Searching,
        (Searching, ResultsReady) => Presenting,
        (Searching, NoMatches) | (Searching, SearchUnavailable) => CategorySelection,
        (Presenting, PreferencesCorrected) | (AwaitingSelection, PreferencesCorrected) => {
            AwaitingSelection
        }
        (Presenting, MoreOptionsRequested) | (AwaitingSelection, MoreOptionsRequested) => {
            Searching
        }
        (Presenting, CandidateSelected) | (AwaitingSelection, CandidateSelected) => {
            if sending {
                Notifying
            } else {
                Completed
            }
        }
        (Collecting, SendRequested) if sending => ResolvingRecipient,
        (ResolvingRecipient, RecipientResolved) if sending => Searching,
        (ResolvingRecipient, RecipientUnknown) if sending => Collecting,
        (Notifying, NotificationDispatched) if sending => Completed,
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event })
}
