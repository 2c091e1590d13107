use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    SelfGift,
    SendToRecipient,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Collecting,
    CategorySelection,
    Searching,
    Presenting,
    AwaitingSelection,
    ResolvingRecipient,
    Notifying,
    Completed,
}

impl ConversationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::CategorySelection => "category_selection",
            Self::Searching => "searching",
            Self::Presenting => "presenting",
            Self::AwaitingSelection => "awaiting_selection",
            Self::ResolvingRecipient => "resolving_recipient",
            Self::Notifying => "notifying",
            Self::Completed => "completed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    RequiredFieldsCollected,
    CategoryChosen,
    ResultsReady,
    NoMatches,
    SearchUnavailable,
    PreferencesCorrected,
    MoreOptionsRequested,
    CandidateSelected,
    SendRequested,
    RecipientResolved,
    RecipientUnknown,
    NotificationDispatched,
    ResetRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_required_fields: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationState,
    pub to: ConversationState,
    pub event: FlowEvent,
}
