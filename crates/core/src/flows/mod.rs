pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, GiftFinderFlow, GiftSendingFlow};
pub use states::{ConversationState, FlowContext, FlowEvent, FlowType, TransitionOutcome};
