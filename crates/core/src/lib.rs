//! Domain model for the gift agent: preference records, budgets, the conversation state
//! machine, the agent registry and the wire protocol spoken with recipients' agents.
//!
//! Everything here is synchronous and free of I/O; `santai-agent` drives it.

pub mod audit;
pub mod budget;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod input;
pub mod protocol;
pub mod registry;

pub use budget::{parse_budget, Budget};
pub use domain::candidate::{rank_candidates, CatalogItem, Candidate, RankingMode};
pub use domain::preferences::{
    FieldUpdate, MergeReport, PreferenceField, PreferenceRecord, PreferenceUpdate, RequiredField,
};
pub use domain::session::{Session, SessionId};
pub use errors::{ApplicationError, DomainError, GiftFlowError, InterfaceError};
pub use flows::{ConversationState, FlowType};
pub use protocol::{
    Acknowledgment, PreferenceRequest, PreferenceResponse, SentNotification,
    DEFAULT_BRIDGE_TIMEOUT,
};
pub use registry::{AgentAddress, AgentRegistry, StaticAgentRegistry};
