//! The gift agent's async side: preference extraction, category suggestions, product search,
//! the per-session store, the bridge to recipients' agents, and the flow manager and
//! orchestrator that drive a conversation from first message to a chosen gift.
//!
//! Model calls only ever translate text into structured preferences or category names.
//! Budgets, ranking and state transitions are decided by `santai-core`.

pub mod bridge;
pub mod categories;
pub mod conversation;
pub mod flow;
pub mod guardrails;
pub mod llm;
pub mod orchestrator;
pub mod replies;
pub mod runtime;
pub mod search;
pub mod store;

#[cfg(test)]
mod testing;

pub use flow::{ConversationFlowManager, Reply};
pub use orchestrator::GiftSendingOrchestrator;
pub use runtime::AgentRuntime;
pub use store::SessionStore;
