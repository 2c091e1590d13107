//! Messages exchanged with recipients' personal agents.
//!
//! Every message is plain JSON. Optional `session_id` fields let replies that arrive later be
//! tied back to the conversation that caused them.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::candidate::Candidate;
use crate::domain::session::SessionId;

/// Upper bound on waiting for a recipient agent, used when configuration does not override it.
pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_FROM_AGENT: &str = "santa_clause";

pub const PREFERENCE_REQUEST_TEXT: &str = "What would you like as a gift? Please share your \
     interests, preferences, and any gift ideas.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceRequest {
    pub from_agent: String,
    pub recipient: String,
    pub timestamp: DateTime<Utc>,
    pub request_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl PreferenceRequest {
    pub fn new(
        from_agent: impl Into<String>,
        recipient: impl Into<String>,
        session_id: Option<SessionId>,
    ) -> Self {
        Self {
            from_agent: from_agent.into(),
            recipient: recipient.into(),
            timestamp: Utc::now(),
            request_text: PREFERENCE_REQUEST_TEXT.to_string(),
            session_id,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceResponse {
    pub username: String,
    pub interests: Vec<String>,
    pub personality: String,
    pub gift_preferences: String,
    pub budget_range: String,
    pub occasion: String,
    pub specific_requests: String,
}

impl PreferenceResponse {
    /// Generic preferences used when a recipient's agent cannot be reached.
    pub fn fallback(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            interests: ["technology", "books", "music", "art"].map(str::to_string).to_vec(),
            personality: "creative, thoughtful, enjoys learning".to_string(),
            gift_preferences: "books, tech gadgets, art supplies, music accessories".to_string(),
            budget_range: "$25-100".to_string(),
            occasion: "just because".to_string(),
            specific_requests: "something thoughtful and useful".to_string(),
        }
    }

    /// Declared interests followed by the comma-separated gift preferences, deduplicated.
    pub fn all_interests(&self) -> Vec<String> {
        let mut interests: Vec<String> = Vec::new();
        let listed = self.interests.iter().map(String::as_str);
        let preferred = self.gift_preferences.split(',');
        for interest in listed.chain(preferred) {
            let interest = interest.trim().to_lowercase();
            if !interest.is_empty() && !interests.contains(&interest) {
                interests.push(interest);
            }
        }
        interests
    }

    pub fn answers(&self, recipient: &str) -> bool {
        crate::registry::normalize_agent_name(&self.username)
            == crate::registry::normalize_agent_name(recipient)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentNotification {
    pub from_agent: String,
    pub recipient: String,
    pub gift_name: String,
    pub gift_price: Decimal,
    pub gift_description: String,
    pub gift_url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl SentNotification {
    pub fn for_candidate(
        from_agent: impl Into<String>,
        recipient: impl Into<String>,
        candidate: &Candidate,
        session_id: Option<SessionId>,
    ) -> Self {
        Self {
            from_agent: from_agent.into(),
            recipient: recipient.into(),
            gift_name: candidate.name.clone(),
            gift_price: candidate.price,
            gift_description: candidate.description.clone(),
            gift_url: candidate.purchase_url.clone(),
            timestamp: Utc::now(),
            session_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub recipient: String,
    pub gift_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}
