use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::candidate::Candidate;
use crate::domain::preferences::PreferenceRecord;
use crate::flows::states::{ConversationState, FlowType};
use crate::protocol::{Acknowledgment, SentNotification};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Everything known about one conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub state: ConversationState,
    pub flow_type: FlowType,
    pub record: PreferenceRecord,
    /// Categories offered in the current menu, addressed 1-based.
    pub categories: Vec<String>,
    /// Every category offered so far, so "more options" never repeats one.
    pub offered_categories: Vec<String>,
    pub candidates: Vec<Candidate>,
    pub shown_candidates: Vec<String>,
    pub pending_recipient: Option<String>,
    pub selected: Option<Candidate>,
    pub notification: Option<SentNotification>,
    pub acknowledgment: Option<Acknowledgment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: ConversationState::Collecting,
            flow_type: FlowType::SelfGift,
            record: PreferenceRecord::default(),
            categories: Vec::new(),
            offered_categories: Vec::new(),
            candidates: Vec::new(),
            shown_candidates: Vec::new(),
            pending_recipient: None,
            selected: None,
            notification: None,
            acknowledgment: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn offer_categories(&mut self, categories: Vec<String>) {
        for category in &categories {
            if !self.offered_categories.contains(category) {
                self.offered_categories.push(category.clone());
            }
        }
        self.categories = categories;
    }

    pub fn present_candidates(&mut self, candidates: Vec<Candidate>) {
        for candidate in &candidates {
            if !self.shown_candidates.contains(&candidate.name) {
                self.shown_candidates.push(candidate.name.clone());
            }
        }
        self.candidates = candidates;
    }

    /// Switches this session to sending a gift to `recipient`.
    pub fn begin_send(&mut self, recipient: impl Into<String>) {
        self.flow_type = FlowType::SendToRecipient;
        self.pending_recipient = Some(recipient.into());
    }

    /// Drops back to the self-gift flow after a send could not start.
    pub fn abandon_send(&mut self) {
        self.flow_type = FlowType::SelfGift;
        self.pending_recipient = None;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
