use crate::replies;

pub const MAX_MESSAGE_CHARS: usize = 2_000;

/// Phrases other personal agents use when they introduce themselves. Such messages are
/// chatter between agents, not gift requests.
const PEER_ECHO_MARKERS: &[&str] = &[
    "i am devam",
    "i'm devam",
    "my personality is",
    "my essence is",
    "as an ai agent",
    "i am an ai agent",
    "i'm an ai agent",
    "i represent the user",
    "as a personal agent",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Checks applied to each inbound message before it reaches the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_message_chars: usize,
    pub ignore_peer_echoes: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { max_message_chars: MAX_MESSAGE_CHARS, ignore_peer_echoes: true }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, text: &str) -> GuardrailDecision {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return GuardrailDecision::Deny {
                reason_code: "empty_message",
                user_message: "I didn't get a message. Tell me who the gift is for!".to_string(),
                fallback_path: "prompt_again",
            };
        }
        if trimmed.chars().count() > self.max_message_chars {
            return GuardrailDecision::Deny {
                reason_code: "message_too_long",
                user_message: format!(
                    "That message is a bit long for me. Could you keep it under {} characters?",
                    self.max_message_chars
                ),
                fallback_path: "prompt_again",
            };
        }

        let lowered = trimmed.to_lowercase();
        if self.ignore_peer_echoes
            && PEER_ECHO_MARKERS.iter().any(|marker| contains_phrase(&lowered, marker))
        {
            return GuardrailDecision::Degrade {
                reason_code: "peer_agent_echo",
                user_message: replies::peer_echo().to_string(),
                fallback_path: "redirect_to_gift_request",
            };
        }

        GuardrailDecision::Allow
    }
}

/// Whole-word match, so "i am devam" does not fire inside "i am devamitra".
fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(at, _)| {
        let before = text[..at].chars().next_back();
        let after = text[at + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
