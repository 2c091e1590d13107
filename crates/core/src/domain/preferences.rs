use serde::{Deserialize, Serialize};

use crate::budget::{parse_budget, Budget};
use crate::protocol::PreferenceResponse;

/// Accumulated knowledge about the gift being looked for.
///
/// Scalar fields only ever move from empty to non-empty or from one non-empty value to
/// another; interests are an ordered set that only grows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub occasion: Option<String>,
    pub recipient: Option<String>,
    pub interests: Vec<String>,
    pub budget: Budget,
    pub category: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    #[default]
    Unchanged,
    Set(T),
}

impl<T> FieldUpdate<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Unchanged => None,
            Self::Set(value) => Some(value),
        }
    }
}

/// A partial update produced by preference extraction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreferenceUpdate {
    pub occasion: FieldUpdate<String>,
    pub recipient: FieldUpdate<String>,
    pub interests: Vec<String>,
    pub budget: FieldUpdate<Budget>,
    pub category: FieldUpdate<String>,
}

impl PreferenceUpdate {
    pub fn with_occasion(mut self, occasion: impl Into<String>) -> Self {
        self.occasion = FieldUpdate::Set(occasion.into());
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = FieldUpdate::Set(recipient.into());
        self
    }

    pub fn with_interest(mut self, interest: impl Into<String>) -> Self {
        self.interests.push(interest.into());
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = FieldUpdate::Set(budget);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = FieldUpdate::Set(category.into());
        self
    }

    /// True when applying this update could not change any record.
    pub fn is_empty(&self) -> bool {
        let blank = |field: &FieldUpdate<String>| {
            field.value().map_or(true, |value| value.trim().is_empty())
        };
        blank(&self.occasion)
            && blank(&self.recipient)
            && blank(&self.category)
            && self.interests.iter().all(|interest| interest.trim().is_empty())
            && self.budget.value().map_or(true, Budget::is_unknown)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceField {
    Occasion,
    Recipient,
    Interests,
    Budget,
    Category,
}

/// What a merge actually changed, used to acknowledge newly learned details.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub changed: Vec<PreferenceField>,
    pub added_interests: Vec<String>,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn touched(&self, field: PreferenceField) -> bool {
        self.changed.contains(&field)
    }
}

/// A field the conversation still has to ask about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    OccasionOrRecipient,
    Interests,
    Budget,
}

impl RequiredField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OccasionOrRecipient => "occasion_or_recipient",
            Self::Interests => "interests",
            Self::Budget => "budget",
        }
    }

    pub fn question(self) -> &'static str {
        match self {
            Self::OccasionOrRecipient => "What's the occasion, or who is the gift for?",
            Self::Interests => "What are they into? A hobby or two helps a lot.",
            Self::Budget => "What's your budget? (e.g., $50-100, under $50, $100+)",
        }
    }
}

impl PreferenceRecord {
    /// Applies the non-empty parts of `update`. Empty strings and an unknown budget are
    /// ignored, so a confirmed value is never erased. A non-empty value replaces the
    /// previous one (last writer wins).
    pub fn merge(&mut self, update: &PreferenceUpdate) -> MergeReport {
        let mut report = MergeReport::default();

        if merge_text(&mut self.occasion, &update.occasion) {
            report.changed.push(PreferenceField::Occasion);
        }
        if merge_text(&mut self.recipient, &update.recipient) {
            report.changed.push(PreferenceField::Recipient);
        }
        for interest in &update.interests {
            if let Some(added) = self.add_interest(interest) {
                report.added_interests.push(added);
            }
        }
        if !report.added_interests.is_empty() {
            report.changed.push(PreferenceField::Interests);
        }
        if let FieldUpdate::Set(budget) = &update.budget {
            if !budget.is_unknown() && *budget != self.budget {
                self.budget = *budget;
                report.changed.push(PreferenceField::Budget);
            }
        }
        if merge_text(&mut self.category, &update.category) {
            report.changed.push(PreferenceField::Category);
        }

        report
    }

    /// Moves `interests` to the front of the interest order, adding any that are new.
    /// Nothing already recorded is dropped.
    pub fn prioritize_interests(&mut self, interests: &[String]) {
        let mut front = Vec::new();
        for interest in interests {
            let normalized = normalize_interest(interest);
            if !normalized.is_empty() && !front.contains(&normalized) {
                front.push(normalized);
            }
        }
        if front.is_empty() {
            return;
        }

        let rest: Vec<String> =
            self.interests.drain(..).filter(|existing| !front.contains(existing)).collect();
        self.interests = front;
        self.interests.extend(rest);
    }

    /// Folds a recipient agent's answer into the sender's record. Remote interests lead the
    /// interest order; remote occasion and budget only fill fields the sender left empty.
    pub fn absorb_remote(&mut self, response: &PreferenceResponse) {
        self.prioritize_interests(&response.all_interests());

        if self.occasion.is_none() {
            let occasion = response.occasion.trim();
            if !occasion.is_empty() {
                self.occasion = Some(occasion.to_string());
            }
        }
        if self.budget.is_unknown() {
            let budget = parse_budget(&response.budget_range);
            if !budget.is_unknown() {
                self.budget = budget;
            }
        }
    }

    pub fn missing_fields(&self) -> Vec<RequiredField> {
        let mut missing = Vec::new();
        if self.occasion.is_none() && self.recipient.is_none() {
            missing.push(RequiredField::OccasionOrRecipient);
        }
        if self.interests.is_empty() {
            missing.push(RequiredField::Interests);
        }
        if self.budget.is_unknown() {
            missing.push(RequiredField::Budget);
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Search terms: the chosen category followed by up to three interests.
    pub fn search_terms(&self) -> Vec<String> {
        self.category.iter().cloned().chain(self.interests.iter().take(3).cloned()).collect()
    }

    fn add_interest(&mut self, interest: &str) -> Option<String> {
        let normalized = normalize_interest(interest);
        if normalized.is_empty() || self.interests.contains(&normalized) {
            return None;
        }
        self.interests.push(normalized.clone());
        Some(normalized)
    }
}

pub fn normalize_interest(interest: &str) -> String {
    interest.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn merge_text(slot: &mut Option<String>, update: &FieldUpdate<String>) -> bool {
    let Some(value) = update.value() else {
        return false;
    };
    let value = value.trim();
    if value.is_empty() || slot.as_deref() == Some(value) {
        return false;
    }
    *slot = Some(value.to_string());
    true
}
