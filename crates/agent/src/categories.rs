use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use santai_core::domain::preferences::PreferenceRecord;
use santai_core::input::category_for_interest;
use serde_json::Value;

use crate::llm::{extract_json_array, LlmClient};

pub const MENU_SIZE: usize = 8;

pub const FALLBACK_CATEGORIES: [&str; MENU_SIZE] = [
    "Electronics",
    "Books",
    "Jewelry",
    "Home Decor",
    "Sports Equipment",
    "Fashion Accessories",
    "Kitchen Gadgets",
    "Art & Crafts",
];

pub const ADDITIONAL_CATEGORIES: [&str; MENU_SIZE] = [
    "Experiences",
    "Gourmet Food",
    "Pet Supplies",
    "Garden Tools",
    "Travel Accessories",
    "Health & Wellness",
    "Office Supplies",
    "Toys & Games",
];

#[async_trait]
pub trait CategoryProvider: Send + Sync {
    /// Categories to offer once the required preferences are known.
    async fn suggest(&self, record: &PreferenceRecord) -> Vec<String>;

    /// A further set, disjoint from everything in `shown`. Empty when nothing is left.
    async fn more(&self, record: &PreferenceRecord, shown: &[String]) -> Vec<String>;
}

/// Fixed lists, with categories implied by the recipient's interests moved to the front.
#[derive(Clone, Debug, Default)]
pub struct StaticCategoryProvider;

impl StaticCategoryProvider {
    pub fn suggest_sync(&self, record: &PreferenceRecord) -> Vec<String> {
        let implied =
            record.interests.iter().filter_map(|interest| category_for_interest(interest));
        let mut categories = Vec::new();
        for category in implied.chain(FALLBACK_CATEGORIES) {
            push_unique(&mut categories, category);
        }
        categories.truncate(MENU_SIZE);
        categories
    }

    pub fn more_sync(&self, shown: &[String]) -> Vec<String> {
        let mut categories = Vec::new();
        for category in FALLBACK_CATEGORIES.into_iter().chain(ADDITIONAL_CATEGORIES) {
            if !contains_ignore_case(shown, category) {
                push_unique(&mut categories, category);
            }
        }
        categories.truncate(MENU_SIZE);
        categories
    }
}

#[async_trait]
impl CategoryProvider for StaticCategoryProvider {
    async fn suggest(&self, record: &PreferenceRecord) -> Vec<String> {
        self.suggest_sync(record)
    }

    async fn more(&self, _record: &PreferenceRecord, shown: &[String]) -> Vec<String> {
        self.more_sync(shown)
    }
}

/// Asks a model for tailored categories; any failure falls back to the fixed lists.
pub struct LlmCategoryProvider {
    client: Arc<dyn LlmClient>,
    fallback: StaticCategoryProvider,
}

impl LlmCategoryProvider {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client, fallback: StaticCategoryProvider }
    }

    async fn ask(&self, prompt: String) -> Option<Vec<String>> {
        let completion = match self.client.complete(&prompt).await {
            Ok(completion) => completion,
            Err(error) => {
                tracing::warn!(
                    event_name = "categories.fallback",
                    error = %error,
                    "category suggestion failed, using fixed list"
                );
                return None;
            }
        };
        let Ok(Value::Array(items)) = extract_json_array(&completion) else {
            tracing::warn!(event_name = "categories.fallback", "category answer was not a list");
            return None;
        };

        let mut categories = Vec::new();
        for item in items.iter().filter_map(Value::as_str) {
            let item = item.trim();
            if !item.is_empty() {
                push_unique(&mut categories, item);
            }
        }
        categories.truncate(MENU_SIZE);
        (!categories.is_empty()).then_some(categories)
    }
}

#[async_trait]
impl CategoryProvider for LlmCategoryProvider {
    async fn suggest(&self, record: &PreferenceRecord) -> Vec<String> {
        let prompt = format!(
            "Suggest 6 to 8 gift categories for occasion: {}, recipient: {}, interests: {}, \
             budget: {}. Examples: {}. Reply with only a JSON array of names.",
            record.occasion.as_deref().unwrap_or("unspecified"),
            record.recipient.as_deref().unwrap_or("unspecified"),
            record.interests.join(", "),
            record.budget,
            FALLBACK_CATEGORIES.join(", "),
        );
        match self.ask(prompt).await {
            Some(categories) => categories,
            None => self.fallback.suggest_sync(record),
        }
    }

    async fn more(&self, record: &PreferenceRecord, shown: &[String]) -> Vec<String> {
        let prompt = format!(
            "The user has already seen these gift categories: {}. For interests: {} and budget \
             {}, suggest 6 to 8 different ones. Reply with only a JSON array of names.",
            shown.join(", "),
            record.interests.join(", "),
            record.budget,
        );
        let fresh = self.ask(prompt).await.map(|categories| {
            categories
                .into_iter()
                .filter(|category| !contains_ignore_case(shown, category))
                .collect::<Vec<_>>()
        });
        match fresh {
            Some(categories) if !categories.is_empty() => categories,
            _ => self.fallback.more_sync(shown),
        }
    }
}

/// Uniform pick for "surprise me".
pub fn surprise_pick(categories: &[String]) -> Option<String> {
    categories.choose(&mut rand::thread_rng()).cloned()
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    list.iter().any(|item| item.eq_ignore_ascii_case(value))
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !contains_ignore_case(list, value) {
        list.push(value.to_string());
    }
}
