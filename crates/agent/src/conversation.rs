use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use santai_core::budget::{parse_budget, Budget};
use santai_core::domain::preferences::{PreferenceRecord, PreferenceUpdate};
use santai_core::errors::GiftFlowError;
use serde_json::Value;

use crate::llm::{extract_json_object, LlmClient};

/// Turns free text into a partial preference update. Implementations never see the session
/// beyond the read-only record passed in.
#[async_trait]
pub trait PreferenceExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        current: &PreferenceRecord,
    ) -> Result<PreferenceUpdate, GiftFlowError>;
}

const OCCASIONS: &[(&str, &str)] = &[
    ("birthday", "birthday"),
    ("bday", "birthday"),
    ("anniversary", "anniversary"),
    ("wedding", "wedding"),
    ("holiday", "holiday"),
    ("holidays", "holiday"),
    ("christmas", "christmas"),
    ("xmas", "christmas"),
    ("graduation", "graduation"),
    ("promotion", "promotion"),
    ("retirement", "retirement"),
    ("housewarming", "housewarming"),
    ("valentine", "valentine's day"),
    ("valentines", "valentine's day"),
    ("diwali", "diwali"),
    ("festival", "festival"),
];

const RECIPIENTS: &[(&str, &str)] = &[
    ("mother", "mother"),
    ("mom", "mother"),
    ("mum", "mother"),
    ("father", "father"),
    ("dad", "father"),
    ("friend", "friend"),
    ("friends", "friend"),
    ("bestie", "friend"),
    ("boss", "boss"),
    ("manager", "boss"),
    ("sister", "sister"),
    ("brother", "brother"),
    ("girlfriend", "girlfriend"),
    ("boyfriend", "boyfriend"),
    ("wife", "wife"),
    ("husband", "husband"),
    ("partner", "partner"),
    ("grandmother", "grandmother"),
    ("grandma", "grandmother"),
    ("grandfather", "grandfather"),
    ("grandpa", "grandfather"),
    ("aunt", "aunt"),
    ("uncle", "uncle"),
    ("cousin", "cousin"),
    ("son", "son"),
    ("daughter", "daughter"),
    ("coworker", "coworker"),
    ("colleague", "coworker"),
    ("teacher", "teacher"),
    ("myself", "myself"),
];

const INTERESTS: &[(&str, &str)] = &[
    ("hiking", "hiking"),
    ("camping", "camping"),
    ("outdoors", "outdoors"),
    ("cooking", "cooking"),
    ("baking", "baking"),
    ("reading", "reading"),
    ("books", "books"),
    ("music", "music"),
    ("art", "art"),
    ("painting", "painting"),
    ("drawing", "drawing"),
    ("crafts", "crafts"),
    ("knitting", "knitting"),
    ("gaming", "gaming"),
    ("games", "gaming"),
    ("tech", "tech"),
    ("technology", "technology"),
    ("gadgets", "gadgets"),
    ("photography", "photography"),
    ("gardening", "gardening"),
    ("yoga", "yoga"),
    ("fitness", "fitness"),
    ("running", "running"),
    ("cycling", "cycling"),
    ("sports", "sports"),
    ("football", "football"),
    ("soccer", "soccer"),
    ("basketball", "basketball"),
    ("travel", "travel"),
    ("traveling", "travel"),
    ("coffee", "coffee"),
    ("tea", "tea"),
    ("wine", "wine"),
    ("fashion", "fashion"),
    ("jewelry", "jewelry"),
    ("movies", "movies"),
    ("fishing", "fishing"),
    ("skincare", "skincare"),
];

const INTEREST_CUES: &[&str] = &["likes", "loves", "enjoys", "into", "like", "love", "enjoy"];

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "the", "to", "of", "for", "my", "his", "her", "their", "is", "it", "in",
    "on", "with", "who", "she", "he", "they", "really", "very", "also", "some", "gift", "gifts",
    "something", "budget", "hi", "hello", "hey", "thanks", "thank", "you", "ok", "okay", "yes",
    "no", "please", "maybe", "just", "because", "about", "around", "under", "over", "dollars",
];

/// Keyword tables for occasions, recipients and interests, plus the budget parser.
///
/// Used on its own when no model is configured, and as the fallback when the model fails.
#[derive(Clone, Debug, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_rules(&self, text: &str, current: &PreferenceRecord) -> PreferenceUpdate {
        let normalized = text.to_lowercase();
        let tokens = tokenize(&normalized);
        let mut update = PreferenceUpdate::default();

        if let Some(occasion) = lookup(&tokens, OCCASIONS) {
            update = update.with_occasion(occasion);
        } else if normalized.contains("just because") {
            update = update.with_occasion("just because");
        }
        if let Some(recipient) = lookup(&tokens, RECIPIENTS) {
            update = update.with_recipient(recipient);
        }

        for interest in extract_interests(&tokens) {
            update = update.with_interest(interest);
        }

        let budget = parse_budget(text);
        if !budget.is_unknown() {
            update = update.with_budget(budget);
        }

        if update.is_empty() && current.interests.is_empty() {
            if let Some(answer) = bare_interest_answer(&tokens) {
                update = update.with_interest(answer);
            }
        }

        update
    }
}

#[async_trait]
impl PreferenceExtractor for RuleBasedExtractor {
    async fn extract(
        &self,
        text: &str,
        current: &PreferenceRecord,
    ) -> Result<PreferenceUpdate, GiftFlowError> {
        Ok(self.extract_rules(text, current))
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(str::to_string).collect()
}

fn lookup(tokens: &[String], table: &[(&str, &'static str)]) -> Option<&'static str> {
    tokens.iter().find_map(|token| {
        table.iter().find(|(keyword, _)| *keyword == token.as_str()).map(|(_, value)| *value)
    })
}

fn extract_interests(tokens: &[String]) -> Vec<String> {
    let mut interests: Vec<String> = Vec::new();
    let mut push = |interest: String| {
        if !interests.contains(&interest) {
            interests.push(interest);
        }
    };

    for (index, token) in tokens.iter().enumerate() {
        if let Some(interest) = lookup(std::slice::from_ref(token), INTERESTS) {
            push(interest.to_string());
            continue;
        }

        let follows_cue = index > 0 && INTEREST_CUES.contains(&tokens[index - 1].as_str());
        if follows_cue && is_content_word(token) && lookup_any(token).is_none() {
            push(token.clone());
        }
    }

    interests
}

fn lookup_any(token: &str) -> Option<&'static str> {
    [OCCASIONS, RECIPIENTS].iter().find_map(|table| {
        table.iter().find(|(keyword, _)| *keyword == token).map(|(_, value)| *value)
    })
}

fn is_content_word(token: &str) -> bool {
    token.len() >= 3
        && token.chars().all(char::is_alphabetic)
        && !STOP_WORDS.contains(&token)
        && !INTEREST_CUES.contains(&token)
}

/// A reply of one to three plain words given while interests are still unknown is taken as
/// the interest itself ("origami", "vintage cameras").
fn bare_interest_answer(tokens: &[String]) -> Option<String> {
    if tokens.is_empty() || tokens.len() > 3 {
        return None;
    }
    let words: Vec<&str> = tokens
        .iter()
        .map(String::as_str)
        .filter(|token| !STOP_WORDS.contains(token))
        .collect();
    if words.is_empty() || !words.iter().all(|word| is_content_word(word)) {
        return None;
    }
    Some(words.join(" "))
}

/// Asks a model for the fields the user just mentioned, as a JSON object.
pub struct LlmPreferenceExtractor {
    client: Arc<dyn LlmClient>,
}

impl LlmPreferenceExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn prompt(text: &str, current: &PreferenceRecord) -> String {
        let known = serde_json::to_string(current).unwrap_or_else(|_| "{}".to_string());
        format!(
            "Extract gift preferences the user states explicitly. Do not guess.\n\
             Known so far: {known}\n\
             User message: \"{text}\"\n\
             Reply with only a JSON object with these keys, using null when not mentioned:\n\
             {{\"occasion\": string, \"recipient\": string, \"interests\": [string], \
             \"budget_min\": number, \"budget_max\": number}}"
        )
    }
}

#[async_trait]
impl PreferenceExtractor for LlmPreferenceExtractor {
    async fn extract(
        &self,
        text: &str,
        current: &PreferenceRecord,
    ) -> Result<PreferenceUpdate, GiftFlowError> {
        let completion = self
            .client
            .complete(&Self::prompt(text, current))
            .await
            .map_err(|error| GiftFlowError::ExtractionUnavailable(error.to_string()))?;
        let value = extract_json_object(&completion)
            .map_err(|error| GiftFlowError::ExtractionUnavailable(error.to_string()))?;
        Ok(update_from_json(&value))
    }
}

/// Reads a model answer leniently: nulls, "null" strings and wrong types are skipped.
pub fn update_from_json(value: &Value) -> PreferenceUpdate {
    let mut update = PreferenceUpdate::default();

    if let Some(occasion) = text_field(value, "occasion") {
        update = update.with_occasion(occasion.to_lowercase());
    }
    if let Some(recipient) = text_field(value, "recipient") {
        update = update.with_recipient(recipient.to_lowercase());
    }

    let interests = value.get("interests").or_else(|| value.get("preferences"));
    match interests {
        Some(Value::Array(items)) => {
            for item in items.iter().filter_map(Value::as_str) {
                update = update.with_interest(item);
            }
        }
        Some(Value::String(listed)) if !is_null_text(listed) => {
            for item in listed.split(',') {
                update = update.with_interest(item.trim());
            }
        }
        _ => {}
    }

    let min = amount_field(value, "budget_min");
    let max = amount_field(value, "budget_max");
    let budget = match (min, max) {
        (Some(min), Some(max)) if min > max => Budget::UNKNOWN,
        (min, max) => Budget { min, max },
    };
    if !budget.is_unknown() {
        update = update.with_budget(budget);
    }

    update
}

fn is_null_text(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text.eq_ignore_ascii_case("null") || text.eq_ignore_ascii_case("none")
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    let text = value.get(key)?.as_str()?;
    (!is_null_text(text)).then(|| text.trim().to_string())
}

fn amount_field(value: &Value, key: &str) -> Option<Decimal> {
    let amount = match value.get(key)? {
        Value::Number(number) => number.to_string().parse::<Decimal>().ok()?,
        Value::String(text) => {
            text.trim().trim_start_matches('$').replace(',', "").parse::<Decimal>().ok()?
        }
        _ => return None,
    };
    (amount >= Decimal::ZERO).then_some(amount)
}

/// Model first, keyword rules when the model fails. A model failure is only surfaced when the
/// rules cannot recover anything from the message either.
pub struct FallbackExtractor {
    primary: Option<Arc<dyn PreferenceExtractor>>,
    rules: RuleBasedExtractor,
}

impl FallbackExtractor {
    pub fn new(primary: Option<Arc<dyn PreferenceExtractor>>) -> Self {
        Self { primary, rules: RuleBasedExtractor::new() }
    }

    pub fn rules_only() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl PreferenceExtractor for FallbackExtractor {
    async fn extract(
        &self,
        text: &str,
        current: &PreferenceRecord,
    ) -> Result<PreferenceUpdate, GiftFlowError> {
        let Some(primary) = &self.primary else {
            return Ok(self.rules.extract_rules(text, current));
        };

        match primary.extract(text, current).await {
            Ok(update) => Ok(update),
            Err(error) => {
                tracing::warn!(
                    event_name = "extraction.fallback",
                    error = %error,
                    "model extraction failed, using keyword rules"
                );
                let update = self.rules.extract_rules(text, current);
                if update.is_empty() {
                    Err(error)
                } else {
                    Ok(update)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use santai_core::budget::Budget;
    use santai_core::domain::preferences::{FieldUpdate, PreferenceRecord};
    use santai_core::errors::GiftFlowError;
    use serde_json::json;

    use super::{
        update_from_json, FallbackExtractor, LlmPreferenceExtractor, PreferenceExtractor,
        RuleBasedExtractor,
    };
    use crate::llm::LlmClient;

    struct CannedLlm(Result<String, String>);

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.0.clone().map_err(|message| anyhow!(message))
        }
    }

    fn fallback_with(llm: CannedLlm) -> FallbackExtractor {
        let primary: Arc<dyn PreferenceExtractor> =
            Arc::new(LlmPreferenceExtractor::new(Arc::new(llm)));
        FallbackExtractor::new(Some(primary))
    }

    #[test]
    fn rules_extract_the_full_first_message() {
        let update = RuleBasedExtractor::new().extract_rules(
            "birthday gift for my friend who likes hiking, budget $50-100",
            &PreferenceRecord::default(),
        );

        assert_eq!(update.occasion, FieldUpdate::Set("birthday".to_string()));
        assert_eq!(update.recipient, FieldUpdate::Set("friend".to_string()));
        assert_eq!(update.interests, vec!["hiking".to_string()]);
        assert_eq!(
            update.budget,
            FieldUpdate::Set(Budget::range(Decimal::from(50), Decimal::from(100)))
        );
    }

    #[test]
    fn recipient_words_match_whole_tokens() {
        let update = RuleBasedExtractor::new()
            .extract_rules("something for my girlfriend", &PreferenceRecord::default());
        assert_eq!(update.recipient, FieldUpdate::Set("girlfriend".to_string()));
    }

    #[test]
    fn interest_after_cue_word_is_kept_even_when_unlisted() {
        let update = RuleBasedExtractor::new()
            .extract_rules("she loves origami and cooking", &PreferenceRecord::default());
        assert_eq!(update.interests, vec!["origami".to_string(), "cooking".to_string()]);
    }

    #[test]
    fn short_reply_answers_missing_interests() {
        let rules = RuleBasedExtractor::new();
        let update = rules.extract_rules("vintage cameras", &PreferenceRecord::default());
        assert_eq!(update.interests, vec!["vintage cameras".to_string()]);

        let mut known = PreferenceRecord::default();
        known.interests.push("hiking".to_string());
        assert!(rules.extract_rules("vintage cameras", &known).is_empty());
        assert!(rules.extract_rules("hello", &PreferenceRecord::default()).is_empty());
    }

    #[test]
    fn budget_only_reply_sets_budget() {
        let update = RuleBasedExtractor::new()
            .extract_rules("under $50", &PreferenceRecord::default());
        assert_eq!(update.budget, FieldUpdate::Set(Budget::under(Decimal::from(50))));
        assert!(update.interests.is_empty());
    }

    #[test]
    fn model_json_is_read_leniently() {
        let update = update_from_json(&json!({
            "occasion": "Graduation",
            "recipient": null,
            "preferences": "hiking, outdoor",
            "budget_min": "100",
            "budget_max": 200
        }));

        assert_eq!(update.occasion, FieldUpdate::Set("graduation".to_string()));
        assert_eq!(update.recipient, FieldUpdate::Unchanged);
        assert_eq!(update.interests, vec!["hiking".to_string(), "outdoor".to_string()]);
        assert_eq!(
            update.budget,
            FieldUpdate::Set(Budget::range(Decimal::from(100), Decimal::from(200)))
        );
    }

    #[test]
    fn inverted_model_budget_is_ignored() {
        let update = update_from_json(&json!({ "budget_min": 300, "budget_max": 100 }));
        assert_eq!(update.budget, FieldUpdate::Unchanged);
    }

    #[tokio::test]
    async fn model_answer_is_used_when_available() {
        let extractor = fallback_with(CannedLlm(Ok(
            r#"{"occasion": "wedding", "interests": ["wine"]}"#.to_string()
        )));
        let update = extractor
            .extract("gift for the wedding", &PreferenceRecord::default())
            .await
            .expect("model answer should be used");

        assert_eq!(update.occasion, FieldUpdate::Set("wedding".to_string()));
        assert_eq!(update.interests, vec!["wine".to_string()]);
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_rules() {
        let extractor = fallback_with(CannedLlm(Err("503".to_string())));
        let update = extractor
            .extract("anniversary gift, under $80", &PreferenceRecord::default())
            .await
            .expect("rules should recover");

        assert_eq!(update.occasion, FieldUpdate::Set("anniversary".to_string()));
        assert_eq!(update.budget, FieldUpdate::Set(Budget::under(Decimal::from(80))));
    }

    #[tokio::test]
    async fn model_failure_with_nothing_recoverable_is_reported() {
        let extractor = fallback_with(CannedLlm(Ok("I cannot help with that".to_string())));
        let error = extractor
            .extract("hmm, not sure yet, what do you think?", &PreferenceRecord::default())
            .await
            .expect_err("nothing to recover");

        assert!(matches!(error, GiftFlowError::ExtractionUnavailable(_)));
    }
}
