//! Classification of short user replies and detection of send-a-gift requests.

use regex::Regex;

pub const DEFAULT_TRIGGER_PREFIX: &str = "@santa clause";

/// What a user reply means once the conversation is past collecting preferences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserIntent {
    /// 1-based pick from the last list shown.
    Select(usize),
    /// A number that cannot address any list.
    BadNumber(String),
    SurpriseMe,
    MoreOptions,
    Reset,
    FreeText,
}

pub fn classify(text: &str) -> UserIntent {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return UserIntent::FreeText;
    }

    match normalized.as_str() {
        "start over" | "reset" | "restart" | "start again" | "begin again" | "new search" => {
            return UserIntent::Reset;
        }
        "surprise me" | "you pick" | "you choose" | "random" | "anything" => {
            return UserIntent::SurpriseMe;
        }
        "more" | "more options" | "show more" | "other options" | "something else"
        | "more categories" | "other categories" | "none of these" => {
            return UserIntent::MoreOptions;
        }
        _ => {}
    }

    let candidate = ["option ", "number ", "no ", "#", "pick ", "i'll take ", "i choose "]
        .iter()
        .find_map(|prefix| normalized.strip_prefix(prefix))
        .unwrap_or(normalized.as_str())
        .trim()
        .trim_end_matches(['.', '!', ')']);

    if !candidate.is_empty() && candidate.chars().all(|ch| ch.is_ascii_digit()) {
        return match candidate.parse::<usize>() {
            Ok(index) if index > 0 => UserIntent::Select(index),
            _ => UserIntent::BadNumber(candidate.to_string()),
        };
    }

    UserIntent::FreeText
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_end_matches(['.', '!', '?'])
        .to_string()
}

/// A recognized request to send a gift to another agent's owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendTrigger {
    pub recipient: String,
    /// Whatever the sender said besides the trigger itself.
    pub remainder: String,
}

/// Compiled send-a-gift phrasings, built once at startup from the configured prefix.
#[derive(Clone, Debug)]
pub struct TriggerGrammar {
    patterns: Vec<Regex>,
}

impl Default for TriggerGrammar {
    fn default() -> Self {
        match Self::new(DEFAULT_TRIGGER_PREFIX) {
            Ok(grammar) => grammar,
            Err(_) => Self { patterns: Vec::new() },
        }
    }
}

impl TriggerGrammar {
    pub fn new(prefix: &str) -> Result<Self, regex::Error> {
        let prefix = prefix
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");

        let mut patterns = Vec::new();
        if !prefix.is_empty() {
            patterns.push(Regex::new(&format!(
                r#"(?i){prefix}\s*,?\s+send\s+a\s+gift\s+to\s+['"]?@?(\w+)['"]?"#
            ))?);
        }
        for pattern in [
            r#"(?i)\bcan\s+you\s+send\s+['"]?@(\w+)['"]?\s+a\s+gift"#,
            r#"(?i)\bsend\s+a\s+gift\s+to\s+['"]?@(\w+)['"]?"#,
            r#"(?i)\bsend\s+['"]?@(\w+)['"]?\s+a\s+gift"#,
        ] {
            patterns.push(Regex::new(pattern)?);
        }

        Ok(Self { patterns })
    }

    pub fn detect(&self, text: &str) -> Option<SendTrigger> {
        self.patterns.iter().find_map(|pattern| {
            let captures = pattern.captures(text)?;
            let whole = captures.get(0)?;
            let recipient = captures.get(1)?.as_str().to_string();
            let remainder = format!("{} {}", &text[..whole.start()], &text[whole.end()..]);
            let remainder = remainder
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .trim_matches(|ch: char| ch == ',' || ch == '.' || ch.is_whitespace())
                .to_string();
            Some(SendTrigger { recipient, remainder })
        })
    }
}

const CATEGORY_SYNONYMS: &[(&str, &str)] = &[
    ("tech", "Electronics"),
    ("electronic", "Electronics"),
    ("gadget", "Electronics"),
    ("book", "Books"),
    ("reading", "Books"),
    ("jewel", "Jewelry"),
    ("jewellery", "Jewelry"),
    ("ring", "Jewelry"),
    ("necklace", "Jewelry"),
    ("home", "Home Decor"),
    ("decor", "Home Decor"),
    ("decoration", "Home Decor"),
    ("sport", "Sports Equipment"),
    ("fitness", "Sports Equipment"),
    ("exercise", "Sports Equipment"),
    ("fashion", "Fashion Accessories"),
    ("clothes", "Fashion Accessories"),
    ("clothing", "Fashion Accessories"),
    ("kitchen", "Kitchen Gadgets"),
    ("cooking", "Kitchen Gadgets"),
    ("art", "Art & Crafts"),
    ("craft", "Art & Crafts"),
    ("creative", "Art & Crafts"),
];

/// Finds the offered category a free-text reply names: direct substring match first, then
/// the synonym table. Only categories in `offered` can match.
pub fn match_category(text: &str, offered: &[String]) -> Option<String> {
    let needle = normalize(text);
    if needle.is_empty() {
        return None;
    }

    let direct = offered.iter().find(|category| {
        let category = category.to_lowercase();
        (needle.len() >= 3 && category.contains(&needle)) || needle.contains(&category)
    });
    if let Some(category) = direct {
        return Some(category.clone());
    }

    let words: Vec<&str> = needle.split(|ch: char| !ch.is_alphanumeric()).collect();
    CATEGORY_SYNONYMS
        .iter()
        .filter(|(synonym, _)| {
            words.iter().any(|word| *word == *synonym || word.strip_suffix('s') == Some(*synonym))
        })
        .find_map(|(_, target)| offered.iter().find(|category| category.as_str() == *target))
        .cloned()
}

/// Category a single interest most likely maps to, if any.
pub fn category_for_interest(interest: &str) -> Option<&'static str> {
    let interest = interest.to_lowercase();
    CATEGORY_SYNONYMS
        .iter()
        .find(|(synonym, _)| interest.split_whitespace().any(|word| word.starts_with(*synonym)))
        .map(|(_, target)| *target)
}
