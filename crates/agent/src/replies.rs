//! Reply text. Everything here is pure formatting over domain values.

use santai_core::domain::candidate::{price_label, Candidate};
use santai_core::domain::preferences::{
    MergeReport, PreferenceField, PreferenceRecord, RequiredField,
};

const ROMANTIC: &[&str] = &["girlfriend", "boyfriend", "wife", "husband", "partner"];
const CELEBRATIONS: &[&str] = &["birthday", "anniversary", "holiday", "graduation", "wedding"];

/// One short sentence per newly learned field, or `None` when nothing changed.
pub fn acknowledge(report: &MergeReport, record: &PreferenceRecord) -> Option<String> {
    let mut parts = Vec::new();

    if report.touched(PreferenceField::Occasion) {
        if let Some(occasion) = &record.occasion {
            if CELEBRATIONS.contains(&occasion.as_str()) {
                parts.push(format!("A {occasion} gift, how thoughtful!"));
            } else {
                parts.push(format!("A {occasion} gift, I love that!"));
            }
        }
    }
    if report.touched(PreferenceField::Recipient) {
        if let Some(recipient) = &record.recipient {
            let line = match recipient.as_str() {
                "mother" => "Something for your mom, that's sweet!".to_string(),
                "friend" => "A gift for a friend, wonderful!".to_string(),
                "myself" => "Treating yourself, nice!".to_string(),
                other if ROMANTIC.contains(&other) => {
                    "How romantic! Let's find something special.".to_string()
                }
                other => format!("A gift for your {other}, got it."),
            };
            parts.push(line);
        }
    }
    if !report.added_interests.is_empty() {
        parts.push(format!("Noted: they're into {}.", report.added_interests.join(", ")));
    }
    if report.touched(PreferenceField::Budget) {
        parts.push(format!("I'll keep {} in mind.", record.budget));
    }

    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Asks only for what is missing. The opener gets warmer the less we know.
pub fn missing_fields_prompt(missing: &[RequiredField]) -> String {
    let opener = match missing.len() {
        0 => return "Tell me a bit more about the gift you have in mind.".to_string(),
        1 => "Almost there! Just one more thing:",
        2 => "Great start! A couple more details:",
        _ => "I'd love to help you find the perfect gift! To get started:",
    };
    let questions: Vec<String> =
        missing.iter().map(|field| format!("• {}", field.question())).collect();
    format!("{opener}\n{}", questions.join("\n"))
}

pub fn category_menu(intro: &str, categories: &[String]) -> String {
    let lines: Vec<String> = categories
        .iter()
        .enumerate()
        .map(|(index, category)| format!("{}. {category}", index + 1))
        .collect();
    format!(
        "{intro}\n{}\nReply with a number or a category name, say \"surprise me\", or ask for \
         \"more options\".",
        lines.join("\n")
    )
}

pub fn categories_intro(record: &PreferenceRecord) -> String {
    match (&record.occasion, &record.recipient) {
        (Some(occasion), _) => format!("Here are some ideas for the {occasion}:"),
        (None, Some(recipient)) => format!("Here are some ideas for your {recipient}:"),
        (None, None) => "Here are some ideas:".to_string(),
    }
}

pub fn candidate_list(category: Option<&str>, candidates: &[Candidate]) -> String {
    let heading = match category {
        Some(category) => format!("Top picks in {category}:"),
        None => "Top picks:".to_string(),
    };
    let lines: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let mut line = format!(
                "{}. {}, {} ({:.1}★)",
                index + 1,
                candidate.name,
                price_label(candidate.price),
                candidate.rating
            );
            if !candidate.description.is_empty() {
                line.push_str(&format!("\n   {}", candidate.description));
            }
            line
        })
        .collect();
    format!(
        "{heading}\n{}\nReply with a number to choose, \"more options\" for different picks, or \
         tell me what to change.",
        lines.join("\n")
    )
}

pub fn no_matches(category: Option<&str>) -> String {
    match category {
        Some(category) => format!(
            "I couldn't find anything in {category} within your budget. Let's try another \
             category."
        ),
        None => "I couldn't find anything within your budget. Let's try another category."
            .to_string(),
    }
}

pub fn correction_noted(acknowledgment: Option<String>) -> String {
    let lead = acknowledgment.unwrap_or_else(|| "Got it.".to_string());
    format!(
        "{lead} Pick a number from the list, or say \"more options\" and I'll search again with \
         that in mind."
    )
}

pub fn selection_confirmed(candidate: &Candidate) -> String {
    let price = price_label(candidate.price);
    let mut text = format!("Great choice! You picked {} for {price}.", candidate.name);
    if !candidate.purchase_url.is_empty() {
        text.push_str(&format!("\nYou can get it here: {}", candidate.purchase_url));
    }
    text
}

pub fn gift_sent(candidate: &Candidate, recipient: &str, delivered: bool) -> String {
    let status = if delivered {
        format!("I've let @{recipient}'s agent know it's on the way.")
    } else {
        format!("I couldn't reach @{recipient}'s agent to tell them, but your pick is saved.")
    };
    format!("{} {status}", selection_confirmed(candidate))
}

pub fn asked_recipient(recipient: &str, answered: bool) -> String {
    if answered {
        format!("I checked with @{recipient}'s agent about what they'd like.")
    } else {
        format!("I couldn't hear back from @{recipient}'s agent, so I'm using some popular picks.")
    }
}

pub fn no_more_categories() -> &'static str {
    "That's every category I have. Pick one from the list, or tell me more about the gift."
}

pub fn peer_echo() -> &'static str {
    "Thanks for sharing! I'm a gift assistant. Tell me who the gift is for and I'll help."
}

pub fn fresh_start() -> &'static str {
    "Let's start over! Who is the gift for, and what's the occasion?"
}
