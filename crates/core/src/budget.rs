use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Spending bounds for a gift. Either bound may be unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl Budget {
    pub const UNKNOWN: Self = Self { min: None, max: None };

    pub fn range(min: Decimal, max: Decimal) -> Self {
        Self { min: Some(min), max: Some(max) }
    }

    pub fn under(max: Decimal) -> Self {
        Self { min: None, max: Some(max) }
    }

    pub fn at_least(min: Decimal) -> Self {
        Self { min: Some(min), max: None }
    }

    pub fn is_unknown(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn admits(&self, price: Decimal) -> bool {
        let above_floor = self.min.map_or(true, |min| price >= min);
        let below_ceiling = self.max.map_or(true, |max| price <= max);
        above_floor && below_ceiling
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "${}-${}", min.normalize(), max.normalize()),
            (None, Some(max)) => write!(f, "under ${}", max.normalize()),
            (Some(min), None) => write!(f, "${}+", min.normalize()),
            (None, None) => f.write_str("any budget"),
        }
    }
}

const CEILING_WORDS: &[&str] = &["under", "below", "less", "max", "maximum", "within", "up"];
const FLOOR_WORDS: &[&str] = &["over", "above", "least", "more", "min", "minimum", "from"];
const MONEY_WORDS: &[&str] = &[
    "budget", "spend", "spending", "price", "between", "around", "about", "under", "below",
    "less", "max", "maximum", "within", "up", "over", "above", "least", "more", "min", "minimum",
];

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Amount { value: Decimal, marked: bool },
    Dash,
    Plus,
    Word(String),
}

/// Parses a free-text budget phrase into bounds.
///
/// Accepted shapes: `$A-B`, `A to B`, `between A and B`, `under $A`, `$A+`, `over $A`,
/// `at least $A` and a bare `$A` (read as a ceiling). Amounts may carry `,` separators,
/// decimals and a `k` suffix. Anything else, including a range whose low end exceeds its
/// high end, yields [`Budget::UNKNOWN`].
pub fn parse_budget(phrase: &str) -> Budget {
    let tokens = tokenize(&phrase.to_ascii_lowercase());

    for (index, token) in tokens.iter().enumerate() {
        let Token::Amount { value, marked } = token else {
            continue;
        };
        let before = preceding_words(&tokens, index, 3);
        let upper = range_upper_bound(&tokens, index, &before);
        if !marked && upper.is_none() && !before.iter().any(|word| MONEY_WORDS.contains(word)) {
            continue;
        }

        if let Some(upper) = upper {
            return if *value <= upper { Budget::range(*value, upper) } else { Budget::UNKNOWN };
        }
        if matches!(tokens.get(index + 1), Some(Token::Plus)) {
            return Budget::at_least(*value);
        }
        let capped = before.contains(&"no") && before.contains(&"more");
        if capped || before.iter().any(|word| CEILING_WORDS.contains(word)) {
            return Budget::under(*value);
        }
        if before.iter().any(|word| FLOOR_WORDS.contains(word)) {
            return Budget::at_least(*value);
        }
        return Budget::under(*value);
    }

    Budget::UNKNOWN
}

fn range_upper_bound(tokens: &[Token], index: usize, before: &[&str]) -> Option<Decimal> {
    let joined = match tokens.get(index + 1)? {
        Token::Dash => true,
        Token::Word(word) if word == "to" => true,
        Token::Word(word) if word == "and" => before.first() == Some(&"between"),
        _ => false,
    };
    if !joined {
        return None;
    }
    match tokens.get(index + 2)? {
        Token::Amount { value, .. } => Some(*value),
        _ => None,
    }
}

fn preceding_words(tokens: &[Token], index: usize, limit: usize) -> Vec<&str> {
    tokens[..index]
        .iter()
        .rev()
        .take(limit)
        .filter_map(|token| match token {
            Token::Word(word) => Some(word.as_str()),
            _ => None,
        })
        .collect()
}

fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut marked = false;
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        if ch == '$' {
            marked = true;
            index += 1;
        } else if ch.is_ascii_digit() {
            let mut digits = String::new();
            while index < chars.len() {
                let next = chars[index];
                let grouped = next == ','
                    && chars.get(index + 1).is_some_and(|after| after.is_ascii_digit());
                if next.is_ascii_digit() || next == '.' {
                    digits.push(next);
                } else if !grouped {
                    break;
                }
                index += 1;
            }
            let thousands = chars.get(index) == Some(&'k')
                && !chars.get(index + 1).is_some_and(|after| after.is_alphanumeric());
            if thousands {
                index += 1;
            }
            let digits = digits.trim_end_matches('.');
            let value = Decimal::from_str(digits).ok().and_then(|value| {
                if thousands {
                    value.checked_mul(Decimal::from(1_000))
                } else {
                    Some(value)
                }
            });
            if let Some(value) = value {
                tokens.push(Token::Amount { value, marked: marked || thousands });
            }
            marked = false;
        } else if ch == '-' {
            tokens.push(Token::Dash);
            index += 1;
        } else if ch == '+' {
            tokens.push(Token::Plus);
            index += 1;
        } else if ch.is_alphabetic() {
            let mut word = String::new();
            while index < chars.len() && (chars[index].is_alphabetic() || chars[index] == '\'') {
                word.push(chars[index]);
                index += 1;
            }
            tokens.push(Token::Word(word));
            marked = false;
        } else {
            index += 1;
        }
    }

    tokens
}
