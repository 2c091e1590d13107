use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::budget::Budget;
use crate::domain::preferences::PreferenceRecord;

pub const MAX_CANDIDATES: usize = 5;

const RATING_WEIGHT: f64 = 0.6;
const KEYWORD_WEIGHT: f64 = 0.4;

/// One product as returned by the catalog search, before ranking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    pub price: Decimal,
    pub rating: Option<f32>,
    pub description: String,
    pub url: String,
}

/// A ranked recommendation the user can pick by its 1-based position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub price: Decimal,
    pub description: String,
    pub rating: f32,
    pub purchase_url: String,
    pub source_category: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RankingMode {
    /// `0.6 * rating/5 + 0.4 * keyword overlap`.
    Weighted,
    /// Rating only; used when the user asks for more options.
    Relaxed,
}

/// Drops items outside `budget`, skips anything named in `exclude`, scores the rest and
/// returns the best `MAX_CANDIDATES`.
pub fn rank_candidates(
    items: Vec<CatalogItem>,
    record: &PreferenceRecord,
    mode: RankingMode,
    exclude: &[String],
) -> Vec<Candidate> {
    let keywords = ranking_keywords(record);
    let mut scored: Vec<(f64, Candidate)> = within_budget(items, &record.budget)
        .filter(|item| !exclude.iter().any(|name| name.eq_ignore_ascii_case(&item.name)))
        .map(|item| {
            let rating = item.rating.unwrap_or(0.0).clamp(0.0, 5.0);
            let score = match mode {
                RankingMode::Weighted => {
                    RATING_WEIGHT * f64::from(rating) / 5.0
                        + KEYWORD_WEIGHT * keyword_overlap(&item, &keywords)
                }
                RankingMode::Relaxed => f64::from(rating) / 5.0,
            };
            let candidate = Candidate {
                name: item.name,
                price: item.price,
                description: item.description,
                rating,
                purchase_url: item.url,
                source_category: record.category.clone(),
            };
            (score, candidate)
        })
        .collect();

    // Stable sort keeps catalog order among equal scores.
    scored.sort_by(|left, right| right.0.total_cmp(&left.0));
    scored.into_iter().take(MAX_CANDIDATES).map(|(_, candidate)| candidate).collect()
}

pub fn within_budget(
    items: Vec<CatalogItem>,
    budget: &Budget,
) -> impl Iterator<Item = CatalogItem> + '_ {
    items.into_iter().filter(move |item| budget.admits(item.price))
}

fn ranking_keywords(record: &PreferenceRecord) -> Vec<String> {
    let mut keywords = Vec::new();
    for term in record.search_terms() {
        for word in term.split(|ch: char| !ch.is_alphanumeric()) {
            let word = word.to_lowercase();
            if word.len() > 2 && !keywords.contains(&word) {
                keywords.push(word);
            }
        }
    }
    keywords
}

/// Fraction of `keywords` that appear in the item's name or description.
fn keyword_overlap(item: &CatalogItem, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let haystack = format!("{} {}", item.name, item.description).to_lowercase();
    let hits = keywords.iter().filter(|keyword| haystack.contains(keyword.as_str())).count();
    (hits as f64 / keywords.len() as f64).min(1.0)
}

pub fn price_label(price: Decimal) -> String {
    let rounded = price.round_dp(2);
    if rounded.fract().is_zero() {
        format!("${}", rounded.trunc())
    } else {
        format!("${:.2}", rounded.to_f64().unwrap_or_default())
    }
}
