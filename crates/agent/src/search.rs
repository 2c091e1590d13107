use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use santai_core::budget::Budget;
use santai_core::config::SearchConfig;
use santai_core::domain::candidate::CatalogItem;
use santai_core::domain::preferences::PreferenceRecord;
use santai_core::errors::GiftFlowError;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    pub terms: Vec<String>,
    pub budget: Budget,
}

impl SearchQuery {
    pub fn from_record(record: &PreferenceRecord) -> Self {
        Self { terms: record.search_terms(), budget: record.budget }
    }

    pub fn text(&self) -> String {
        self.terms.join(" ")
    }
}

/// Product catalog lookup. An empty list means no matches, an error means the catalog could
/// not be asked.
#[async_trait]
pub trait ProductSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogItem>>;
}

/// One retry, then the outage is reported as `SearchUnavailable`.
pub async fn search_with_retry(
    search: &dyn ProductSearch,
    query: &SearchQuery,
) -> Result<Vec<CatalogItem>, GiftFlowError> {
    match search.search(query).await {
        Ok(items) => Ok(items),
        Err(first) => {
            tracing::warn!(
                event_name = "search.retry",
                query = %query.text(),
                error = %first,
                "product search failed, retrying once"
            );
            search
                .search(query)
                .await
                .map_err(|error| GiftFlowError::SearchUnavailable(error.to_string()))
        }
    }
}

pub struct HttpProductSearch {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    country: String,
}

impl HttpProductSearch {
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("santai/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building product search http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            country: config.country.clone(),
        })
    }

    fn params(&self, query: &SearchQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("query", query.text()),
            ("country", self.country.clone()),
            ("sort_by", "relevance".to_string()),
        ];
        if let Some(min) = query.budget.min {
            params.push(("min_price", min.to_string()));
        }
        if let Some(max) = query.budget.max {
            params.push(("max_price", max.to_string()));
        }
        params
    }
}

#[async_trait]
impl ProductSearch for HttpProductSearch {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogItem>> {
        let Some(api_key) = &self.api_key else {
            bail!("product search api key is not configured");
        };

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .header("X-API-Key", api_key.expose_secret())
            .query(&self.params(query))
            .send()
            .await
            .context("product search request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("product search returned {status}"));
        }

        let body: Value = response.json().await.context("decoding product search response")?;
        Ok(map_products(&body))
    }
}

/// Maps a search response to catalog items. Products without a usable price are skipped.
pub fn map_products(body: &Value) -> Vec<CatalogItem> {
    let products = body
        .get("products")
        .or_else(|| body.get("data").and_then(|data| data.get("products")))
        .and_then(Value::as_array);
    let Some(products) = products else {
        return Vec::new();
    };

    products
        .iter()
        .filter_map(|product| {
            let name = product
                .get("title")
                .or_else(|| product.get("name"))
                .and_then(Value::as_str)?
                .trim()
                .to_string();
            if name.is_empty() {
                return None;
            }
            let price = product.get("price").and_then(price_of)?;
            let rating = product
                .get("rating")
                .and_then(|rating| rating.get("average").or(Some(rating)))
                .and_then(Value::as_f64)
                .map(|rating| rating as f32);

            Some(CatalogItem {
                name,
                price,
                rating,
                description: text_of(product, "description"),
                url: text_of(product, "url"),
            })
        })
        .collect()
}

fn price_of(price: &Value) -> Option<Decimal> {
    let current = price.get("current").unwrap_or(price);
    match current {
        Value::Number(number) => number.to_string().parse().ok(),
        Value::String(text) => text.trim().trim_start_matches('$').replace(',', "").parse().ok(),
        _ => None,
    }
}

fn text_of(product: &Value, key: &str) -> String {
    product.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Fixed catalog searched by keyword, for offline runs and tests. Items match when their
/// name or description contains any query term.
#[derive(Default)]
pub struct InMemoryCatalog {
    items: Vec<CatalogItem>,
    queries: Mutex<Vec<SearchQuery>>,
}

impl InMemoryCatalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items, queries: Mutex::new(Vec::new()) }
    }

    /// Every query received so far, oldest first.
    pub fn queries(&self) -> Vec<SearchQuery> {
        match self.queries.lock() {
            Ok(queries) => queries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ProductSearch for InMemoryCatalog {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogItem>> {
        match self.queries.lock() {
            Ok(mut queries) => queries.push(query.clone()),
            Err(poisoned) => poisoned.into_inner().push(query.clone()),
        }

        let terms: Vec<String> = query
            .terms
            .iter()
            .flat_map(|term| term.split_whitespace())
            .map(str::to_lowercase)
            .filter(|term| term.len() >= 3)
            .collect();
        Ok(self
            .items
            .iter()
            .filter(|item| {
                let haystack = format!("{} {}", item.name, item.description).to_lowercase();
                terms.iter().any(|term| haystack.contains(term.as_str()))
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use santai_core::budget::Budget;
    use santai_core::config::AppConfig;
    use santai_core::domain::candidate::CatalogItem;
    use santai_core::domain::preferences::PreferenceRecord;
    use santai_core::errors::GiftFlowError;
    use serde_json::json;

    use super::{
        map_products, search_with_retry, HttpProductSearch, InMemoryCatalog, ProductSearch,
        SearchQuery,
    };

    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProductSearch for Flaky {
        async fn search(&self, _query: &SearchQuery) -> Result<Vec<CatalogItem>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(anyhow!("503 from catalog"))
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn query() -> SearchQuery {
        SearchQuery { terms: vec!["Books".to_string()], budget: Budget::UNKNOWN }
    }

    #[test]
    fn query_uses_category_then_three_interests() {
        let record = PreferenceRecord {
            category: Some("Electronics".to_string()),
            interests: ["tech", "music", "gaming", "art"].map(str::to_string).to_vec(),
            budget: Budget::under(Decimal::from(80)),
            ..PreferenceRecord::default()
        };
        let query = SearchQuery::from_record(&record);

        assert_eq!(query.text(), "Electronics tech music gaming");
        assert_eq!(query.budget.max, Some(Decimal::from(80)));
    }

    #[test]
    fn http_params_carry_budget_bounds() {
        let search = HttpProductSearch::from_config(&AppConfig::default().search)
            .expect("client should build");
        let query = SearchQuery {
            terms: vec!["Books".to_string()],
            budget: Budget::range(Decimal::from(50), Decimal::from(100)),
        };
        let params = search.params(&query);

        assert!(params.contains(&("min_price", "50".to_string())));
        assert!(params.contains(&("max_price", "100".to_string())));
        assert!(params.contains(&("country", "US".to_string())));
    }

    #[tokio::test]
    async fn missing_api_key_is_an_error() {
        let search = HttpProductSearch::from_config(&AppConfig::default().search)
            .expect("client should build");
        assert!(search.search(&query()).await.is_err());
    }

    #[tokio::test]
    async fn one_failure_is_retried() {
        let search = Flaky { failures: 1, calls: AtomicUsize::new(0) };
        let items = search_with_retry(&search, &query()).await.expect("retry should succeed");

        assert!(items.is_empty());
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn two_failures_report_search_unavailable() {
        let search = Flaky { failures: 2, calls: AtomicUsize::new(0) };
        let error = search_with_retry(&search, &query()).await.expect_err("should give up");

        assert!(matches!(error, GiftFlowError::SearchUnavailable(_)));
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn products_are_mapped_from_search_response() {
        let body = json!({
            "products": [
                {
                    "title": "Trail Backpack",
                    "price": { "current": "$79.99" },
                    "rating": { "average": 4.6 },
                    "description": "28L daypack",
                    "url": "https://shop.example/backpack"
                },
                { "title": "Mystery Box", "price": { "current": "N/A" } },
                { "title": "Water Bottle", "price": 19, "rating": 4.1 }
            ]
        });
        let items = map_products(&body);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Trail Backpack");
        assert_eq!(items[0].price, Decimal::new(7999, 2));
        assert_eq!(items[0].rating, Some(4.6));
        assert_eq!(items[1].price, Decimal::from(19));
        assert!(items[1].url.is_empty());
    }

    #[tokio::test]
    async fn in_memory_catalog_matches_terms_and_records_queries() {
        let item = |name: &str, description: &str| CatalogItem {
            name: name.to_string(),
            price: Decimal::from(30),
            rating: Some(4.0),
            description: description.to_string(),
            url: String::new(),
        };
        let catalog = InMemoryCatalog::new(vec![
            item("Trail Guide", "hiking routes"),
            item("Chef Knife", "for cooking"),
        ]);
        let query =
            SearchQuery { terms: vec!["Hiking".to_string()], budget: Budget::UNKNOWN };
        let found = catalog.search(&query).await.expect("catalog never fails");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Trail Guide");
        assert_eq!(catalog.queries(), vec![query]);
    }
}
