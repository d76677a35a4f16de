//! Maps search client for leadpipe.
//!
//! Queries SerpAPI's Google Maps engine once per business category and maps
//! the local results onto [`Lead`]s. Requests are spaced out to the
//! configured requests-per-minute budget.

pub mod parser;

use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use leadpipe_shared::{HttpConfig, Lead, LeadPipeError, Result, SearchConfig, resolve_secret};

use crate::parser::SearchResponse;

/// SerpAPI Google Maps search client.
pub struct SerpApiSearch {
    client: Client,
    api_key: String,
    config: SearchConfig,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl SerpApiSearch {
    /// Build a client with the key read from `config.api_key_env`.
    pub fn new(config: &SearchConfig, http: &HttpConfig) -> Result<Self> {
        let api_key = resolve_secret(&config.api_key_env)?;
        Self::with_api_key(api_key, config, http)
    }

    pub fn with_api_key(
        api_key: impl Into<String>,
        config: &SearchConfig,
        http: &HttpConfig,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LeadPipeError::config("search API key is empty"));
        }

        let client = Client::builder()
            .user_agent(&http.user_agent)
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| LeadPipeError::Network(format!("failed to build HTTP client: {e}")))?;

        let min_interval = match config.requests_per_minute {
            0 => Duration::ZERO,
            rpm => Duration::from_secs_f64(60.0 / f64::from(rpm)),
        };

        Ok(Self {
            client,
            api_key,
            config: config.clone(),
            min_interval,
            last_request: Mutex::new(None),
        })
    }

    /// Wait until the minimum spacing since the previous request has elapsed.
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "rate limiting search");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Search one category, returning at most `limit` leads.
    #[instrument(skip(self))]
    pub async fn search(&self, category: &str, limit: usize) -> Result<Vec<Lead>> {
        self.rate_limit().await;

        let query = format!("{category} em {}", self.config.location);
        let url = format!("{}/search.json", self.config.base_url.trim_end_matches('/'));
        info!(query = %query, "searching maps");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("engine", "google_maps"),
                ("type", "search"),
                ("q", query.as_str()),
                ("ll", self.config.coordinates.as_str()),
                ("hl", self.config.language.as_str()),
                ("gl", self.config.country.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| LeadPipeError::Network(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeadPipeError::Network(format!(
                "search returned HTTP {status}"
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| LeadPipeError::parse(format!("invalid search response: {e}")))?;

        if let Some(message) = body.error {
            return Err(LeadPipeError::Network(format!("search provider error: {message}")));
        }

        let found = body.local_results.len();
        let leads: Vec<Lead> = body
            .local_results
            .into_iter()
            .take(limit)
            .filter_map(|item| {
                parser::parse_item(item, category, &self.config.city, &self.config.state)
            })
            .collect();

        info!(found, kept = leads.len(), "search finished");
        Ok(leads)
    }

    /// Search every category in turn and merge the results.
    ///
    /// A failing category is logged and contributes nothing. The merged list
    /// is deduplicated by name and address.
    pub async fn search_all_categories(
        &self,
        categories: &[String],
        limit_per_category: usize,
    ) -> Vec<Lead> {
        let mut all = Vec::new();
        for category in categories {
            match self.search(category, limit_per_category).await {
                Ok(leads) => {
                    info!(category = %category, leads = leads.len(), "category searched");
                    all.extend(leads);
                }
                Err(e) => warn!(category = %category, error = %e, "category search failed"),
            }
        }

        let total = all.len();
        let unique = parser::deduplicate(all);
        info!(total, unique = unique.len(), "search complete");
        unique
    }
}
