//! Application configuration for leadpipe.
//!
//! User config lives at `~/.leadpipe/leadpipe.toml`.
//! CLI flags override config file values, which override defaults.
//! Credentials are never stored here, only the names of the environment
//! variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LeadPipeError, Result};
use crate::types::Classification;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadpipe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadpipe";

// ---------------------------------------------------------------------------
// Config structs (matching leadpipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub hunter: HunterConfig,

    #[serde(default)]
    pub airtable: AirtableConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Path of the dedup cache file.
    pub fn cache_path(&self) -> PathBuf {
        Path::new(&self.defaults.data_dir).join(&self.cache.file)
    }

    /// Path of the pipeline checkpoint file.
    pub fn checkpoint_path(&self) -> PathBuf {
        Path::new(&self.defaults.data_dir).join(&self.pipeline.checkpoint_file)
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Business categories searched when none are given on the command line.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Maximum leads taken from the search provider per category.
    #[serde(default = "default_limit")]
    pub limit_per_category: usize,

    /// Directory holding the cache and checkpoint files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            limit_per_category: default_limit(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_categories() -> Vec<String> {
    [
        "clinica medica",
        "clinica odontologica",
        "escritorio advocacia",
        "escritorio contabilidade",
        "imobiliaria",
        "academia",
        "restaurante",
        "pet shop",
        "salao de beleza",
        "loja de roupas",
        "escola particular",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_limit() -> usize {
    20
}
fn default_data_dir() -> String {
    "data".into()
}

/// `[search]` section (maps search provider).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the SerpAPI key.
    #[serde(default = "default_serpapi_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_serpapi_url")]
    pub base_url: String,

    /// Free-text location appended to each query.
    #[serde(default = "default_location")]
    pub location: String,

    /// City and state stamped on captured leads.
    #[serde(default = "default_city")]
    pub city: String,
    #[serde(default = "default_state")]
    pub state: String,

    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_country")]
    pub country: String,

    /// Map viewport in `@lat,lng,zoom` form.
    #[serde(default = "default_coordinates")]
    pub coordinates: String,

    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_serpapi_key_env(),
            base_url: default_serpapi_url(),
            location: default_location(),
            city: default_city(),
            state: default_state(),
            language: default_language(),
            country: default_country(),
            coordinates: default_coordinates(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_serpapi_key_env() -> String {
    "SERPAPI_KEY".into()
}
fn default_serpapi_url() -> String {
    "https://serpapi.com".into()
}
fn default_location() -> String {
    "Belo Horizonte, MG, Brasil".into()
}
fn default_city() -> String {
    "Belo Horizonte".into()
}
fn default_state() -> String {
    "MG".into()
}
fn default_language() -> String {
    "pt-br".into()
}
fn default_country() -> String {
    "br".into()
}
fn default_coordinates() -> String {
    "@-19.9191382,-43.9386291,12z".into()
}
fn default_requests_per_minute() -> u32 {
    10
}

/// `[http]` section: timeouts, retries and throttling for outbound calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per fetch, including the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries.
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Pause between leads during site analysis.
    #[serde(default = "default_site_delay")]
    pub site_delay_ms: u64,

    /// Pause between leads during social extraction.
    #[serde(default = "default_social_delay")]
    pub social_delay_ms: u64,

    /// Pause between pages of the same site during social extraction.
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// Pause between domain searches.
    #[serde(default = "default_hunter_delay")]
    pub hunter_delay_ms: u64,

    /// Pause between record upserts.
    #[serde(default = "default_sync_delay")]
    pub sync_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_ms(),
            user_agent: default_user_agent(),
            site_delay_ms: default_site_delay(),
            social_delay_ms: default_social_delay(),
            page_delay_ms: default_page_delay(),
            hunter_delay_ms: default_hunter_delay(),
            sync_delay_ms: default_sync_delay(),
        }
    }
}

impl HttpConfig {
    /// Same config with every throttle delay set to zero (tests, dry runs).
    pub fn without_delays(mut self) -> Self {
        self.backoff_base_ms = 0;
        self.site_delay_ms = 0;
        self.social_delay_ms = 0;
        self.page_delay_ms = 0;
        self.hunter_delay_ms = 0;
        self.sync_delay_ms = 0;
        self
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .into()
}
fn default_site_delay() -> u64 {
    500
}
fn default_social_delay() -> u64 {
    1000
}
fn default_page_delay() -> u64 {
    500
}
fn default_hunter_delay() -> u64 {
    1000
}
fn default_sync_delay() -> u64 {
    250
}

/// `[hunter]` section (optional domain-search enrichment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HunterConfig {
    /// Off by default: the free tier only has a handful of searches per month.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_hunter_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_hunter_url")]
    pub base_url: String,
}

impl Default for HunterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key_env: default_hunter_key_env(),
            base_url: default_hunter_url(),
        }
    }
}

fn default_hunter_key_env() -> String {
    "HUNTER_API_KEY".into()
}
fn default_hunter_url() -> String {
    "https://api.hunter.io/v2".into()
}

/// `[airtable]` section (external sync).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirtableConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_airtable_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_airtable_base_env")]
    pub base_id_env: String,

    #[serde(default = "default_table_name")]
    pub table_name: String,

    #[serde(default = "default_airtable_url")]
    pub base_url: String,
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: default_airtable_key_env(),
            base_id_env: default_airtable_base_env(),
            table_name: default_table_name(),
            base_url: default_airtable_url(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_airtable_key_env() -> String {
    "AIRTABLE_API_KEY".into()
}
fn default_airtable_base_env() -> String {
    "AIRTABLE_BASE_ID".into()
}
fn default_table_name() -> String {
    "Leads".into()
}
fn default_airtable_url() -> String {
    "https://api.airtable.com/v0".into()
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_file")]
    pub file: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: default_cache_file(),
        }
    }
}

fn default_cache_file() -> String {
    "lead_cache.json".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            checkpoint_file: default_checkpoint_file(),
        }
    }
}

fn default_checkpoint_file() -> String {
    "checkpoint.json".into()
}

// ---------------------------------------------------------------------------
// Scoring config
// ---------------------------------------------------------------------------

/// Largest value a single scoring weight may take.
const MAX_WEIGHT: u32 = 100;

/// `[scoring]` section: the weight table, priority categories and tier buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoringWeights,

    /// Categories (case-insensitive) that earn both the category-fit credit
    /// and the flat priority bonus.
    #[serde(default = "default_priority_categories")]
    pub priority_categories: Vec<String>,

    #[serde(default = "default_priority_bonus")]
    pub priority_bonus: u32,

    /// Inclusive score ranges per tier, checked in order.
    #[serde(default = "default_buckets")]
    pub buckets: Vec<ClassificationBucket>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            priority_categories: default_priority_categories(),
            priority_bonus: default_priority_bonus(),
            buckets: default_buckets(),
        }
    }
}

impl ScoringConfig {
    /// Check the weights and the bucket table.
    ///
    /// Every weight and the priority bonus must be at most 100; buckets must be
    /// well-formed ranges inside `[0, 100]` that do not overlap.
    pub fn validate(&self) -> Result<()> {
        let weights = self
            .weights
            .entries()
            .into_iter()
            .chain([("priority_bonus", self.priority_bonus)]);
        for (name, value) in weights {
            if value > MAX_WEIGHT {
                return Err(LeadPipeError::config(format!(
                    "scoring weight {name} is {value}, above {MAX_WEIGHT}"
                )));
            }
        }

        for bucket in &self.buckets {
            if bucket.min > bucket.max {
                return Err(LeadPipeError::config(format!(
                    "scoring bucket {} has min {} greater than max {}",
                    bucket.classification, bucket.min, bucket.max
                )));
            }
            if bucket.max > 100 {
                return Err(LeadPipeError::config(format!(
                    "scoring bucket {} ends at {}, past 100",
                    bucket.classification, bucket.max
                )));
            }
        }

        let mut sorted: Vec<&ClassificationBucket> = self.buckets.iter().collect();
        sorted.sort_by_key(|b| b.min);
        for pair in sorted.windows(2) {
            if pair[1].min <= pair[0].max {
                return Err(LeadPipeError::config(format!(
                    "scoring buckets {} [{}, {}] and {} [{}, {}] overlap",
                    pair[0].classification,
                    pair[0].min,
                    pair[0].max,
                    pair[1].classification,
                    pair[1].min,
                    pair[1].max
                )));
            }
        }
        Ok(())
    }

    /// Whether `category` is in the priority list (case-insensitive, trimmed).
    pub fn is_priority_category(&self, category: &str) -> bool {
        let needle = category.trim().to_lowercase();
        self.priority_categories
            .iter()
            .any(|c| c.trim().to_lowercase() == needle)
    }
}

/// Point values for each rubric signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringWeights {
    // Contact block
    #[serde(default = "w10")]
    pub has_phone: u32,
    #[serde(default = "w10")]
    pub has_email: u32,
    #[serde(default = "w10")]
    pub has_site: u32,
    #[serde(default = "w5")]
    pub site_https: u32,
    #[serde(default = "w5")]
    pub site_active: u32,

    // Digital presence block
    #[serde(default = "w10")]
    pub has_instagram: u32,
    #[serde(default = "w5")]
    pub instagram_active: u32,
    #[serde(default = "w10")]
    pub has_linkedin: u32,
    #[serde(default = "w5")]
    pub linkedin_company_page: u32,

    // Business quality block
    #[serde(default = "w10")]
    pub high_rating: u32,
    #[serde(default = "w10")]
    pub many_reviews: u32,
    #[serde(default = "w5")]
    pub opening_hours: u32,
    #[serde(default = "w5")]
    pub category_fit: u32,
}

impl ScoringWeights {
    /// Every weight with its config key.
    pub fn entries(&self) -> [(&'static str, u32); 13] {
        [
            ("has_phone", self.has_phone),
            ("has_email", self.has_email),
            ("has_site", self.has_site),
            ("site_https", self.site_https),
            ("site_active", self.site_active),
            ("has_instagram", self.has_instagram),
            ("instagram_active", self.instagram_active),
            ("has_linkedin", self.has_linkedin),
            ("linkedin_company_page", self.linkedin_company_page),
            ("high_rating", self.high_rating),
            ("many_reviews", self.many_reviews),
            ("opening_hours", self.opening_hours),
            ("category_fit", self.category_fit),
        ]
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            has_phone: 10,
            has_email: 10,
            has_site: 10,
            site_https: 5,
            site_active: 5,
            has_instagram: 10,
            instagram_active: 5,
            has_linkedin: 10,
            linkedin_company_page: 5,
            high_rating: 10,
            many_reviews: 10,
            opening_hours: 5,
            category_fit: 5,
        }
    }
}

fn w10() -> u32 {
    10
}
fn w5() -> u32 {
    5
}

/// One row of the tier table: scores in `[min, max]` get `classification`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationBucket {
    pub classification: Classification,
    pub min: u32,
    pub max: u32,
}

impl ClassificationBucket {
    pub fn contains(&self, score: u32) -> bool {
        self.min <= score && score <= self.max
    }
}

fn default_priority_categories() -> Vec<String> {
    [
        "clinica medica",
        "clinica odontologica",
        "escritorio advocacia",
        "escritorio contabilidade",
        "imobiliaria",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_priority_bonus() -> u32 {
    5
}
fn default_buckets() -> Vec<ClassificationBucket> {
    vec![
        ClassificationBucket {
            classification: Classification::Hot,
            min: 80,
            max: 100,
        },
        ClassificationBucket {
            classification: Classification::Warm,
            min: 60,
            max: 79,
        },
        ClassificationBucket {
            classification: Classification::Cold,
            min: 40,
            max: 59,
        },
        ClassificationBucket {
            classification: Classification::Low,
            min: 0,
            max: 39,
        },
    ]
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadpipe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadPipeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadpipe/leadpipe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadPipeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LeadPipeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.scoring.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadPipeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadPipeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadPipeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a credential from the environment variable named `var_name`.
pub fn resolve_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(LeadPipeError::config(format!(
            "credential not found. Set the {var_name} environment variable."
        ))),
    }
}
