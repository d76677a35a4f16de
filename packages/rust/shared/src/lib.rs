//! Shared types, error model, and configuration for leadpipe.
//!
//! This crate is the foundation depended on by all other leadpipe crates.
//! It provides:
//! - [`LeadPipeError`], the unified error type
//! - The lead entity model ([`Lead`], [`Website`], [`SocialProfiles`], [`MapsData`])
//! - Configuration ([`AppConfig`], [`ScoringConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AirtableConfig, AppConfig, CacheConfig, ClassificationBucket, DefaultsConfig, HttpConfig,
    HunterConfig, PipelineConfig, ScoringConfig, ScoringWeights, SearchConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_secret,
};
pub use error::{LeadPipeError, Result};
pub use types::{
    Classification, Lead, LeadStatus, MapsData, SocialProfiles, SyncReport, Website,
};
