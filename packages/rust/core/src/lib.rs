//! Core domain logic for leadpipe.
//!
//! This crate scores leads and drives them through the staged pipeline
//! (search, site analysis, social extraction, enrichment, scoring, sync),
//! with checkpoints for resuming and the dedup cache in front of the paid
//! stages.

pub mod checkpoint;
pub mod export;
pub mod pipeline;
pub mod scoring;
pub mod traits;

pub use pipeline::{Pipeline, PipelineComponents, PipelineOptions, RunSummary, Stage};
pub use scoring::{LeadScorer, ScoreBreakdown, ScoringSummary};
