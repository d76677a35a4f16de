//! Seams between the pipeline controller and its collaborators.
//!
//! The controller only talks to these traits; the concrete clients from the
//! search, enrichers and sync crates implement them below, and tests swap in
//! in-memory fakes.

use async_trait::async_trait;

use leadpipe_enrichers::{HunterEnricher, SocialExtractor, WebsiteAnalyzer};
use leadpipe_search::SerpApiSearch;
use leadpipe_shared::{Lead, Result, SyncReport};
use leadpipe_sync::AirtableSync;

/// Produces raw leads for a set of categories.
#[async_trait]
pub trait LeadSource: Send + Sync {
    async fn search_all_categories(
        &self,
        categories: &[String],
        limit_per_category: usize,
    ) -> Result<Vec<Lead>>;
}

/// Checks each lead's website (reachability, HTTPS) and picks up contact data.
#[async_trait]
pub trait SiteAnalyzer: Send + Sync {
    async fn analyze_leads(&self, leads: Vec<Lead>) -> Result<Vec<Lead>>;
}

/// Fills social profiles from each lead's website.
#[async_trait]
pub trait SocialEnricher: Send + Sync {
    async fn enrich_leads(&self, leads: Vec<Lead>) -> Result<Vec<Lead>>;
}

/// Optional paid enrichment. Quota checks are the implementation's business.
#[async_trait]
pub trait ExternalEnricher: Send + Sync {
    async fn enrich_leads(&self, leads: Vec<Lead>) -> Result<Vec<Lead>>;
}

/// External store the finished leads are upserted into.
#[async_trait]
pub trait LeadSink: Send + Sync {
    /// Permission and connectivity check run before any paid search call.
    async fn test_connection(&self) -> bool;

    /// Upsert every lead, marking the ones that made it with `synced`.
    async fn sync_leads(&self, leads: &mut [Lead]) -> Result<SyncReport>;
}

// ---------------------------------------------------------------------------
// Concrete collaborators
// ---------------------------------------------------------------------------

#[async_trait]
impl LeadSource for SerpApiSearch {
    async fn search_all_categories(
        &self,
        categories: &[String],
        limit_per_category: usize,
    ) -> Result<Vec<Lead>> {
        Ok(SerpApiSearch::search_all_categories(self, categories, limit_per_category).await)
    }
}

#[async_trait]
impl SiteAnalyzer for WebsiteAnalyzer {
    async fn analyze_leads(&self, leads: Vec<Lead>) -> Result<Vec<Lead>> {
        Ok(WebsiteAnalyzer::analyze_leads(self, leads).await)
    }
}

#[async_trait]
impl SocialEnricher for SocialExtractor {
    async fn enrich_leads(&self, leads: Vec<Lead>) -> Result<Vec<Lead>> {
        Ok(SocialExtractor::enrich_leads(self, leads).await)
    }
}

#[async_trait]
impl ExternalEnricher for HunterEnricher {
    async fn enrich_leads(&self, leads: Vec<Lead>) -> Result<Vec<Lead>> {
        Ok(HunterEnricher::enrich_leads(self, leads).await)
    }
}

#[async_trait]
impl LeadSink for AirtableSync {
    async fn test_connection(&self) -> bool {
        AirtableSync::test_connection(self).await
    }

    async fn sync_leads(&self, leads: &mut [Lead]) -> Result<SyncReport> {
        Ok(AirtableSync::sync_leads(self, leads).await)
    }
}
