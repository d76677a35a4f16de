//! Staged lead pipeline: search → site analysis → social extraction →
//! external enrichment → scoring → external sync.
//!
//! Each completed stage commits a checkpoint holding the lead collection and
//! the summary so far, so an interrupted or failed run can pick up after the
//! last committed stage with `resume`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use leadpipe_enrichers::{HunterEnricher, SocialExtractor, WebsiteAnalyzer};
use leadpipe_search::SerpApiSearch;
use leadpipe_shared::{AppConfig, Lead, Result, SyncReport};
use leadpipe_storage::LeadCache;
use leadpipe_sync::AirtableSync;

use crate::checkpoint::CheckpointStore;
use crate::scoring::{LeadScorer, ScoringSummary};
use crate::traits::{ExternalEnricher, LeadSink, LeadSource, SiteAnalyzer, SocialEnricher};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Ordered pipeline stages. Checkpoints store the index of the last completed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Stage {
    Search = 1,
    SiteAnalysis = 2,
    SocialExtraction = 3,
    ExternalEnrichment = 4,
    Scoring = 5,
    ExternalSync = 6,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Self::Search,
        Self::SiteAnalysis,
        Self::SocialExtraction,
        Self::ExternalEnrichment,
        Self::Scoring,
        Self::ExternalSync,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::SiteAnalysis => "site analysis",
            Self::SocialExtraction => "social extraction",
            Self::ExternalEnrichment => "external enrichment",
            Self::Scoring => "scoring",
            Self::ExternalSync => "external sync",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.index()
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Stage::ALL
            .into_iter()
            .find(|s| s.index() == value)
            .ok_or_else(|| format!("unknown pipeline stage {value}"))
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReport {
    pub leads_found: usize,
    /// Leads left after cache filtering (equal to `leads_found` without a cache).
    pub new_leads: usize,
    pub cached_skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteReport {
    pub active: usize,
    pub https: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialReport {
    pub instagram: usize,
    pub linkedin: usize,
    pub emails: usize,
    pub phones: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub emails_found: usize,
}

/// Per-stage statistics; a stage that did not run stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageReports {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_analysis: Option<SiteReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_extraction: Option<SocialReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_enrichment: Option<EnrichmentReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_sync: Option<SyncReport>,
}

/// Outcome of [`Pipeline::run`].
///
/// A run that stopped early has no `finished_at`. A run refused by the
/// pre-flight check carries `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    #[serde(default)]
    pub stages: StageReports,
    #[serde(default)]
    pub total_leads: Option<usize>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<Stage>,
}

impl RunSummary {
    pub fn new(categories: Vec<String>) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            categories,
            stages: StageReports::default(),
            total_leads: None,
            duration_secs: None,
            error: None,
            resumed_from: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage starts.
    fn stage(&self, stage: Stage);
    /// Called once the run returns a summary.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Everything a [`Pipeline`] is built from.
pub struct PipelineComponents {
    pub search: Box<dyn LeadSource>,
    pub site_analyzer: Box<dyn SiteAnalyzer>,
    pub social_extractor: Box<dyn SocialEnricher>,
    pub enricher: Option<Box<dyn ExternalEnricher>>,
    pub sink: Option<Box<dyn LeadSink>>,
    pub scorer: LeadScorer,
    pub cache: Option<LeadCache>,
    pub checkpoints: CheckpointStore,
}

/// Which optional parts [`Pipeline::from_config`] should try to enable.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub enrich: bool,
    pub sync: bool,
    pub use_cache: bool,
}

impl PipelineOptions {
    /// Defaults taken from the config file sections.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            enrich: config.hunter.enabled,
            sync: config.airtable.enabled,
            use_cache: config.cache.enabled,
        }
    }
}

pub struct Pipeline {
    search: Box<dyn LeadSource>,
    site_analyzer: Box<dyn SiteAnalyzer>,
    social_extractor: Box<dyn SocialEnricher>,
    enricher: Option<Box<dyn ExternalEnricher>>,
    sink: Option<Box<dyn LeadSink>>,
    scorer: LeadScorer,
    cache: Option<LeadCache>,
    checkpoints: CheckpointStore,
    progress: Box<dyn ProgressReporter>,
    leads: Vec<Lead>,
}

impl Pipeline {
    pub fn new(components: PipelineComponents) -> Self {
        Self {
            search: components.search,
            site_analyzer: components.site_analyzer,
            social_extractor: components.social_extractor,
            enricher: components.enricher,
            sink: components.sink,
            scorer: components.scorer,
            cache: components.cache,
            checkpoints: components.checkpoints,
            progress: Box::new(SilentProgress),
            leads: Vec::new(),
        }
    }

    /// Build the real collaborators from `config`.
    ///
    /// The search client is required and its error is returned. The optional
    /// enricher and sink are dropped with a warning when they cannot be built.
    pub fn from_config(config: &AppConfig, options: PipelineOptions) -> Result<Self> {
        let search = SerpApiSearch::new(&config.search, &config.http)?;
        let site_analyzer = WebsiteAnalyzer::new(&config.http)?;
        let social_extractor = SocialExtractor::new(&config.http)?;
        let scorer = LeadScorer::new(config.scoring.clone())?;

        let enricher: Option<Box<dyn ExternalEnricher>> = if options.enrich {
            match HunterEnricher::new(&config.hunter, &config.http) {
                Ok(hunter) => {
                    info!("external enrichment enabled");
                    Some(Box::new(hunter))
                }
                Err(e) => {
                    warn!(error = %e, "external enrichment unavailable, stage disabled");
                    None
                }
            }
        } else {
            None
        };

        let sink: Option<Box<dyn LeadSink>> = if options.sync {
            match AirtableSync::new(&config.airtable, &config.http) {
                Ok(airtable) => {
                    info!(table = %config.airtable.table_name, "external sync enabled");
                    Some(Box::new(airtable))
                }
                Err(e) => {
                    warn!(error = %e, "external sync unavailable, stage disabled");
                    None
                }
            }
        } else {
            None
        };

        let cache = options.use_cache.then(|| {
            let cache = LeadCache::open(config.cache_path());
            info!(cached = cache.len(), "dedup cache active");
            cache
        });

        Ok(Self::new(PipelineComponents {
            search: Box::new(search),
            site_analyzer: Box::new(site_analyzer),
            social_extractor: Box::new(social_extractor),
            enricher,
            sink,
            scorer,
            cache,
            checkpoints: CheckpointStore::new(config.checkpoint_path()),
        }))
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Leads processed by the most recent run.
    pub fn leads(&self) -> &[Lead] {
        &self.leads
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn has_enricher(&self) -> bool {
        self.enricher.is_some()
    }

    /// Run every stage not yet committed.
    ///
    /// With `resume`, the last checkpoint (if any) supplies the leads, the
    /// summary and the stage to continue after. A stage error is returned as
    /// is and leaves the last checkpoint in place.
    #[instrument(skip_all, fields(categories = categories.len(), limit = limit_per_category, resume = resume))]
    pub async fn run(
        &mut self,
        categories: &[String],
        limit_per_category: usize,
        resume: bool,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let mut leads: Vec<Lead> = Vec::new();
        let mut completed: u8 = 0;
        let mut summary = RunSummary::new(categories.to_vec());

        if resume {
            match self.checkpoints.load() {
                Some(checkpoint) => {
                    info!(
                        stage = %checkpoint.stage,
                        leads = checkpoint.leads.len(),
                        "resuming after checkpoint"
                    );
                    completed = checkpoint.stage.index();
                    leads = checkpoint.leads;
                    summary = checkpoint.summary;
                    summary.resumed_from = Some(checkpoint.stage);
                }
                None => info!("no checkpoint found, starting from scratch"),
            }
        }

        info!(
            categories = summary.categories.len(),
            limit_per_category, "starting pipeline"
        );

        // Pre-flight before any paid search call.
        let reachable = match &self.sink {
            Some(sink) => sink.test_connection().await,
            None => true,
        };
        if !reachable {
            error!("external store rejected the connection check, aborting before search");
            summary.error = Some("external sync pre-flight check failed".into());
            return Ok(self.stop_early(leads, summary));
        }

        if completed < Stage::Search.index() {
            self.progress.stage(Stage::Search);
            info!("=== stage 1: search ===");
            let found = self
                .search
                .search_all_categories(&summary.categories, limit_per_category)
                .await?;
            let leads_found = found.len();
            info!(leads_found, "search finished");

            if found.is_empty() {
                warn!("no leads found, stopping");
                summary.stages.search = Some(SearchReport::default());
                summary.total_leads = Some(0);
                return Ok(self.stop_early(leads, summary));
            }

            leads = match &mut self.cache {
                Some(cache) => cache.filter_new(found),
                None => found,
            };
            summary.stages.search = Some(SearchReport {
                leads_found,
                new_leads: leads.len(),
                cached_skipped: leads_found - leads.len(),
            });

            if leads.is_empty() {
                info!("every lead is already cached, nothing new to process");
                summary.total_leads = Some(0);
                return Ok(self.stop_early(leads, summary));
            }
            self.checkpoints.save(Stage::Search, &leads, &summary)?;
        }

        if completed < Stage::SiteAnalysis.index() {
            self.progress.stage(Stage::SiteAnalysis);
            info!("=== stage 2: site analysis ===");
            leads = self.site_analyzer.analyze_leads(leads).await?;
            let report = SiteReport {
                active: leads.iter().filter(|l| l.site_active()).count(),
                https: leads.iter().filter(|l| l.site_https()).count(),
            };
            info!(active = report.active, https = report.https, "site analysis finished");
            summary.stages.site_analysis = Some(report);
            self.checkpoints.save(Stage::SiteAnalysis, &leads, &summary)?;
        }

        if completed < Stage::SocialExtraction.index() {
            self.progress.stage(Stage::SocialExtraction);
            info!("=== stage 3: social extraction ===");
            leads = self.social_extractor.enrich_leads(leads).await?;
            let report = SocialReport {
                instagram: leads.iter().filter(|l| l.social.has_instagram()).count(),
                linkedin: leads.iter().filter(|l| l.social.has_linkedin()).count(),
                emails: leads.iter().filter(|l| l.has_email()).count(),
                phones: leads.iter().filter(|l| l.has_phone()).count(),
            };
            info!(
                instagram = report.instagram,
                linkedin = report.linkedin,
                emails = report.emails,
                phones = report.phones,
                "social extraction finished"
            );
            summary.stages.social_extraction = Some(report);
            self.checkpoints
                .save(Stage::SocialExtraction, &leads, &summary)?;
        }

        if completed < Stage::ExternalEnrichment.index() {
            if let Some(enricher) = &self.enricher {
                self.progress.stage(Stage::ExternalEnrichment);
                info!("=== stage 4: external enrichment ===");
                leads = enricher.enrich_leads(leads).await?;
                let emails_found = leads.iter().filter(|l| l.has_email()).count();
                info!(emails_found, "external enrichment finished");
                summary.stages.external_enrichment = Some(EnrichmentReport { emails_found });
            }
            self.checkpoints
                .save(Stage::ExternalEnrichment, &leads, &summary)?;
        }

        if completed < Stage::Scoring.index() {
            self.progress.stage(Stage::Scoring);
            info!("=== stage 5: scoring ===");
            leads = self.scorer.score_leads(leads);
            let scoring = self.scorer.get_summary(&leads);
            info!(
                mean = format_args!("{:.1}", scoring.mean),
                hot = scoring.hot,
                warm = scoring.warm,
                "scoring finished"
            );
            summary.stages.scoring = Some(scoring);
            self.checkpoints.save(Stage::Scoring, &leads, &summary)?;
        }

        if completed < Stage::ExternalSync.index() {
            if let Some(sink) = &self.sink {
                self.progress.stage(Stage::ExternalSync);
                info!("=== stage 6: external sync ===");
                let report = sink.sync_leads(&mut leads).await?;
                info!(
                    created = report.created,
                    updated = report.updated,
                    errors = report.errors,
                    "external sync finished"
                );
                summary.stages.external_sync = Some(report);
                self.checkpoints
                    .save(Stage::ExternalSync, &leads, &summary)?;
            }
        }

        self.commit_to_cache(&leads);

        let elapsed = start.elapsed();
        summary.finished_at = Some(Utc::now());
        summary.duration_secs = Some(elapsed.as_secs_f64());
        summary.total_leads = Some(leads.len());

        self.checkpoints.clear()?;
        info!(
            total = leads.len(),
            elapsed_secs = format_args!("{:.1}", elapsed.as_secs_f64()),
            "pipeline complete"
        );

        self.leads = leads;
        self.progress.done(&summary);
        Ok(summary)
    }

    /// With a sink only confirmed leads are cached, so failed ones are retried next run.
    fn commit_to_cache(&mut self, leads: &[Lead]) {
        let Some(cache) = &mut self.cache else {
            return;
        };

        if self.sink.is_some() {
            let synced: Vec<Lead> = leads.iter().filter(|l| l.synced).cloned().collect();
            cache.add_many(&synced);
            let unsynced = leads.len() - synced.len();
            if unsynced > 0 {
                warn!(unsynced, "leads not cached because sync failed, they will be retried");
            }
        } else {
            cache.add_many(leads);
        }
        info!(cached = cache.len(), "cache updated");
    }

    fn stop_early(&mut self, leads: Vec<Lead>, summary: RunSummary) -> RunSummary {
        self.leads = leads;
        self.progress.done(&summary);
        summary
    }
}
