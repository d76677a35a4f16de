//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use leadpipe_core::export::write_leads_csv;
use leadpipe_core::pipeline::{ProgressReporter, Stage};
use leadpipe_core::{Pipeline, PipelineOptions, RunSummary};
use leadpipe_shared::{AppConfig, Classification, init_config, load_config};
use leadpipe_storage::LeadCache;

/// Per-category limit forced by `run --test`.
const TEST_LIMIT: usize = 5;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// leadpipe: local business lead generation.
#[derive(Parser)]
#[command(
    name = "leadpipe",
    version,
    about = "Find local businesses, enrich and score them, and sync the leads to Airtable.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the lead pipeline.
    Run(RunArgs),

    /// List the configured business categories.
    Categories,

    /// Inspect or maintain the dedup cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Category to search (repeatable). Defaults to the configured list.
    #[arg(short = 'c', long = "category")]
    pub categories: Vec<String>,

    /// Maximum results per category.
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Continue from the last checkpoint.
    #[arg(long)]
    pub resume: bool,

    /// Small trial run: 5 results per category, no sync.
    #[arg(long)]
    pub test: bool,

    /// Skip the Airtable sync stage.
    #[arg(long)]
    pub no_sync: bool,

    /// Enable Hunter.io enrichment (uses paid credits).
    #[arg(long)]
    pub hunter: bool,

    /// Ignore the dedup cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Write the run summary as JSON to this file.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Write the processed leads as CSV to this file.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Show cache counters.
    Stats,
    /// Remove every cached lead.
    Clear,
    /// Remove leads cached more than N days ago.
    Prune {
        #[arg(long, default_value = "30")]
        days: u32,
    },
    /// Export cached leads as CSV.
    Export { path: PathBuf },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadpipe=info",
        1 => "leadpipe=debug",
        _ => "leadpipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Categories => cmd_categories(),
        Command::Cache { action } => {
            let config = load_config()?;
            let mut cache = LeadCache::open(config.cache_path());
            match action {
                CacheAction::Stats => cmd_cache_stats(&cache),
                CacheAction::Clear => {
                    cache.clear();
                    println!("Cache cleared: {}", cache.path().display());
                    Ok(())
                }
                CacheAction::Prune { days } => {
                    let removed = cache.clear_old(days);
                    println!("Removed {removed} leads older than {days} days.");
                    Ok(())
                }
                CacheAction::Export { path } => {
                    let rows = cache.export_csv(&path)?;
                    println!("Exported {rows} cached leads to {}", path.display());
                    Ok(())
                }
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Resolved knobs for one `run` invocation.
#[derive(Debug)]
struct RunPlan {
    categories: Vec<String>,
    limit: usize,
    options: PipelineOptions,
}

impl RunPlan {
    fn new(args: &RunArgs, config: &AppConfig) -> Self {
        let categories = if args.categories.is_empty() {
            config.defaults.categories.clone()
        } else {
            args.categories.clone()
        };
        let limit = if args.test {
            TEST_LIMIT
        } else {
            args.limit.unwrap_or(config.defaults.limit_per_category)
        };

        let mut options = PipelineOptions::from_config(config);
        if args.test || args.no_sync {
            options.sync = false;
        }
        if args.hunter {
            options.enrich = true;
        }
        if args.no_cache {
            options.use_cache = false;
        }

        Self {
            categories,
            limit,
            options,
        }
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = load_config()?;
    let plan = RunPlan::new(&args, &config);
    if plan.categories.is_empty() {
        return Err(eyre!("no categories to search: pass -c or set [defaults].categories"));
    }

    info!(
        categories = plan.categories.len(),
        limit = plan.limit,
        sync = plan.options.sync,
        enrich = plan.options.enrich,
        cache = plan.options.use_cache,
        resume = args.resume,
        "starting pipeline"
    );

    let mut pipeline =
        Pipeline::from_config(&config, plan.options)?.with_progress(Box::new(CliProgress::new()));
    let summary = pipeline.run(&plan.categories, plan.limit, args.resume).await?;

    print_summary(&summary);

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .map_err(|e| eyre!("failed to write summary to {}: {e}", path.display()))?;
        println!("  Summary written to {}", path.display());
    }
    if let Some(path) = &args.export {
        let rows = write_leads_csv(path, pipeline.leads())?;
        println!("  {rows} leads exported to {}", path.display());
    }

    match summary.error {
        Some(error) => Err(eyre!("pipeline aborted: {error}")),
        None => Ok(()),
    }
}

fn print_summary(summary: &RunSummary) {
    let stages = &summary.stages;

    println!();
    if let Some(error) = &summary.error {
        println!("  Pipeline aborted: {error}");
        println!();
        return;
    }
    if let Some(stage) = summary.resumed_from {
        println!("  Resumed after: {stage}");
    }
    println!("  Leads:     {}", summary.total_leads.unwrap_or(0));
    if let Some(secs) = summary.duration_secs {
        println!("  Time:      {secs:.1}s");
    }
    if let Some(search) = &stages.search {
        println!(
            "  Search:    {} found, {} new, {} already cached",
            search.leads_found, search.new_leads, search.cached_skipped
        );
    }
    if let Some(sites) = &stages.site_analysis {
        println!("  Sites:     {} active, {} https", sites.active, sites.https);
    }
    if let Some(social) = &stages.social_extraction {
        println!(
            "  Social:    {} instagram, {} linkedin, {} emails, {} phones",
            social.instagram, social.linkedin, social.emails, social.phones
        );
    }
    if let Some(enrichment) = &stages.external_enrichment {
        println!("  Hunter:    {} emails found", enrichment.emails_found);
    }
    if let Some(scoring) = &stages.scoring {
        println!(
            "  Scores:    mean {:.1}, min {}, max {}",
            scoring.mean, scoring.min, scoring.max
        );
        for classification in Classification::ALL {
            println!(
                "    {:<5}    {}",
                classification.as_str(),
                scoring.count(classification)
            );
        }
    }
    if let Some(sync) = &stages.external_sync {
        println!(
            "  Airtable:  {} created, {} updated, {} errors",
            sync.created, sync.updated, sync.errors
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Stage spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        self.spinner.set_message(format!("[{}/6] {stage}", stage.index()));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Other commands
// ---------------------------------------------------------------------------

fn cmd_categories() -> Result<()> {
    let config = load_config()?;
    println!("Categories ({}), * = priority:", config.defaults.categories.len());
    for category in &config.defaults.categories {
        let marker = if config.scoring.is_priority_category(category) {
            "*"
        } else {
            " "
        };
        println!("  {marker} {category}");
    }
    Ok(())
}

fn cmd_cache_stats(cache: &LeadCache) -> Result<()> {
    let stats = cache.stats();
    println!("  File:               {}", display_path(cache.path()));
    println!("  Cached leads:       {}", stats.total_cached);
    println!("  Total processed:    {}", stats.total_processed);
    println!("  Duplicates skipped: {}", stats.duplicates_skipped);
    match stats.last_updated {
        Some(at) => println!("  Last updated:       {}", at.to_rfc3339()),
        None => println!("  Last updated:       never"),
    }
    Ok(())
}

fn display_path(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not created yet)", path.display())
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
