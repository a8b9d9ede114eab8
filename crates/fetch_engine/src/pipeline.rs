use std::path::PathBuf;
use std::sync::Arc;

use fetch_core::{
    apply_filters, assess_disk_space, format_size, large_download_warnings, AssetReference,
    DiskVerdict, FilterSpec, RunResult, SizeEstimate, SuffixRules,
};
use fetch_logging::{fetch_info, fetch_warn};
use thiserror::Error;
use url::Url;

use crate::enumerate::{enumeration_fan_out, validate_seeds, SourceEnumerator};
use crate::estimate::SizeEstimator;
use crate::extract::ExtractionEngine;
use crate::fetch::{FetchSettings, Fetcher, ReqwestFetcher};
use crate::inventory::scan_inventory;
use crate::persist::{available_space, ensure_output_dir, PersistError};
use crate::{DownloadEngine, EngineEvent, FetchError, ProgressSink, RunContext, Stage};

/// Half of the available hardware parallelism, at least one.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

/// Fully resolved configuration of one run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub destination: PathBuf,
    /// Scanned for existing assets in addition to `destination`.
    pub inventory_roots: Vec<PathBuf>,
    pub seeds: Vec<String>,
    pub filters: FilterSpec,
    pub rules: SuffixRules,
    pub workers: usize,
    pub fetch: FetchSettings,
    pub skip_size_check: bool,
    pub decompress: bool,
    pub delete_archives: bool,
    pub recursive: bool,
}

impl EngineConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            inventory_roots: Vec::new(),
            seeds: Vec::new(),
            filters: FilterSpec::default(),
            rules: SuffixRules::default(),
            workers: default_worker_count(),
            fetch: FetchSettings::default(),
            skip_size_check: false,
            decompress: false,
            delete_archives: false,
            recursive: false,
        }
    }

    fn scan_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.destination.clone()];
        for root in &self.inventory_roots {
            if !roots.contains(root) {
                roots.push(root.clone());
            }
        }
        roots
    }
}

/// Run-level failures. Each one stops the run before any transfer starts.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("destination unusable: {0}")]
    Destination(#[from] PersistError),
    #[error("no seed locations configured")]
    NoSeeds,
    #[error("none of the {0} seed location(s) could be reached")]
    NoValidSeeds(usize),
    #[error(
        "not enough disk space: {} required, {} available",
        format_size(*.required),
        format_size(*.available)
    )]
    InsufficientSpace { required: u64, available: u64 },
    #[error("download declined")]
    Declined,
    #[error("http client setup failed: {0}")]
    Transport(#[from] FetchError),
    #[error("background task failed: {0}")]
    Task(String),
}

/// Everything decided before the first byte is downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub work: Vec<AssetReference>,
    /// `None` when the size check was skipped.
    pub estimate: Option<SizeEstimate>,
    pub disk: Option<DiskVerdict>,
    /// Reasons to ask before proceeding; empty when no confirmation is needed.
    pub confirmations: Vec<String>,
}

impl RunPlan {
    pub fn needs_confirmation(&self) -> bool {
        !self.confirmations.is_empty()
    }
}

pub struct Pipeline {
    config: EngineConfig,
    fetcher: Arc<dyn Fetcher>,
}

impl Pipeline {
    pub fn new(config: EngineConfig) -> Result<Self, PipelineError> {
        let fetcher = Arc::new(ReqwestFetcher::new(config.fetch.clone())?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    pub fn with_fetcher(config: EngineConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Scan, enumerate, filter, estimate and check feasibility.
    ///
    /// Stems found locally are added to `ctx`'s inventory.
    pub async fn plan(&self, ctx: &RunContext, sink: &dyn ProgressSink) -> Result<RunPlan, PipelineError> {
        let config = &self.config;
        ensure_output_dir(&config.destination)?;

        let roots = config.scan_roots();
        let rules = config.rules.clone();
        let stems = tokio::task::spawn_blocking(move || scan_inventory(&roots, &rules))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?;
        for stem in &stems {
            ctx.inventory().insert(stem);
        }

        if config.seeds.is_empty() {
            return Err(PipelineError::NoSeeds);
        }
        let parsed = parse_seeds(&config.seeds);
        let fan_out = enumeration_fan_out(config.workers);
        let seeds = validate_seeds(self.fetcher.as_ref(), &parsed, fan_out).await;
        if seeds.is_empty() {
            return Err(PipelineError::NoValidSeeds(config.seeds.len()));
        }

        sink.emit(EngineEvent::StageStarted {
            stage: Stage::Enumerating,
            total: seeds.len(),
        });
        let enumerator = SourceEnumerator::new(
            self.fetcher.clone(),
            config.rules.clone(),
            config.recursive,
            fan_out,
        );
        let candidates = enumerator.enumerate(&seeds, ctx.token()).await;

        let outcome = apply_filters(candidates, &config.filters);
        fetch_info!(
            "Include filters: {}",
            describe_terms(config.filters.include_terms(), "(all)")
        );
        fetch_info!(
            "Exclude filters: {}",
            describe_terms(config.filters.exclude_terms(), "(none)")
        );
        fetch_info!(
            "Matched include: {}, matched exclude: {}, remaining: {}",
            outcome.matched_include,
            outcome.matched_exclude,
            outcome.kept.len()
        );
        let work = outcome.kept;

        let (estimate, disk) = if config.skip_size_check {
            fetch_info!("Skipping size check.");
            (None, None)
        } else {
            sink.emit(EngineEvent::StageStarted {
                stage: Stage::Estimating,
                total: work.len(),
            });
            let estimator = SizeEstimator::new(self.fetcher.clone(), config.workers);
            let estimate = estimator.estimate(&work, ctx.inventory(), ctx.token()).await;
            let disk = self.check_disk(estimate.known_bytes)?;
            (Some(estimate), disk)
        };

        let known_bytes = estimate.map_or(0, |e| e.known_bytes);
        let confirmations = large_download_warnings(work.len(), known_bytes);
        Ok(RunPlan {
            work,
            estimate,
            disk,
            confirmations,
        })
    }

    fn check_disk(&self, required: u64) -> Result<Option<DiskVerdict>, PipelineError> {
        let available = match available_space(&self.config.destination) {
            Ok(bytes) => bytes,
            Err(err) => {
                fetch_warn!("Could not determine free disk space: {}", err);
                return Ok(None);
            }
        };
        fetch_info!("Free disk space: {}", format_size(available));
        let verdict = assess_disk_space(available, required);
        match verdict {
            DiskVerdict::Insufficient {
                required,
                available,
            } => return Err(PipelineError::InsufficientSpace { required, available }),
            DiskVerdict::LowHeadroom { remaining } => fetch_warn!(
                "[!] Warning: less than {} would remain after download ({} left).",
                format_size(fetch_core::LOW_HEADROOM_BYTES),
                format_size(remaining)
            ),
            DiskVerdict::Sufficient => {}
        }
        Ok(Some(verdict))
    }

    /// Downloads the planned work, then extracts archives when enabled.
    pub async fn execute(&self, plan: RunPlan, ctx: &RunContext, sink: &dyn ProgressSink) {
        let config = &self.config;
        let downloads = DownloadEngine::new(
            self.fetcher.clone(),
            config.destination.clone(),
            config.fetch.clone(),
            config.workers,
        );
        downloads.run(plan.work, ctx, sink).await;

        if config.decompress {
            ExtractionEngine::new(config.destination.clone(), config.rules.clone(), config.workers)
                .with_max_attempts(config.fetch.max_attempts)
                .delete_archives(config.delete_archives)
                .run(ctx, sink)
                .await;
        }

        match available_space(&config.destination) {
            Ok(bytes) => fetch_info!("Free disk space after run: {}", format_size(bytes)),
            Err(err) => fetch_warn!("Could not determine free disk space: {}", err),
        }
    }

    /// Plans, asks `confirm` when the plan calls for it, then executes.
    pub async fn run(
        &self,
        ctx: &RunContext,
        sink: &dyn ProgressSink,
        confirm: impl FnOnce(&RunPlan) -> bool,
    ) -> Result<RunResult, PipelineError> {
        let plan = self.plan(ctx, sink).await?;
        if plan.needs_confirmation() && !confirm(&plan) {
            return Err(PipelineError::Declined);
        }
        self.execute(plan, ctx, sink).await;
        Ok(ctx.snapshot())
    }
}

fn parse_seeds(raw: &[String]) -> Vec<Url> {
    raw.iter()
        .filter_map(|seed| match Url::parse(seed) {
            Ok(url) => Some(url),
            Err(err) => {
                fetch_warn!("[!] Ignoring malformed seed {}: {}", seed, err);
                None
            }
        })
        .collect()
}

fn describe_terms(terms: &[String], empty: &str) -> String {
    if terms.is_empty() {
        empty.to_string()
    } else {
        terms.join(", ")
    }
}
