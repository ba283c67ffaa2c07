//! One acquisition run: fetch every source, extract and normalize its
//! candidates, then filter and deduplicate the pooled result.
//!
//! Sources are processed with bounded concurrency. Batches may complete in
//! any order, but they are merged in registry order so deduplication always
//! keeps the same representative.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use html_scraper::Html;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::dedup::dedup;
use crate::extract::Extractor;
use crate::fetch::{FetchError, PageFetcher};
use crate::filter::{FilterStats, ValidityFilter};
use crate::model::{CourseRecord, NormalizedCandidate};
use crate::normalize::Normalizer;
use crate::registry::{Registry, Source};
use crate::rules::Rules;
use crate::utils::{fmt_duration, log_if_slow};

/// A single fetch slower than this is logged.
const SLOW_FETCH_THRESHOLD: Duration = Duration::from_secs(8);

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Sources fetched at the same time; 1 means sequential.
    pub max_concurrency: usize,
    /// Pause before each fetch beyond the first wave.
    pub request_delay: Duration,
    /// Upper bound of the random extra pause added to `request_delay`.
    pub request_jitter: Duration,
    /// Whole-run wall-clock budget. Unfinished sources are abandoned.
    pub run_budget: Option<Duration>,
    pub min_title_len: usize,
    pub min_id_digits: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            request_delay: Duration::from_secs(1),
            request_jitter: Duration::from_millis(250),
            run_budget: Some(Duration::from_secs(5 * 60)),
            min_title_len: 10,
            min_id_digits: 3,
        }
    }
}

/// A source that produced no page, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub label: String,
    pub kind: String,
}

/// Run-level counters, for observability only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub sources_total: usize,
    /// Sources whose request went out, including ones cut off by the budget.
    pub sources_attempted: usize,
    pub sources_succeeded: usize,
    pub source_failures: Vec<SourceFailure>,
    pub candidates_extracted: usize,
    #[serde(flatten)]
    pub filter: FilterStats,
    pub duplicates_dropped: usize,
    pub records_kept: usize,
    pub budget_exhausted: bool,
}

/// Output of [`run_pipeline`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub records: Vec<CourseRecord>,
    pub stats: RunStats,
}

/// Candidates of one source, tagged with its registry position.
struct SourceBatch {
    index: usize,
    label: String,
    result: Result<Vec<NormalizedCandidate>, FetchError>,
}

/// Parse one fetched page and normalize every candidate on it.
///
/// Kept synchronous so the parsed document never lives across an await.
pub fn harvest_page(
    body: &str,
    source: &Source,
    extractor: &Extractor,
    normalizer: &Normalizer<'_>,
) -> Vec<NormalizedCandidate> {
    let document = Html::parse_document(body);
    extractor
        .candidates(&document)
        .map(|candidate| normalizer.normalize(source, candidate))
        .collect()
}

fn courtesy_pause(options: &PipelineOptions) -> Duration {
    let jitter_ms = options.request_jitter.as_millis() as u64;
    let jitter = if jitter_ms > 0 {
        Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    } else {
        Duration::ZERO
    };
    options.request_delay + jitter
}

/// Execute one run against `registry`, judging expiry against `run_date`.
///
/// Never fails: per-source errors are recorded in [`RunStats`] and the
/// remaining sources carry on.
pub async fn run_pipeline(
    registry: &Registry,
    fetcher: &dyn PageFetcher,
    rules: &Rules,
    options: &PipelineOptions,
    run_date: NaiveDate,
) -> RunReport {
    let started = Instant::now();
    let extractor = Extractor::new(options.min_title_len);
    let normalizer = Normalizer::new(rules, options.min_id_digits);
    let concurrency = options.max_concurrency.max(1);

    let mut stats = RunStats {
        sources_total: registry.len(),
        ..RunStats::default()
    };

    let fetching: Vec<AtomicBool> = registry
        .sources()
        .iter()
        .map(|_| AtomicBool::new(false))
        .collect();

    let extractor = &extractor;
    let normalizer = &normalizer;
    let fetching = &fetching;
    let mut batches = stream::iter(registry.sources().iter().enumerate())
        .map(|(index, source)| {
            let span = info_span!("source", label = source.label.as_str());
            async move {
                if index >= concurrency {
                    tokio::time::sleep(courtesy_pause(options)).await;
                }
                fetching[index].store(true, Ordering::Relaxed);
                let fetch_start = Instant::now();
                let result = fetcher.fetch(source).await;
                log_if_slow(fetch_start, SLOW_FETCH_THRESHOLD, "source fetch");

                let result = result.map(|body| harvest_page(&body, source, extractor, normalizer));
                SourceBatch {
                    index,
                    label: source.label.clone(),
                    result,
                }
            }
            .instrument(span)
        })
        .buffer_unordered(concurrency);

    let deadline = options
        .run_budget
        .map(|budget| tokio::time::Instant::now() + budget);
    let mut collected = Vec::with_capacity(registry.len());

    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, batches.next()).await {
                Ok(next) => next,
                Err(_) => {
                    stats.budget_exhausted = true;
                    warn!(
                        completed = collected.len(),
                        total = registry.len(),
                        "Run budget exhausted; abandoning remaining sources"
                    );
                    break;
                }
            },
            None => batches.next().await,
        };
        match next {
            Some(batch) => collected.push(batch),
            None => break,
        }
    }
    drop(batches);

    // Requests already sent when the budget ran out still count as attempts.
    if stats.budget_exhausted {
        let mut finished = vec![false; registry.len()];
        for batch in &collected {
            finished[batch.index] = true;
        }
        for (index, source) in registry.sources().iter().enumerate() {
            if fetching[index].load(Ordering::Relaxed) && !finished[index] {
                collected.push(SourceBatch {
                    index,
                    label: source.label.clone(),
                    result: Err(FetchError::BudgetExhausted),
                });
            }
        }
    }

    // Completion order is arbitrary; registry order is the tie-break.
    collected.sort_by_key(|batch| batch.index);
    stats.sources_attempted = collected.len();

    let mut pooled = Vec::new();
    for batch in collected {
        match batch.result {
            Ok(candidates) => {
                debug!(
                    label = batch.label.as_str(),
                    candidates = candidates.len(),
                    "Source harvested"
                );
                stats.sources_succeeded += 1;
                stats.candidates_extracted += candidates.len();
                pooled.extend(candidates);
            }
            Err(e) => {
                warn!(label = batch.label.as_str(), kind = e.kind(), error = %e, "Source skipped");
                stats.source_failures.push(SourceFailure {
                    label: batch.label,
                    kind: e.kind(),
                });
            }
        }
    }

    let (valid, filter_stats) = ValidityFilter::new(run_date).apply(pooled);
    stats.filter = filter_stats;

    let (records, duplicates) = dedup(valid);
    stats.duplicates_dropped = duplicates;
    stats.records_kept = records.len();

    info!(
        sources_attempted = stats.sources_attempted,
        sources_succeeded = stats.sources_succeeded,
        candidates_extracted = stats.candidates_extracted,
        rejected = stats.filter.rejected(),
        duplicates = stats.duplicates_dropped,
        records_kept = stats.records_kept,
        duration = fmt_duration(started.elapsed()),
        "Acquisition run finished"
    );

    RunReport { records, stats }
}
