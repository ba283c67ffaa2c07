use crate::catalogue::{CatalogueError, CatalogueWriter, WriteOutcome, read_catalogue};
use crate::cli::{QueryArgs, RunArgs};
use crate::config::Config;
use crate::consumer::{CatalogueQuery, build_prompt, render_table, select};
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::pipeline::{RunStats, run_pipeline};
use crate::registry::Registry;
use crate::utils::fmt_duration;
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{Instrument, info, info_span};
use ulid::Ulid;

/// Everything a finished acquisition run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub run_date: NaiveDate,
    #[serde(flatten)]
    pub stats: RunStats,
    /// `None` for dry runs.
    pub outcome: Option<WriteOutcome>,
}

/// Main application struct: validated configuration and the source registry.
pub struct App {
    config: Config,
    registry: Registry,
}

impl App {
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        let registry = config.registry()?;
        info!(
            sources = registry.len(),
            output = %config.output_path.display(),
            max_concurrency = config.max_concurrency,
            request_timeout = fmt_duration(config.request_timeout),
            run_budget = fmt_duration(config.run_budget),
            "configuration loaded"
        );
        Ok(App { config, registry })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Today in Italy; expiry dates on the portals are local dates.
    pub fn run_date() -> NaiveDate {
        Utc::now().with_timezone(&chrono_tz::Europe::Rome).date_naive()
    }

    /// Acquisition run over HTTP.
    pub async fn run(&self, args: &RunArgs) -> Result<RunSummary, anyhow::Error> {
        let fetcher = HttpFetcher::new(&self.config.user_agent, self.config.request_timeout)
            .context("Failed to build HTTP client")?;
        let summary = self
            .acquire(&fetcher, Self::run_date(), !args.dry_run)
            .await
            .context("Failed to publish catalogue")?;
        Ok(summary)
    }

    /// Run the pipeline with `fetcher` and, when `publish` is set, hand the
    /// result to the catalogue writer.
    ///
    /// Source failures never surface here; the only error is being unable to
    /// write the catalogue.
    pub async fn acquire(
        &self,
        fetcher: &dyn PageFetcher,
        run_date: NaiveDate,
        publish: bool,
    ) -> Result<RunSummary, CatalogueError> {
        let run_id = Ulid::new().to_string();
        let span = info_span!("run", run_id = run_id.as_str(), %run_date);

        async {
            let started = Instant::now();
            info!(sources = self.registry.len(), "Acquisition run started");

            let report = run_pipeline(
                &self.registry,
                fetcher,
                &self.config.rules,
                &self.config.pipeline_options(),
                run_date,
            )
            .await;

            let outcome = if publish {
                let writer = CatalogueWriter::new(&self.config.output_path);
                Some(writer.publish(&report.records)?)
            } else {
                info!(records = report.records.len(), "Dry run; catalogue not written");
                None
            };

            info!(
                duration = fmt_duration(started.elapsed()),
                outcome = ?outcome,
                "Acquisition run complete"
            );

            Ok::<_, CatalogueError>(RunSummary {
                run_id: run_id.clone(),
                run_date,
                stats: report.stats,
                outcome,
            })
        }
        .instrument(span)
        .await
    }

    /// Filter the published catalogue and render the result, or the prompt.
    pub fn query(&self, args: &QueryArgs) -> Result<String, anyhow::Error> {
        let path = args.input.as_deref().unwrap_or(&self.config.output_path);
        let records = read_catalogue(path)
            .with_context(|| format!("Failed to read catalogue {}", path.display()))?;

        let query = CatalogueQuery {
            school_level: args.school_level,
            topic: args.topic,
            region: args.region.clone(),
            text: args.text.clone(),
        };
        let selected = select(&records, &query);
        info!(
            total = records.len(),
            matched = selected.len(),
            "Catalogue filtered"
        );

        let max_rows = self.config.max_prompt_rows;
        Ok(if args.prompt {
            build_prompt(&query, &selected, max_rows)
        } else {
            render_table(&selected, max_rows)
        })
    }
}
