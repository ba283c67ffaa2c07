//! End-to-end runs of the acquisition pipeline against canned portal pages.
//!
//! No network: a stub fetcher serves fixed markup (or a failure) per source
//! label, and every catalogue lives in its own temporary directory.

use async_trait::async_trait;
use chrono::NaiveDate;
use didacta::app::App;
use didacta::catalogue::{CatalogueWriter, WriteOutcome, placeholder_record, read_catalogue};
use didacta::config::{CliOverrides, Config};
use didacta::fetch::{FetchError, PageFetcher};
use didacta::model::{COLUMNS, CourseId};
use didacta::pipeline::{PipelineOptions, RunReport, SourceFailure, run_pipeline};
use didacta::registry::{Registry, Source};
use didacta::rules::Rules;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Serves canned responses keyed by source label, optionally after a delay.
#[derive(Default)]
struct StubFetcher {
    pages: HashMap<String, (Duration, Result<String, FetchError>)>,
}

impl StubFetcher {
    fn page(mut self, label: &str, html: &str) -> Self {
        self.pages
            .insert(label.to_string(), (Duration::ZERO, Ok(html.to_string())));
        self
    }

    fn slow_page(mut self, label: &str, delay: Duration, html: &str) -> Self {
        self.pages
            .insert(label.to_string(), (delay, Ok(html.to_string())));
        self
    }

    fn failure(mut self, label: &str, error: FetchError) -> Self {
        self.pages
            .insert(label.to_string(), (Duration::ZERO, Err(error)));
        self
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, source: &Source) -> Result<String, FetchError> {
        let Some((delay, response)) = self.pages.get(&source.label) else {
            return Err(FetchError::Network("no stub for source".to_string()));
        };
        if !delay.is_zero() {
            tokio::time::sleep(*delay).await;
        }
        response.clone()
    }
}

fn registry(entries: &[(&str, &str)]) -> Registry {
    Registry::new(
        entries
            .iter()
            .map(|(endpoint, label)| Source::new(endpoint, label).unwrap())
            .collect(),
    )
    .unwrap()
}

fn three_sources() -> Registry {
    registry(&[
        ("https://scuolafutura.pubblica.istruzione.it/corsi", "Nazionale"),
        ("https://www.istruzione.lombardia.gov.it/formazione/", "Lombardia"),
        ("https://www.usr.sicilia.it/formazione/", "Sicilia"),
    ])
}

fn options() -> PipelineOptions {
    PipelineOptions {
        max_concurrency: 3,
        request_delay: Duration::ZERO,
        request_jitter: Duration::ZERO,
        run_budget: Some(Duration::from_secs(10)),
        min_title_len: 10,
        min_id_digits: 3,
    }
}

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

const NATIONAL_PAGE: &str = r#"<html><body>
<nav><a href="/">Home</a> <a href="/privacy">Informativa sulla privacy del portale</a></nav>
<ul class="corsi">
  <li><a href="/course/detail/10101">Robotica educativa nella scuola primaria</a>
      <span>Iscrizioni entro il 30/06/2099</span></li>
  <li><a href="/course/detail/10102">Intelligenza artificiale per docenti</a></li>
</ul>
</body></html>"#;

async fn run(registry: &Registry, fetcher: &StubFetcher) -> RunReport {
    run_pipeline(registry, fetcher, &Rules::default(), &options(), run_date()).await
}

// --- Scenario A ---

#[tokio::test]
async fn test_failed_sources_do_not_affect_others() {
    let registry = three_sources();
    let fetcher = StubFetcher::default()
        .page("Nazionale", NATIONAL_PAGE)
        .failure("Lombardia", FetchError::Timeout)
        .failure("Sicilia", FetchError::Timeout);

    let report = run(&registry, &fetcher).await;

    let ids: Vec<_> = report.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["10101", "10102"]);
    assert!(report.records.iter().all(|r| r.source_label == "Nazionale"));
    assert_eq!(report.stats.sources_attempted, 3);
    assert_eq!(report.stats.sources_succeeded, 1);
    assert_eq!(
        report.stats.source_failures,
        vec![
            SourceFailure {
                label: "Lombardia".into(),
                kind: "timeout".into()
            },
            SourceFailure {
                label: "Sicilia".into(),
                kind: "timeout".into()
            },
        ]
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalogo.csv");
    let outcome = CatalogueWriter::new(&path).publish(&report.records).unwrap();
    assert_eq!(outcome, WriteOutcome::Written { rows: 2 });

    let written = read_catalogue(&path).unwrap();
    assert_eq!(written, report.records);
    assert!(!written.contains(&placeholder_record()));
}

// --- Scenario B ---

#[tokio::test]
async fn test_all_sources_failing_without_prior_file_writes_placeholder() {
    let registry = three_sources();
    let fetcher = StubFetcher::default()
        .failure("Nazionale", FetchError::Http(503))
        .failure("Lombardia", FetchError::Network("connection refused".into()))
        .failure("Sicilia", FetchError::Timeout);

    let report = run(&registry, &fetcher).await;
    assert!(report.records.is_empty());
    let kinds: Vec<_> = report
        .stats
        .source_failures
        .iter()
        .map(|f| f.kind.as_str())
        .collect();
    assert_eq!(kinds, vec!["http-error:503", "network-error", "timeout"]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalogo.csv");
    let outcome = CatalogueWriter::new(&path).publish(&report.records).unwrap();
    assert_eq!(outcome, WriteOutcome::Placeholder);

    let written = read_catalogue(&path).unwrap();
    assert_eq!(written.len(), 1);
    let placeholder = &written[0];
    assert!(matches!(placeholder.url.scheme(), "http" | "https"));
    assert!(placeholder.url.host_str().is_some());
    assert!(placeholder.title.chars().any(char::is_alphanumeric));
}

// --- Scenario C ---

#[tokio::test]
async fn test_all_sources_failing_keeps_valid_prior_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalogo.csv");

    let prior_registry = registry(&[(
        "https://scuolafutura.pubblica.istruzione.it/corsi",
        "Nazionale",
    )]);
    let prior_page = (1..=5)
        .map(|n| {
            format!(r#"<p><a href="/course/detail/5000{n}">Corso di formazione numero {n}</a></p>"#)
        })
        .collect::<String>();
    let prior = run(
        &prior_registry,
        &StubFetcher::default().page("Nazionale", &prior_page),
    )
    .await;
    assert_eq!(prior.records.len(), 5);
    CatalogueWriter::new(&path).publish(&prior.records).unwrap();
    let before = fs::read(&path).unwrap();

    let fetcher = StubFetcher::default()
        .failure("Nazionale", FetchError::Timeout)
        .failure("Lombardia", FetchError::Timeout)
        .failure("Sicilia", FetchError::Timeout);
    let report = run(&three_sources(), &fetcher).await;
    let outcome = CatalogueWriter::new(&path).publish(&report.records).unwrap();

    assert_eq!(outcome, WriteOutcome::KeptPrevious { rows: 5 });
    assert_eq!(fs::read(&path).unwrap(), before);
}

// --- Scenario D ---

#[tokio::test]
async fn test_duplicate_id_attributed_to_first_source_in_registry_order() {
    let registry = three_sources();
    let regional_page = r#"<ul>
        <li><a href="/corsi/10101-robotica">Robotica educativa (edizione regionale)</a></li>
        <li><a href="/corsi/20202-inglese">Lingue straniere e metodologia CLIL</a></li>
    </ul>"#;
    // The national page arrives last, yet must still win the tie.
    let fetcher = StubFetcher::default()
        .slow_page("Nazionale", Duration::from_millis(150), NATIONAL_PAGE)
        .page("Lombardia", regional_page)
        .failure("Sicilia", FetchError::Http(404));

    let report = run(&registry, &fetcher).await;

    let robotica: Vec<_> = report
        .records
        .iter()
        .filter(|r| r.id == CourseId::Resolved("10101".into()))
        .collect();
    assert_eq!(robotica.len(), 1);
    assert_eq!(robotica[0].source_label, "Nazionale");
    assert_eq!(
        robotica[0].url.as_str(),
        "https://scuolafutura.pubblica.istruzione.it/course/detail/10101"
    );
    assert_eq!(report.stats.duplicates_dropped, 1);

    let ids: Vec<_> = report.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["10101", "10102", "20202"]);
}

// --- Scenario E ---

#[tokio::test]
async fn test_expired_candidate_dropped() {
    let registry = registry(&[("https://www.usr.sicilia.it/formazione/", "Sicilia")]);
    let page = r#"<ul>
        <li><a href="dettaglio-corso?id=301">Coding e pensiero computazionale</a>
            Iscrizioni entro il 15/03/2024</li>
        <li><a href="dettaglio-corso?id=302">Cittadinanza digitale e sicurezza in rete</a>
            Iscrizioni entro il 15/03/2025</li>
    </ul>"#;
    let fetcher = StubFetcher::default().page("Sicilia", page);

    let report = run(&registry, &fetcher).await;

    assert_eq!(report.stats.candidates_extracted, 2);
    assert_eq!(report.stats.filter.rejected_expired, 1);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].id.as_str(), "302");
    assert_eq!(
        report.records[0].expiry_date,
        NaiveDate::from_ymd_opt(2025, 3, 15)
    );
}

// --- Properties ---

#[tokio::test]
async fn test_output_ids_distinct_and_none_expired() {
    let registry = three_sources();
    let regional_page = r#"<table>
        <tr><td><a href="/corsi/10102">Intelligenza artificiale per docenti (bis)</a></td></tr>
        <tr><td><a href="/corsi/30303">Didattica inclusiva e BES alla primaria</a> 01/09/2020</td></tr>
        <tr><td><a href="/corso/view?x=1">Percorso senza identificativo numerico</a></td></tr>
    </table>"#;
    let fetcher = StubFetcher::default()
        .page("Nazionale", NATIONAL_PAGE)
        .page("Lombardia", regional_page)
        .page("Sicilia", "<html><body><p>Nessun corso disponibile</p></body></html>");

    let report = run(&registry, &fetcher).await;

    let resolved: Vec<_> = report
        .records
        .iter()
        .filter(|r| r.id.is_resolved())
        .map(|r| r.id.as_str())
        .collect();
    let unique: HashSet<_> = resolved.iter().collect();
    assert_eq!(unique.len(), resolved.len());
    assert!(
        report
            .records
            .iter()
            .all(|r| r.expiry_date.is_none_or(|d| d >= run_date()))
    );
    assert_eq!(report.stats.sources_succeeded, 3);
}

#[tokio::test]
async fn test_repeated_runs_write_identical_files() {
    let registry = three_sources();
    let fetcher = StubFetcher::default()
        .page("Nazionale", NATIONAL_PAGE)
        .page(
            "Lombardia",
            r#"<li><a href="/corsi/40404">STEM e robotica per la secondaria</a></li>"#,
        )
        .failure("Sicilia", FetchError::Timeout);

    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");

    let report = run(&registry, &fetcher).await;
    CatalogueWriter::new(&first).publish(&report.records).unwrap();
    let report = run(&registry, &fetcher).await;
    CatalogueWriter::new(&second).publish(&report.records).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[tokio::test]
async fn test_budget_abandons_slow_sources() {
    let registry = three_sources();
    let fetcher = StubFetcher::default()
        .page("Nazionale", NATIONAL_PAGE)
        .slow_page("Lombardia", Duration::from_secs(30), "<p></p>")
        .slow_page("Sicilia", Duration::from_secs(30), "<p></p>");
    let options = PipelineOptions {
        run_budget: Some(Duration::from_millis(300)),
        ..options()
    };

    let report = run_pipeline(&registry, &fetcher, &Rules::default(), &options, run_date()).await;

    assert!(report.stats.budget_exhausted);
    assert_eq!(report.stats.sources_attempted, 3);
    assert_eq!(report.stats.sources_succeeded, 1);
    assert_eq!(
        report.stats.source_failures,
        vec![
            SourceFailure {
                label: "Lombardia".into(),
                kind: "budget-exhausted".into(),
            },
            SourceFailure {
                label: "Sicilia".into(),
                kind: "budget-exhausted".into(),
            },
        ]
    );
    assert_eq!(report.records.len(), 2);
}

// --- Courtesy delay ---

/// Notes the (paused) clock at the start of every fetch.
#[derive(Default)]
struct TimingFetcher {
    calls: Mutex<Vec<(String, Instant)>>,
}

impl TimingFetcher {
    fn times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl PageFetcher for TimingFetcher {
    async fn fetch(&self, source: &Source) -> Result<String, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((source.label.clone(), Instant::now()));
        Ok("<html><body><p>Nessun corso disponibile</p></body></html>".to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn test_sequential_fetches_are_spaced_by_request_delay() {
    let registry = three_sources();
    let fetcher = TimingFetcher::default();
    let delay = Duration::from_secs(2);
    let options = PipelineOptions {
        max_concurrency: 1,
        request_delay: delay,
        run_budget: None,
        ..options()
    };

    let start = Instant::now();
    let report = run_pipeline(&registry, &fetcher, &Rules::default(), &options, run_date()).await;

    assert_eq!(report.stats.sources_succeeded, 3);
    let labels: Vec<_> = fetcher
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(label, _)| label.clone())
        .collect();
    assert_eq!(labels, vec!["Nazionale", "Lombardia", "Sicilia"]);

    let times = fetcher.times();
    assert_eq!(times[0], start);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= delay);
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_wave_fetches_without_delay() {
    let registry = three_sources();
    let fetcher = TimingFetcher::default();
    let delay = Duration::from_secs(2);
    let options = PipelineOptions {
        max_concurrency: 2,
        request_delay: delay,
        run_budget: None,
        ..options()
    };

    let start = Instant::now();
    run_pipeline(&registry, &fetcher, &Rules::default(), &options, run_date()).await;

    let mut times = fetcher.times();
    times.sort();
    assert_eq!(times.len(), 3);
    assert_eq!(times[0], start);
    assert_eq!(times[1], start);
    assert!(times[2] - start >= delay);
}

// --- App ---

#[tokio::test]
async fn test_app_acquire_publishes_with_fixed_header() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out").join("catalogo.csv");
    let config_path = dir.path().join("didacta.toml");
    fs::write(
        &config_path,
        r#"
        request_delay = "0s"
        request_jitter = "0ms"
        run_budget = "10s"

        [[sources]]
        endpoint = "https://scuolafutura.pubblica.istruzione.it/corsi"
        label = "Nazionale"

        [[sources]]
        endpoint = "https://www.usr.sicilia.it/formazione/"
        label = "Sicilia"
        "#,
    )
    .unwrap();

    let config = Config::load(
        Some(&config_path),
        CliOverrides {
            output_path: Some(output.clone()),
        },
    )
    .unwrap();
    let app = App::new(config).unwrap();
    let fetcher = StubFetcher::default()
        .page("Nazionale", NATIONAL_PAGE)
        .failure("Sicilia", FetchError::Body("truncated".into()));

    let summary = app.acquire(&fetcher, run_date(), true).await.unwrap();

    assert_eq!(summary.outcome, Some(WriteOutcome::Written { rows: 2 }));
    assert_eq!(summary.stats.records_kept, 2);
    assert_eq!(summary.run_id.len(), 26);

    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(text.lines().next().unwrap(), COLUMNS.join(","));
    assert!(text.contains("2099-06-30"));

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["outcome"]["tier"], "written");
    assert_eq!(json["sources_succeeded"], 1);
    assert_eq!(json["source_failures"][0]["kind"], "body-error");
}

#[tokio::test]
async fn test_app_dry_run_leaves_disk_alone() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("catalogo.csv");
    let config_path = dir.path().join("didacta.toml");
    fs::write(
        &config_path,
        r#"
        request_delay = 0
        [[sources]]
        endpoint = "https://scuolafutura.pubblica.istruzione.it/corsi"
        label = "Nazionale"
        "#,
    )
    .unwrap();

    let config = Config::load(
        Some(&config_path),
        CliOverrides {
            output_path: Some(output.clone()),
        },
    )
    .unwrap();
    let app = App::new(config).unwrap();
    let fetcher = StubFetcher::default().page("Nazionale", NATIONAL_PAGE);

    let summary = app.acquire(&fetcher, run_date(), false).await.unwrap();

    assert_eq!(summary.outcome, None);
    assert_eq!(summary.stats.records_kept, 2);
    assert!(!output.exists());
}
