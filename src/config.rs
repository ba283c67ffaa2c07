//! Configuration for didacta.
//!
//! Values are layered with figment: the built-in defaults of
//! [`Config::default`], then an optional TOML file, then `DIDACTA_*`
//! environment variables. Durations accept human-readable strings
//! (`"20s"`, `"250ms"`, `"5m"`) or bare seconds.

use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::DEFAULT_USER_AGENT;
use crate::pipeline::PipelineOptions;
use crate::registry::{Registry, Source, default_sources};
use crate::rules::Rules;

/// Config file read when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "didacta.toml";

/// Prefix of the environment variables that override file values.
pub const ENV_PREFIX: &str = "DIDACTA_";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Log level for the didacta crate (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Where the catalogue is published.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    /// Per-request timeout.
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,
    /// Courtesy pause between consecutive fetches.
    #[serde(
        default = "default_request_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub request_delay: Duration,
    /// Random extra pause, uniformly drawn from `0..=request_jitter`.
    #[serde(
        default = "default_request_jitter",
        deserialize_with = "deserialize_duration"
    )]
    pub request_jitter: Duration,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Wall-clock bound on a whole run.
    #[serde(
        default = "default_run_budget",
        deserialize_with = "deserialize_duration"
    )]
    pub run_budget: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Minimum anchor-text length, in characters, for a link to be a candidate.
    #[serde(default = "default_min_title_len")]
    pub min_title_len: usize,
    /// Minimum length of a digit run accepted as a course id.
    #[serde(default = "default_min_id_digits")]
    pub min_id_digits: usize,
    /// Rows embedded in a recommendation prompt at most.
    #[serde(default = "default_max_prompt_rows")]
    pub max_prompt_rows: usize,
    /// Portals to visit, in priority order. Empty means the built-in list.
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub rules: Rules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            output_path: default_output_path(),
            request_timeout: default_request_timeout(),
            request_delay: default_request_delay(),
            request_jitter: default_request_jitter(),
            max_concurrency: default_max_concurrency(),
            run_budget: default_run_budget(),
            user_agent: default_user_agent(),
            min_title_len: default_min_title_len(),
            min_id_digits: default_min_id_digits(),
            max_prompt_rows: default_max_prompt_rows(),
            sources: Vec::new(),
            rules: Rules::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_path() -> PathBuf {
    PathBuf::from("Catalogo_Corsi_EFT_2026.csv")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_request_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_request_jitter() -> Duration {
    Duration::from_millis(250)
}

fn default_max_concurrency() -> usize {
    4
}

fn default_run_budget() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_min_title_len() -> usize {
    10
}

fn default_min_id_digits() -> usize {
    3
}

fn default_max_prompt_rows() -> usize {
    60
}

/// Overrides applied from the command line, on top of every other layer.
#[derive(Debug, Default, Serialize)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from defaults, `path` (or [`DEFAULT_CONFIG_FILE`])
    /// and the environment.
    ///
    /// An explicitly given file must exist; the default one is optional.
    pub fn load(path: Option<&Path>, overrides: CliOverrides) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => {
                anyhow::ensure!(
                    path.exists(),
                    "config file {} does not exist",
                    path.display()
                );
                path
            }
            None => Path::new(DEFAULT_CONFIG_FILE),
        };

        Self::figment(file)
            .merge(Serialized::defaults(overrides))
            .extract()
            .with_context(|| format!("Failed to load config (file: {})", file.display()))
    }

    fn figment(file: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Build the source registry: configured sources, or the built-in list.
    pub fn registry(&self) -> anyhow::Result<Registry> {
        let sources = if self.sources.is_empty() {
            default_sources()
        } else {
            self.sources.clone()
        };
        Registry::new(sources).context("Invalid source registry")
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            max_concurrency: self.max_concurrency.max(1),
            request_delay: self.request_delay,
            request_jitter: self.request_jitter,
            run_budget: (!self.run_budget.is_zero()).then_some(self.run_budget),
            min_title_len: self.min_title_len,
            min_id_digits: self.min_id_digits,
        }
    }
}

/// Duration as written in config: bare seconds or a string with a unit.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

/// Parse a duration string such as `"250ms"`, `"20s"` or `"5m"`.
/// A bare number is read as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let parser = DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
    ]);

    let parsed = parser
        .parse(raw.trim())
        .map_err(|e| format!("invalid duration {raw:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {raw:?}: {e}"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
