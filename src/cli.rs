use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::model::{SchoolLevel, Topic};

/// Collects in-service training courses for school staff from the national and
/// regional portals into a single CSV catalogue.
#[derive(Parser, Debug)]
#[command(name = "didacta", version, about, long_about = None)]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    /// Configuration file (TOML). Defaults to ./didacta.toml when present
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Args {
    /// The subcommand to run; no subcommand means a plain acquisition run.
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Run(RunArgs::default()))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch every source and publish the catalogue
    Run(RunArgs),
    /// Filter the published catalogue, or print a recommendation prompt
    Query(QueryArgs),
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RunArgs {
    /// Write the catalogue here instead of the configured path
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Run the acquisition but do not touch the catalogue file
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Catalogue to read instead of the configured path
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Keep courses for this school level (or "Misto/Tutti" ones)
    #[arg(long, value_parser = parse_school_level)]
    pub school_level: Option<SchoolLevel>,

    /// Keep courses on this topic
    #[arg(long, value_parser = parse_topic)]
    pub topic: Option<Topic>,

    /// Keep courses from this region, or national ones
    #[arg(long)]
    pub region: Option<String>,

    /// Keep courses whose title contains all these words
    #[arg(long)]
    pub text: Option<String>,

    /// Print the prompt for the text generator instead of the table
    #[arg(long)]
    pub prompt: bool,
}

fn parse_school_level(raw: &str) -> Result<SchoolLevel, String> {
    raw.parse()
}

fn parse_topic(raw: &str) -> Result<Topic, String> {
    raw.parse()
}

/// Log output format.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable output
    Pretty,
    /// Structured JSON output, one event per line
    Json,
}

#[cfg(debug_assertions)]
const fn default_tracing_format() -> TracingFormat {
    TracingFormat::Pretty
}

#[cfg(not(debug_assertions))]
const fn default_tracing_format() -> TracingFormat {
    TracingFormat::Json
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_is_run() {
        let args = Args::parse_from(["didacta"]);
        assert!(matches!(args.command(), Command::Run(RunArgs { dry_run: false, .. })));
    }

    #[test]
    fn test_run_flags() {
        let args = Args::parse_from([
            "didacta",
            "run",
            "--output",
            "out.csv",
            "--dry-run",
            "--tracing",
            "json",
        ]);
        assert_eq!(args.tracing, TracingFormat::Json);
        let Command::Run(run) = args.command() else {
            panic!("expected run");
        };
        assert_eq!(run.output, Some(PathBuf::from("out.csv")));
        assert!(run.dry_run);
        assert!(!run.json);
    }

    #[test]
    fn test_query_parses_categories_by_label_or_alias() {
        let args = Args::parse_from([
            "didacta",
            "query",
            "--school-level",
            "primaria",
            "--topic",
            "stem",
            "--region",
            "Lazio",
            "--prompt",
        ]);
        let Command::Query(query) = args.command() else {
            panic!("expected query");
        };
        assert_eq!(query.school_level, Some(SchoolLevel::Primaria));
        assert_eq!(query.topic, Some(Topic::StemRobotica));
        assert_eq!(query.region.as_deref(), Some("Lazio"));
        assert!(query.prompt);
    }

    #[test]
    fn test_query_rejects_unknown_topic() {
        assert!(Args::try_parse_from(["didacta", "query", "--topic", "cucina"]).is_err());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let args = Args::parse_from(["didacta", "run", "--config", "alt.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("alt.toml")));
    }
}
