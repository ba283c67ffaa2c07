use clap::Parser;
use didacta::app::App;
use didacta::cli::{Args, Command};
use didacta::config::{CliOverrides, Config};
use didacta::logging::setup_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();
    let command = args.command();

    let overrides = match &command {
        Command::Run(run) => CliOverrides {
            output_path: run.output.clone(),
        },
        Command::Query(_) => CliOverrides::default(),
    };

    // Load config before logging exists; report failures directly
    let config = match Config::load(args.config.as_deref(), overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("didacta: invalid configuration: {e:#}");
            return ExitCode::from(2);
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting didacta"
    );

    let app = match App::new(config) {
        Ok(app) => app,
        Err(e) => {
            error!(error = format!("{e:#}"), "invalid configuration");
            return ExitCode::from(2);
        }
    };

    match command {
        Command::Run(run) => match app.run(&run).await {
            Ok(summary) => {
                if run.json {
                    match serde_json::to_string_pretty(&summary) {
                        Ok(json) => println!("{json}"),
                        Err(e) => error!(error = %e, "Failed to serialize run summary"),
                    }
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = format!("{e:#}"), "Run failed");
                ExitCode::FAILURE
            }
        },
        Command::Query(query) => match app.query(&query) {
            Ok(output) => {
                println!("{output}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = format!("{e:#}"), "Query failed");
                ExitCode::FAILURE
            }
        },
    }
}
