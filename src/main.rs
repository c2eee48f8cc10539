mod cli;

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, Commands, Outcome};
use repo_graph::config::Config;
use repo_graph::error::GraphError;

const EXIT_ERROR: u8 = 1;
const EXIT_NOT_FOUND: u8 = 2;
const EXIT_CYCLES: u8 = 3;

fn init_logging(cli: &Cli, config: Option<&Config>) {
    let level = if cli.debug {
        "debug".to_string()
    } else if cli.verbose {
        "info".to_string()
    } else {
        config
            .map(|c| c.logging.level.to_ascii_lowercase())
            .unwrap_or_else(|| "warn".to_string())
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("repo_graph={}", level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(cli: Cli, config: Config) -> anyhow::Result<Outcome> {
    let repo = cli.repo.as_path();
    match cli.command {
        Commands::Analyze {
            lang,
            include_tests,
            workers,
            show_cycles,
            output,
            compact,
            no_cache,
        } => cli::analyze(
            repo,
            &config,
            lang.as_deref(),
            include_tests,
            workers,
            show_cycles,
            output.as_deref(),
            compact,
            no_cache,
        ),
        Commands::Query { query } => cli::query(repo, &config, query),
        Commands::Cache { command } => cli::cache(repo, &config, command),
        Commands::Snapshot { output } => cli::snapshot(repo, &config, output.as_deref()),
        Commands::Languages => cli::languages(),
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<GraphError>() {
        Some(e) if e.is_not_found() => EXIT_NOT_FOUND,
        _ => EXIT_ERROR,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::load(&cli.repo);
    init_logging(&cli, config.as_ref().ok());

    let outcome = config
        .map_err(anyhow::Error::from)
        .and_then(|config| run(cli, config));

    match outcome {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::CyclesFound) => ExitCode::from(EXIT_CYCLES),
        Err(err) => {
            eprintln!("{}", json!({ "error": format!("{:#}", err) }));
            ExitCode::from(exit_code_for(&err))
        }
    }
}
