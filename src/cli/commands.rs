use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use repo_graph::cache::CacheManager;
use repo_graph::config::Config;
use repo_graph::indexer::{AnalyzerOptions, RepositoryAnalyzer};
use repo_graph::languages::ExtractorRegistry;
use repo_graph::model::{AnalysisResult, Language};
use repo_graph::query::{QueryEngine, SearchQuery};
use repo_graph::snapshot::StructureSnapshot;

#[derive(Parser)]
#[command(name = "repo-graph")]
#[command(about = "Dependency and symbol graph of a source repository, with cached queries")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Analyze the current repository and print the full result
    repo-graph analyze

    # Analyze only Python and TypeScript, failing when import cycles exist
    repo-graph analyze --lang py,ts --show-cycles

    # Who calls a function?
    repo-graph query callers parse_config

    # Shortest import chain between two files
    repo-graph query path src/app.ts src/db/pool.ts

    # Files over a complexity threshold in Go
    repo-graph query search --complexity-gt 20 --lang go

    # Inspect or rebuild the cache
    repo-graph cache status
    repo-graph cache warm
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    /// Log progress at info level
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log at debug level
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze the repository and print the analysis result
    Analyze {
        /// Comma-separated languages to include (py, js, ts, go)
        #[arg(long)]
        lang: Option<String>,

        /// Include test files
        #[arg(long)]
        include_tests: bool,

        /// Worker threads (0 = one per CPU)
        #[arg(long)]
        workers: Option<usize>,

        /// Report dependency cycles and exit with code 3 if any exist
        #[arg(long)]
        show_cycles: bool,

        /// Write the result to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,

        /// Do not update the cache (overrides above never update it)
        #[arg(long)]
        no_cache: bool,
    },

    /// Query the (cached) repository graph
    Query {
        #[command(subcommand)]
        query: QueryCommands,
    },

    /// Manage the analysis cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Export a deterministic structure snapshot
    Snapshot {
        /// Write the snapshot to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// List supported languages and their file extensions
    Languages,
}

#[derive(Subcommand)]
pub enum QueryCommands {
    /// Call sites of a symbol (exact, case-sensitive name)
    Callers {
        symbol: String,
    },

    /// Files that depend on a file
    Dependents {
        file: String,
    },

    /// Direct dependencies of a file
    Deps {
        file: String,
    },

    /// Everything known about a file
    Context {
        file: String,
    },

    /// Filter files; all given filters must match
    Search {
        /// Regular expression searched in the file path
        #[arg(long)]
        name_matches: Option<String>,

        /// Complexity strictly greater than this (files without a metric always match)
        #[arg(long)]
        complexity_gt: Option<u32>,

        /// Language name or tag (case-insensitive)
        #[arg(long)]
        lang: Option<String>,

        /// File declares a symbol with exactly this name
        #[arg(long)]
        has_symbol: Option<String>,
    },

    /// Shortest dependency path between two files
    Path {
        from: String,
        to: String,
    },

    /// Symbols declared in a file
    Symbols {
        file: String,
    },

    /// Dependency cycles between files
    Cycles,

    /// Counts of files, symbols and edges
    Stats,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show whether a cache exists and is fresh
    Status,

    /// Analyze if needed and store the result
    Warm,

    /// Delete the cache file
    Clear,
}

/// How a successful command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    CyclesFound,
}

pub fn parse_languages(list: &str) -> anyhow::Result<Vec<Language>> {
    let mut languages = list
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(|tag| tag.parse::<Language>())
        .collect::<Result<Vec<_>, _>>()?;
    languages.sort();
    languages.dedup();
    Ok(languages)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>, compact: bool) -> anyhow::Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, text + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn cache_manager(repo: &Path, config: &Config) -> anyhow::Result<CacheManager> {
    Ok(CacheManager::from_config(repo, config)?)
}

fn load_result(repo: &Path, config: &Config) -> anyhow::Result<AnalysisResult> {
    Ok(cache_manager(repo, config)?.load_or_analyze()?)
}

#[allow(clippy::too_many_arguments)]
pub fn analyze(
    repo: &Path,
    config: &Config,
    lang: Option<&str>,
    include_tests: bool,
    workers: Option<usize>,
    show_cycles: bool,
    output: Option<&Path>,
    compact: bool,
    no_cache: bool,
) -> anyhow::Result<Outcome> {
    let configured = AnalyzerOptions::from_config(config)?;
    let mut options = configured.clone();
    if let Some(list) = lang {
        options.languages = parse_languages(list)?;
    }
    if include_tests {
        options.include_tests = true;
    }
    if let Some(workers) = workers {
        options.workers = workers;
    }

    // The cache backs every query, so it only ever holds a configured run.
    let cacheable = !no_cache && options == configured;
    if !no_cache && !cacheable {
        info!("Command-line overrides in effect, leaving the cache untouched");
    }

    let result = RepositoryAnalyzer::new(options).analyze(repo)?;
    if cacheable {
        cache_manager(repo, config)?.save(&result)?;
    }
    write_json(&result, output, compact)?;

    if show_cycles {
        let cycles = QueryEngine::new(result).cycles();
        if cycles.count > 0 {
            warn!("{} dependency cycles found", cycles.count);
            eprintln!("{}", serde_json::to_string(&cycles)?);
            return Ok(Outcome::CyclesFound);
        }
    }
    Ok(Outcome::Success)
}

pub fn query(repo: &Path, config: &Config, command: QueryCommands) -> anyhow::Result<Outcome> {
    if let QueryCommands::Search {
        name_matches: None,
        complexity_gt: None,
        lang: None,
        has_symbol: None,
    } = command
    {
        bail!("search needs at least one of --name-matches, --complexity-gt, --lang, --has-symbol");
    }

    let engine = QueryEngine::new(load_result(repo, config)?);
    match command {
        QueryCommands::Callers { symbol } => print_json(&engine.callers(&symbol))?,
        QueryCommands::Dependents { file } => print_json(&engine.dependents(&file))?,
        QueryCommands::Deps { file } => print_json(&engine.deps(&file))?,
        QueryCommands::Context { file } => print_json(&engine.context(&file)?)?,
        QueryCommands::Search {
            name_matches,
            complexity_gt,
            lang,
            has_symbol,
        } => {
            let query = SearchQuery {
                name_pattern: name_matches,
                complexity_gt,
                lang,
                has_symbol,
            };
            print_json(&engine.search(&query)?)?;
        }
        QueryCommands::Path { from, to } => print_json(&engine.path(&from, &to))?,
        QueryCommands::Symbols { file } => print_json(&engine.symbols(&file)?)?,
        QueryCommands::Cycles => print_json(&engine.cycles())?,
        QueryCommands::Stats => print_json(&engine.stats())?,
    }
    Ok(Outcome::Success)
}

pub fn cache(repo: &Path, config: &Config, command: CacheCommands) -> anyhow::Result<Outcome> {
    let cache = cache_manager(repo, config)?;
    match command {
        CacheCommands::Status => print_json(&cache.status())?,
        CacheCommands::Warm => {
            let result = cache.load_or_analyze()?;
            print_json(&json!({"warmed": true, "file_count": result.file_count()}))?;
        }
        CacheCommands::Clear => {
            cache.clear()?;
            print_json(&json!({"cleared": true}))?;
        }
    }
    Ok(Outcome::Success)
}

pub fn snapshot(repo: &Path, config: &Config, output: Option<&Path>) -> anyhow::Result<Outcome> {
    let result = load_result(repo, config)?;
    write_json(&StructureSnapshot::from_result(&result), output, false)?;
    Ok(Outcome::Success)
}

#[derive(Serialize)]
struct LanguageEntry {
    language: &'static str,
    tag: &'static str,
    extensions: &'static [&'static str],
}

pub fn languages() -> anyhow::Result<Outcome> {
    let entries: Vec<LanguageEntry> = ExtractorRegistry::new()
        .supported_languages()
        .into_iter()
        .map(|language| LanguageEntry {
            language: language.as_str(),
            tag: language.tag(),
            extensions: language.extensions(),
        })
        .collect();
    print_json(&entries)?;
    Ok(Outcome::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_languages() {
        assert_eq!(
            parse_languages("ts, py,ts").unwrap(),
            vec![Language::Python, Language::TypeScript]
        );
        assert!(parse_languages("py,cobol").is_err());
        assert!(parse_languages("").unwrap().is_empty());
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["repo-graph", "query", "path", "a.py", "b.py", "--repo", "/tmp/x"])
            .unwrap();
        assert_eq!(cli.repo, PathBuf::from("/tmp/x"));
        assert!(matches!(
            cli.command,
            Commands::Query {
                query: QueryCommands::Path { .. }
            }
        ));
    }

    #[test]
    fn test_verbose_and_debug_conflict() {
        assert!(Cli::try_parse_from(["repo-graph", "--verbose", "--debug", "languages"]).is_err());
    }
}
