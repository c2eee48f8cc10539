//! Repository model builder: walks a repository, extracts every file in
//! parallel and links the results into an [`AnalysisResult`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{GraphError, Result};
use crate::indexer::extractor::{CallSite, ExtractedStructure};
use crate::indexer::progress::AnalysisProgress;
use crate::indexer::walker::FileWalker;
use crate::languages::ExtractorRegistry;
use crate::model::ids::{content_hash, file_id};
use crate::model::{
    relative_path, AnalysisResult, FileRecord, FunctionDependency, Language, LanguageSummary,
    SymbolKind,
};

/// Produces a fully materialised [`AnalysisResult`] for a repository root.
pub trait ModelBuilder {
    fn analyze(&self, repo_root: &Path) -> Result<AnalysisResult>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerOptions {
    /// Worker threads; 0 uses one per CPU.
    pub workers: usize,
    pub include_tests: bool,
    /// Empty means every supported language.
    pub languages: Vec<Language>,
    pub exclude: Vec<String>,
    pub max_file_bytes: u64,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default()).unwrap_or(Self {
            workers: 0,
            include_tests: false,
            languages: Vec::new(),
            exclude: Vec::new(),
            max_file_bytes: 1024 * 1024,
        })
    }
}

impl AnalyzerOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            workers: config.analysis.workers,
            include_tests: config.analysis.include_tests,
            languages: config.languages()?,
            exclude: config.analysis.exclude.clone(),
            max_file_bytes: config.analysis.max_file_bytes,
        })
    }
}

struct FileOutcome {
    record: FileRecord,
    dependency_paths: Vec<String>,
    unresolved_calls: Vec<CallSite>,
    bytes: u64,
}

pub struct RepositoryAnalyzer {
    options: AnalyzerOptions,
    registry: ExtractorRegistry,
}

impl RepositoryAnalyzer {
    pub fn new(options: AnalyzerOptions) -> Self {
        Self::with_registry(options, ExtractorRegistry::new())
    }

    pub fn with_registry(options: AnalyzerOptions, registry: ExtractorRegistry) -> Self {
        Self { options, registry }
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    pub fn analyze(&self, repo_root: &Path) -> Result<AnalysisResult> {
        let root = repo_root
            .canonicalize()
            .map_err(|e| {
                GraphError::Analysis(format!("Cannot open repository {}: {}", repo_root.display(), e))
            })?;

        let walker = FileWalker::new()
            .with_languages(&self.options.languages)
            .include_tests(self.options.include_tests)
            .with_excludes(&self.options.exclude)?
            .with_max_file_bytes(self.options.max_file_bytes);
        let files = walker.walk(&root)?;
        info!("Analyzing {} files in {}", files.len(), root.display());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .build()
            .map_err(|e| GraphError::Analysis(format!("Failed to start worker pool: {}", e)))?;

        let progress = AnalysisProgress::start(files.len());
        let mut outcomes: Vec<FileOutcome> = pool.install(|| {
            files
                .par_iter()
                .filter_map(|file| self.analyze_file(&root, file, &progress))
                .collect()
        });
        outcomes.sort_by(|a, b| a.record.path.cmp(&b.record.path));

        link_file_dependencies(&mut outcomes);
        link_cross_file_calls(&mut outcomes);

        let mut language_summary: BTreeMap<Language, LanguageSummary> = BTreeMap::new();
        for outcome in &outcomes {
            let entry = language_summary.entry(outcome.record.language).or_default();
            entry.file_count += 1;
            entry.total_bytes += outcome.bytes;
        }

        let result = AnalysisResult {
            root: root.display().to_string(),
            analyzed_at: Utc::now(),
            files: outcomes.into_iter().map(|o| o.record).collect(),
            language_summary,
        };

        let snapshot = progress.snapshot();
        info!(
            "Analyzed {} files, {} symbols, {} extraction failures in {:?}",
            result.file_count(),
            snapshot.symbols_extracted,
            snapshot.failures,
            snapshot.elapsed
        );
        Ok(result)
    }

    fn analyze_file(
        &self,
        root: &Path,
        file: &Path,
        progress: &AnalysisProgress,
    ) -> Option<FileOutcome> {
        let language = Language::from_path(file)?;
        let bytes = match fs::read(file) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", file.display(), e);
                return None;
            }
        };

        let rel_path = relative_path(file, root);
        let source = String::from_utf8_lossy(&bytes);

        let extraction = self
            .registry
            .get(language)
            .map(|extractor| extractor.extract_source(file, root, &source));
        let (structure, dependency_paths) = match extraction {
            Some(Ok(extraction)) => {
                progress.inc(extraction.structure.symbols.len());
                (extraction.structure, extraction.dependencies)
            }
            Some(Err(e)) => {
                warn!("Extraction failed for {}: {}", rel_path, e);
                progress.inc_failure();
                (ExtractedStructure::default(), Vec::new())
            }
            None => {
                progress.inc_failure();
                (ExtractedStructure::default(), Vec::new())
            }
        };

        let loc = count_loc(&source);
        let complexity_score = structure.metadata.complexity_score;
        let record = FileRecord {
            id: file_id(&rel_path),
            sha256: content_hash(&bytes),
            loc,
            complexity_score,
            maintainability_index: maintainability_index(complexity_score, loc),
            imports: structure.imports,
            symbols: structure.symbols,
            exports: structure.exports,
            function_dependencies: structure.function_dependencies,
            dependencies: Vec::new(),
            language,
            path: rel_path,
        };

        Some(FileOutcome {
            record,
            dependency_paths,
            unresolved_calls: structure.metadata.unresolved_calls,
            bytes: bytes.len() as u64,
        })
    }
}

impl Default for RepositoryAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerOptions::default())
    }
}

impl ModelBuilder for RepositoryAnalyzer {
    fn analyze(&self, repo_root: &Path) -> Result<AnalysisResult> {
        RepositoryAnalyzer::analyze(self, repo_root)
    }
}

/// Dependencies reference only files present in the result, in path order.
fn link_file_dependencies(outcomes: &mut [FileOutcome]) {
    let ids: HashMap<String, Uuid> = outcomes
        .iter()
        .map(|o| (o.record.path.clone(), o.record.id))
        .collect();

    for outcome in outcomes.iter_mut() {
        let own_id = outcome.record.id;
        let mut dependencies: Vec<Uuid> = Vec::new();
        for path in &outcome.dependency_paths {
            if let Some(id) = ids.get(path) {
                if *id != own_id && !dependencies.contains(id) {
                    dependencies.push(*id);
                }
            }
        }
        outcome.record.dependencies = dependencies;
    }
}

/// Resolves calls left open by the extractor against the files the caller
/// depends on, preferring exported declarations.
fn link_cross_file_calls(outcomes: &mut [FileOutcome]) {
    let index: HashMap<Uuid, usize> = outcomes
        .iter()
        .enumerate()
        .map(|(i, o)| (o.record.id, i))
        .collect();

    let mut resolved: Vec<(usize, FunctionDependency)> = Vec::new();
    for (i, outcome) in outcomes.iter().enumerate() {
        for call in &outcome.unresolved_calls {
            let target = outcome.record.dependencies.iter().find_map(|dep| {
                let file = &outcomes[*index.get(dep)?].record;
                let candidates = || {
                    file.symbols.iter().filter(|s| {
                        s.name == call.callee
                            && matches!(s.kind, SymbolKind::Function | SymbolKind::Class)
                    })
                };
                candidates()
                    .find(|s| s.is_exported)
                    .or_else(|| candidates().next())
                    .map(|s| (s.id, file.id))
            });
            if let Some((to_symbol, to_file)) = target {
                resolved.push((
                    i,
                    FunctionDependency {
                        from_symbol: call.caller,
                        to_symbol,
                        to_file,
                        dependency_type: call.dependency_type.to_string(),
                        line_number: call.line,
                        context: call.context.clone(),
                    },
                ));
            }
        }
    }

    for (i, dependency) in resolved {
        outcomes[i].record.function_dependencies.push(dependency);
    }
    for outcome in outcomes.iter_mut() {
        outcome
            .record
            .function_dependencies
            .sort_by_key(|d| d.line_number);
    }
}

/// Non-blank lines.
pub fn count_loc(source: &str) -> u32 {
    source.lines().filter(|line| !line.trim().is_empty()).count() as u32
}

/// Simplified maintainability index on a 0-100 scale, absent without metrics.
pub fn maintainability_index(complexity: u32, loc: u32) -> Option<f64> {
    if complexity == 0 || loc == 0 {
        return None;
    }
    let raw = 171.0 - 0.23 * complexity as f64 - 16.2 * (loc as f64).ln();
    let scaled = (raw * 100.0 / 171.0).max(0.0);
    Some((scaled * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_count_loc_ignores_blank_lines() {
        assert_eq!(count_loc("a\n\n  \nb\n"), 2);
        assert_eq!(count_loc(""), 0);
    }

    #[test]
    fn test_maintainability_index() {
        assert_eq!(maintainability_index(0, 10), None);
        assert_eq!(maintainability_index(3, 0), None);
        assert_eq!(maintainability_index(1, 1), Some(99.87));
        let heavy = maintainability_index(500, 100_000).unwrap();
        assert_eq!(heavy, 0.0);
    }

    #[test]
    fn test_analyze_links_files_and_calls() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "lib/util.ts", "export function helper() { return 1; }\n");
        write(
            temp.path(),
            "app.ts",
            "import { helper } from './lib/util';\nexport function main() {\n  return helper();\n}\n",
        );

        let result = RepositoryAnalyzer::default().analyze(temp.path()).unwrap();
        let paths: Vec<&str> = result.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["app.ts", "lib/util.ts"]);

        let app = &result.files[0];
        let util = &result.files[1];
        assert_eq!(app.dependencies, vec![util.id]);
        assert_eq!(app.function_dependencies.len(), 1);
        let edge = &app.function_dependencies[0];
        assert_eq!(edge.to_file, util.id);
        assert_eq!(edge.to_symbol, util.symbols[0].id);
        assert_eq!(edge.line_number, 3);

        let summary = result.language_summary[&Language::TypeScript];
        assert_eq!(summary.file_count, 2);
        assert!(summary.total_bytes > 0);
    }

    #[test]
    fn test_language_filter_limits_files() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.py", "def a():\n    pass\n");
        write(temp.path(), "b.go", "package b\n");

        let options = AnalyzerOptions {
            languages: vec![Language::Go],
            workers: 2,
            ..AnalyzerOptions::default()
        };
        let result = RepositoryAnalyzer::new(options).analyze(temp.path()).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].language, Language::Go);
    }

    #[test]
    fn test_missing_extractor_keeps_file_without_metrics() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.py", "def a():\n    pass\n");

        let analyzer = RepositoryAnalyzer::with_registry(
            AnalyzerOptions::default(),
            ExtractorRegistry::with_factories(Vec::new()),
        );
        let result = analyzer.analyze(temp.path()).unwrap();
        assert_eq!(result.files.len(), 1);
        let file = &result.files[0];
        assert!(file.symbols.is_empty());
        assert_eq!(file.complexity_score, 0);
        assert_eq!(file.maintainability_index, None);
        assert_eq!(file.sha256, content_hash(b"def a():\n    pass\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_get_distinct_ids() {
        use std::collections::HashSet;
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        write(temp.path(), "a.py", "def run():\n    pass\n");
        write(outside.path(), "shared.py", "def run():\n    pass\n");
        symlink(temp.path().join("a.py"), temp.path().join("b.py")).unwrap();
        symlink(outside.path().join("shared.py"), temp.path().join("c.py")).unwrap();

        let result = RepositoryAnalyzer::default().analyze(temp.path()).unwrap();
        let paths: Vec<&str> = result.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py", "c.py"]);

        let mut seen = HashSet::new();
        for file in &result.files {
            assert_eq!(file.symbols.len(), 1);
            for symbol in &file.symbols {
                assert!(seen.insert(symbol.id), "duplicate symbol id in {}", file.path);
            }
        }

        // Ids depend on the link's path, not on where it points.
        let moved = TempDir::new().unwrap();
        write(moved.path(), "c.py", "def run():\n    pass\n");
        let plain = RepositoryAnalyzer::default().analyze(moved.path()).unwrap();
        assert_eq!(result.files[2].symbols[0].id, plain.files[0].symbols[0].id);
    }

    #[test]
    fn test_missing_root_is_analysis_error() {
        let temp = TempDir::new().unwrap();
        let err = RepositoryAnalyzer::default()
            .analyze(&temp.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, GraphError::Analysis(_)));
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("nope"));
    }
}
