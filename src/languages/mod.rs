pub mod go;
pub mod python;
pub mod typescript;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::Result;
use crate::indexer::extractor::{ExtractedStructure, FileExtraction, StructureBuilder};
use crate::indexer::import_resolver::path_within_root;
use crate::indexer::parser::{LazyGrammar, ParsedSource};
use crate::model::{relative_path, Language};

pub use go::GoExtractor;
pub use python::PythonExtractor;
pub use typescript::EcmaScriptExtractor;

/// Per-language extraction capability.
///
/// Implementors supply the grammar, a visitor over the parse tree, and import
/// resolution. The provided methods turn those into the canonical, sorted
/// output and never propagate extraction failures.
pub trait LanguageExtractor: Send + Sync {
    fn language(&self) -> Language;

    fn file_extensions(&self) -> &'static [&'static str] {
        self.language().extensions()
    }

    fn grammar_for(&self, path: &Path) -> &LazyGrammar;

    fn collect_structure(&self, parsed: &ParsedSource, builder: &mut StructureBuilder<'_>);

    /// Raw specifiers in source order, duplicates allowed.
    fn import_specifiers(&self, parsed: &ParsedSource) -> Vec<String>;

    /// Existing files a specifier refers to. Non-local specifiers yield nothing.
    fn resolve_specifier(&self, specifier: &str, file: &Path, repo_root: &Path) -> Vec<PathBuf>;

    /// Sorted, deduplicated repository-relative paths of local imports.
    fn extract_dependencies(&self, file: &Path, repo_root: &Path) -> Vec<String> {
        match self.extract_file(file, repo_root) {
            Ok(extraction) => extraction.dependencies,
            Err(e) => {
                warn!("Dependency extraction failed for {}: {}", file.display(), e);
                Vec::new()
            }
        }
    }

    fn extract_structure(&self, file: &Path, repo_root: &Path) -> ExtractedStructure {
        match self.extract_file(file, repo_root) {
            Ok(extraction) => extraction.structure,
            Err(e) => {
                warn!("Structure extraction failed for {}: {}", file.display(), e);
                ExtractedStructure::default()
            }
        }
    }

    fn extract_file(&self, file: &Path, repo_root: &Path) -> Result<FileExtraction> {
        let source = fs::read_to_string(file)?;
        self.extract_source(file, repo_root, &source)
    }

    /// Single parse producing both structure and dependencies.
    fn extract_source(&self, file: &Path, repo_root: &Path, source: &str) -> Result<FileExtraction> {
        let root = repo_root
            .canonicalize()
            .unwrap_or_else(|_| repo_root.to_path_buf());
        let file = path_under_root(file, repo_root, &root);
        let rel_path = relative_path(&file, &root);

        let parsed = self.grammar_for(&file).parse(source)?;
        if parsed.has_errors() {
            debug!("Recovered from syntax errors in {}", rel_path);
        }

        let mut builder = StructureBuilder::new(&rel_path, source);
        self.collect_structure(&parsed, &mut builder);
        let structure = builder.finish(parsed.has_errors());

        let mut dependencies: Vec<String> = self
            .import_specifiers(&parsed)
            .iter()
            .flat_map(|spec| self.resolve_specifier(spec, &file, &root))
            .filter_map(|target| path_within_root(&target, &root))
            .collect();
        dependencies.sort();
        dependencies.dedup();

        Ok(FileExtraction {
            structure,
            dependencies,
        })
    }
}

/// `file` re-rooted under the canonical `root` without resolving the file
/// itself, so a symlink keeps its own path and therefore its own ids.
fn path_under_root(file: &Path, repo_root: &Path, root: &Path) -> PathBuf {
    if let Ok(rel) = file.strip_prefix(repo_root) {
        return root.join(rel);
    }
    if file.starts_with(root) {
        return file.to_path_buf();
    }
    match (file.parent().and_then(|dir| dir.canonicalize().ok()), file.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => file.to_path_buf(),
    }
}

pub type ExtractorFactory = fn() -> Result<Arc<dyn LanguageExtractor>>;

/// Maps a language to its extractor, constructing each one on first request.
///
/// A factory that fails is logged once and the language is reported as having
/// no extractor; other languages are unaffected.
pub struct ExtractorRegistry {
    factories: HashMap<Language, ExtractorFactory>,
    instances: HashMap<Language, OnceCell<Option<Arc<dyn LanguageExtractor>>>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::with_factories(vec![
            (Language::Python, python_factory as ExtractorFactory),
            (Language::JavaScript, javascript_factory as ExtractorFactory),
            (Language::TypeScript, typescript_factory as ExtractorFactory),
            (Language::Go, go_factory as ExtractorFactory),
        ])
    }

    pub fn with_factories(factories: Vec<(Language, ExtractorFactory)>) -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
            instances: HashMap::new(),
        };
        for (language, factory) in factories {
            registry.register(language, factory);
        }
        registry
    }

    pub fn register(&mut self, language: Language, factory: ExtractorFactory) {
        self.factories.insert(language, factory);
        self.instances.insert(language, OnceCell::new());
    }

    pub fn get(&self, language: Language) -> Option<Arc<dyn LanguageExtractor>> {
        let factory = self.factories.get(&language)?;
        let cell = self.instances.get(&language)?;
        cell.get_or_init(|| match factory() {
            Ok(extractor) => Some(extractor),
            Err(e) => {
                warn!("No extractor available for {}: {}", language, e);
                None
            }
        })
        .clone()
    }

    pub fn get_for_file(&self, path: &Path) -> Option<Arc<dyn LanguageExtractor>> {
        Language::from_path(path).and_then(|language| self.get(language))
    }

    pub fn supported_languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.factories.keys().copied().collect();
        languages.sort();
        languages
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn python_factory() -> Result<Arc<dyn LanguageExtractor>> {
    Ok(Arc::new(PythonExtractor::new()))
}

fn javascript_factory() -> Result<Arc<dyn LanguageExtractor>> {
    Ok(Arc::new(EcmaScriptExtractor::javascript()))
}

fn typescript_factory() -> Result<Arc<dyn LanguageExtractor>> {
    Ok(Arc::new(EcmaScriptExtractor::typescript()))
}

fn go_factory() -> Result<Arc<dyn LanguageExtractor>> {
    Ok(Arc::new(GoExtractor::new()))
}
