//! Disk-backed memoization of one [`AnalysisResult`] per repository.
//!
//! Freshness is decided by re-hashing every tracked file, never by
//! timestamps. Any problem while loading is a cache miss.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{GraphError, Result};
use crate::indexer::{AnalyzerOptions, ModelBuilder, RepositoryAnalyzer};
use crate::model::ids::content_hash;
use crate::model::AnalysisResult;

pub const SCHEMA_VERSION: &str = "1";

#[derive(Serialize)]
struct CacheEnvelopeRef<'a> {
    schema_version: &'static str,
    result: &'a AnalysisResult,
}

#[derive(Deserialize)]
struct CacheHeader {
    schema_version: Option<String>,
    result: Option<Value>,
}

/// Diagnostic view of the cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub exists: bool,
    /// False when there is no cache.
    pub stale: bool,
    pub file_count: usize,
    pub cache_path: String,
}

enum Lookup {
    Missing,
    Invalid(String),
    Stale(AnalysisResult, String),
    Fresh(AnalysisResult),
}

pub struct CacheManager {
    repo_root: PathBuf,
    cache_path: PathBuf,
    options: AnalyzerOptions,
}

impl CacheManager {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        let config = Config::default();
        Self {
            cache_path: config.cache_path(&repo_root),
            options: AnalyzerOptions::default(),
            repo_root,
        }
    }

    /// Cache location and analyzer options taken from `config`.
    pub fn from_config(repo_root: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let repo_root = repo_root.into();
        Ok(Self {
            cache_path: config.cache_path(&repo_root),
            options: AnalyzerOptions::from_config(config)?,
            repo_root,
        })
    }

    pub fn with_cache_path(mut self, cache_path: impl Into<PathBuf>) -> Self {
        self.cache_path = cache_path.into();
        self
    }

    pub fn with_options(mut self, options: AnalyzerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// The cached result, or `None` when missing, unreadable or stale.
    pub fn load(&self) -> Option<AnalysisResult> {
        match self.lookup() {
            Lookup::Fresh(result) => Some(result),
            Lookup::Missing => {
                debug!("Cache miss: no cache at {}", self.cache_path.display());
                None
            }
            Lookup::Invalid(reason) | Lookup::Stale(_, reason) => {
                debug!("Cache miss: {}", reason);
                None
            }
        }
    }

    /// Writes the result through a sibling temp file that is renamed into place.
    pub fn save(&self, result: &AnalysisResult) -> Result<()> {
        let dir = self
            .cache_path
            .parent()
            .ok_or_else(|| GraphError::Cache(format!("Invalid cache path: {}", self.cache_path.display())))?;
        fs::create_dir_all(dir)?;

        let envelope = CacheEnvelopeRef {
            schema_version: SCHEMA_VERSION,
            result,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(&bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.cache_path).map_err(|e| GraphError::Io(e.error))?;

        info!(
            "Cached {} files to {}",
            result.file_count(),
            self.cache_path.display()
        );
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.cache_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn status(&self) -> CacheStatus {
        let cache_path = self.cache_path.display().to_string();
        let (exists, stale, file_count) = match self.lookup() {
            Lookup::Missing => (false, false, 0),
            Lookup::Invalid(_) => (true, true, 0),
            Lookup::Stale(result, _) => (true, true, result.file_count()),
            Lookup::Fresh(result) => (true, false, result.file_count()),
        };
        CacheStatus {
            exists,
            stale,
            file_count,
            cache_path,
        }
    }

    pub fn load_or_analyze(&self) -> Result<AnalysisResult> {
        let analyzer = RepositoryAnalyzer::new(self.options.clone());
        self.load_or_analyze_with(&analyzer)
    }

    /// Fresh cache, or a new result from `builder` that is saved before returning.
    pub fn load_or_analyze_with<B: ModelBuilder + ?Sized>(&self, builder: &B) -> Result<AnalysisResult> {
        if let Some(result) = self.load() {
            debug!("Cache hit: {} files", result.file_count());
            return Ok(result);
        }

        let result = builder.analyze(&self.repo_root)?;
        self.save(&result)?;
        Ok(result)
    }

    fn lookup(&self) -> Lookup {
        let bytes = match fs::read(&self.cache_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Lookup::Missing,
            Err(e) => return Lookup::Invalid(format!("unreadable cache: {}", e)),
        };

        let header: CacheHeader = match serde_json::from_slice(&bytes) {
            Ok(header) => header,
            Err(e) => return Lookup::Invalid(format!("malformed cache: {}", e)),
        };
        match header.schema_version.as_deref() {
            Some(SCHEMA_VERSION) => {}
            other => {
                return Lookup::Invalid(format!(
                    "unsupported schema version {:?}",
                    other.unwrap_or("<none>")
                ))
            }
        }
        let Some(payload) = header.result else {
            return Lookup::Invalid("cache has no result".to_string());
        };
        let result: AnalysisResult = match serde_json::from_value(payload) {
            Ok(result) => result,
            Err(e) => return Lookup::Invalid(format!("malformed result: {}", e)),
        };

        match self.stale_reason(&result) {
            Some(reason) => Lookup::Stale(result, reason),
            None => Lookup::Fresh(result),
        }
    }

    fn stale_reason(&self, result: &AnalysisResult) -> Option<String> {
        for file in &result.files {
            let path = self.repo_root.join(&file.path);
            match fs::read(&path) {
                Ok(bytes) if content_hash(&bytes) == file.sha256 => {}
                Ok(_) => return Some(format!("{} changed", file.path)),
                Err(_) => return Some(format!("{} is missing", file.path)),
            }
        }
        None
    }
}
