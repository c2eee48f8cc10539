//! Project configuration read from `.repograph.toml` at the repository root.
//!
//! ```toml
//! [analysis]
//! workers = 0            # 0 = one per CPU
//! include_tests = false
//! languages = ["python", "ts"]
//! exclude = ["vendor/**", "**/generated/**"]
//! max_file_bytes = 1048576
//!
//! [cache]
//! dir = ".repograph"
//! file = "cache.json"
//!
//! [logging]
//! level = "warn"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::model::Language;

pub const CONFIG_FILENAME: &str = ".repograph.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub workers: usize,
    pub include_tests: bool,
    /// Empty means every supported language.
    pub languages: Vec<String>,
    pub exclude: Vec<String>,
    pub max_file_bytes: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            include_tests: false,
            languages: Vec::new(),
            exclude: vec!["node_modules/**".to_string(), "**/node_modules/**".to_string()],
            max_file_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: String,
    pub file: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: ".repograph".to_string(),
            file: "cache.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| GraphError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `.repograph.toml` from `repo_root`, or defaults when it is absent.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join(CONFIG_FILENAME);
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.languages()?;

        for pattern in &self.analysis.exclude {
            glob::Pattern::new(pattern)
                .map_err(|e| GraphError::Config(format!("Invalid exclude pattern {}: {}", pattern, e)))?;
        }

        if self.analysis.max_file_bytes == 0 {
            return Err(GraphError::Config("max_file_bytes must be positive".to_string()));
        }

        if self.cache.dir.trim().is_empty() || self.cache.file.trim().is_empty() {
            return Err(GraphError::Config("cache dir and file must not be empty".to_string()));
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !["trace", "debug", "info", "warn", "error", "off"].contains(&level.as_str()) {
            return Err(GraphError::Config(format!("Invalid log level: {}", self.logging.level)));
        }

        Ok(())
    }

    pub fn languages(&self) -> Result<Vec<Language>> {
        let mut languages = self
            .analysis
            .languages
            .iter()
            .map(|tag| tag.parse::<Language>())
            .collect::<Result<Vec<_>>>()?;
        languages.sort();
        languages.dedup();
        Ok(languages)
    }

    pub fn cache_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.cache.dir).join(&self.cache.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(
            config.cache_path(temp.path()),
            temp.path().join(".repograph").join("cache.json")
        );
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILENAME),
            "[analysis]\nlanguages = [\"py\", \"typescript\", \"py\"]\nworkers = 2\n",
        )
        .unwrap();

        let config = Config::load(temp.path()).unwrap();
        assert_eq!(config.analysis.workers, 2);
        assert_eq!(
            config.languages().unwrap(),
            vec![Language::Python, Language::TypeScript]
        );
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);

        std::fs::write(&path, "[analysis]\nlanguages = [\"cobol\"]\n").unwrap();
        assert!(Config::load(temp.path()).is_err());

        std::fs::write(&path, "[analysis]\nexclude = [\"[\"]\n").unwrap();
        assert!(matches!(Config::load(temp.path()), Err(GraphError::Config(_))));

        std::fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();
        assert!(Config::load(temp.path()).is_err());

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(Config::load(temp.path()), Err(GraphError::Config(_))));
    }
}
