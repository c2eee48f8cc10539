//! Canonical repository model shared by extractors, the cache and the query engine.

pub mod ids;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    JavaScript,
    Python,
    TypeScript,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Go,
        Language::JavaScript,
        Language::Python,
        Language::TypeScript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::TypeScript => "typescript",
        }
    }

    /// Short tag accepted on the command line (`py`, `js`, `ts`, `go`).
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::JavaScript => "js",
            Language::Python => "py",
            Language::TypeScript => "ts",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Go => &["go"],
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::Python => &["py", "pyi"],
            Language::TypeScript => &["ts", "tsx", "mts", "cts"],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Language::from_extension)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "py" | "python" => Ok(Language::Python),
            "js" | "javascript" => Ok(Language::JavaScript),
            "ts" | "typescript" => Ok(Language::TypeScript),
            "go" | "golang" => Ok(Language::Go),
            other => Err(GraphError::UnsupportedLanguage(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
    Enum,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Enum => "enum",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: Uuid,
    pub name: String,
    pub kind: SymbolKind,
    pub line_start: u32,
    pub line_end: u32,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub is_exported: bool,
    pub is_private: bool,
    /// Name of the enclosing class or receiver type for member symbols.
    pub parent: Option<String>,
}

impl Symbol {
    /// Ordering used for every symbol list handed out by an extractor.
    pub fn sort_key(&self) -> (u32, &'static str, &str) {
        (self.line_start, self.kind.as_str(), self.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub name: String,
    pub export_type: String,
    pub symbol_id: Option<Uuid>,
    #[serde(default)]
    pub is_reexport: bool,
    pub original_module: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDependency {
    pub from_symbol: Uuid,
    pub to_symbol: Uuid,
    pub to_file: Uuid,
    pub dependency_type: String,
    pub line_number: u32,
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    /// Repository-relative path with forward slashes.
    pub path: String,
    pub language: Language,
    pub sha256: String,
    pub loc: u32,
    /// 0 means no metric was collected.
    #[serde(default)]
    pub complexity_score: u32,
    pub maintainability_index: Option<f64>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub exports: Vec<Export>,
    #[serde(default)]
    pub function_dependencies: Vec<FunctionDependency>,
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSummary {
    pub file_count: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub root: String,
    pub analyzed_at: DateTime<Utc>,
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub language_summary: BTreeMap<Language, LanguageSummary>,
}

impl AnalysisResult {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.files.iter().map(|f| f.symbols.len()).sum()
    }
}

/// Canonical form of a repository-relative path: forward slashes, no `.` segments.
pub fn canonical_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Path of `file` relative to `root`, in canonical form.
pub fn relative_path(file: &Path, root: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    let joined = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    canonical_path(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_language_from_tags() {
        assert_eq!("py".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("TypeScript".parse::<Language>().unwrap(), Language::TypeScript);
        assert_eq!("golang".parse::<Language>().unwrap(), Language::Go);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path(Path::new("a/b.tsx")), Some(Language::TypeScript));
        assert_eq!(Language::from_path(Path::new("a/b.mjs")), Some(Language::JavaScript));
        assert_eq!(Language::from_path(Path::new("README.md")), None);
    }

    #[test]
    fn test_language_serializes_lowercase() {
        let json = serde_json::to_string(&Language::JavaScript).unwrap();
        assert_eq!(json, "\"javascript\"");
    }

    #[test]
    fn test_canonical_path() {
        assert_eq!(canonical_path("./src/a.py"), "src/a.py");
        assert_eq!(canonical_path("src\\pkg\\b.ts"), "src/pkg/b.ts");
        assert_eq!(canonical_path("src/x/../a.go"), "src/a.go");
        assert_eq!(canonical_path("a"), "a");
    }

    #[test]
    fn test_relative_path() {
        let root = PathBuf::from("/repo");
        let file = root.join("src").join("main.py");
        assert_eq!(relative_path(&file, &root), "src/main.py");
    }
}
