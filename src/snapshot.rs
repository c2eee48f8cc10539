//! Deterministic structure snapshot for consumers that only need the file graph.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::AnalysisResult;

pub const SNAPSHOT_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub language: String,
    pub file_count: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub language: String,
    pub lines_of_code: u32,
    pub complexity: u32,
    /// File ids, sorted.
    pub dependencies: Vec<String>,
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub schema_version: String,
    pub analyzed_at: DateTime<Utc>,
    pub root_path: String,
    pub languages: Vec<LanguageInfo>,
    /// File id to path.
    pub file_index: BTreeMap<String, String>,
    pub files: Vec<FileEntry>,
}

impl StructureSnapshot {
    pub fn from_result(result: &AnalysisResult) -> Self {
        let mut languages: Vec<LanguageInfo> = result
            .language_summary
            .iter()
            .map(|(language, summary)| LanguageInfo {
                language: language.as_str().to_string(),
                file_count: summary.file_count,
                total_bytes: summary.total_bytes,
            })
            .collect();
        languages.sort_by(|a, b| a.language.cmp(&b.language));

        let file_index = result
            .files
            .iter()
            .map(|file| (file.id.to_string(), file.path.clone()))
            .collect();

        let mut files: Vec<FileEntry> = result
            .files
            .iter()
            .map(|file| {
                let mut dependencies: Vec<String> =
                    file.dependencies.iter().map(|id| id.to_string()).collect();
                dependencies.sort();
                let mut imports = file.imports.clone();
                imports.sort();
                FileEntry {
                    path: file.path.clone(),
                    language: file.language.as_str().to_string(),
                    lines_of_code: file.loc,
                    complexity: file.complexity_score,
                    dependencies,
                    imports,
                }
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            analyzed_at: result.analyzed_at,
            root_path: result.root.clone(),
            languages,
            file_index,
            files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::file_id;
    use crate::model::{FileRecord, Language, LanguageSummary};

    fn record(path: &str, language: Language, deps: &[&str], imports: &[&str]) -> FileRecord {
        FileRecord {
            id: file_id(path),
            path: path.to_string(),
            language,
            sha256: String::new(),
            loc: 4,
            complexity_score: 2,
            maintainability_index: None,
            imports: imports.iter().map(|s| s.to_string()).collect(),
            symbols: Vec::new(),
            exports: Vec::new(),
            function_dependencies: Vec::new(),
            dependencies: deps.iter().map(|d| file_id(d)).collect(),
        }
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let mut summary = BTreeMap::new();
        summary.insert(Language::Python, LanguageSummary { file_count: 2, total_bytes: 40 });
        summary.insert(Language::Go, LanguageSummary { file_count: 1, total_bytes: 10 });
        let result = AnalysisResult {
            root: "/repo".to_string(),
            analyzed_at: Utc::now(),
            files: vec![
                record("z.py", Language::Python, &["a.py", "m.go"], &["import os", "import abc"]),
                record("a.py", Language::Python, &[], &[]),
                record("m.go", Language::Go, &[], &[]),
            ],
            language_summary: summary,
        };

        let snapshot = StructureSnapshot::from_result(&result);
        assert_eq!(snapshot.schema_version, "1.0.0");
        assert_eq!(snapshot.root_path, "/repo");

        let languages: Vec<&str> = snapshot.languages.iter().map(|l| l.language.as_str()).collect();
        assert_eq!(languages, vec!["go", "python"]);

        let paths: Vec<&str> = snapshot.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "m.go", "z.py"]);

        let z = &snapshot.files[2];
        let mut expected = vec![file_id("a.py").to_string(), file_id("m.go").to_string()];
        expected.sort();
        assert_eq!(z.dependencies, expected);
        assert_eq!(z.imports, vec!["import abc", "import os"]);

        assert_eq!(snapshot.file_index.len(), 3);
        assert_eq!(snapshot.file_index[&file_id("m.go").to_string()], "m.go");
    }
}
