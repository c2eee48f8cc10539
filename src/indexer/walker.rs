use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::model::{relative_path, Language};

const TEST_DIRS: &[&str] = &["test", "tests", "__tests__", "testdata"];
const TEST_INFIXES: &[&str] = &[".test.", ".spec."];

/// True for files that only exist to test other files.
pub fn is_test_file(rel_path: &str) -> bool {
    let mut parts: Vec<&str> = rel_path.split('/').collect();
    let Some(file_name) = parts.pop() else {
        return false;
    };
    if parts.iter().any(|dir| TEST_DIRS.contains(dir)) {
        return true;
    }
    (file_name.starts_with("test_") && file_name.ends_with(".py"))
        || file_name.ends_with("_test.py")
        || file_name.ends_with("_test.go")
        || TEST_INFIXES.iter().any(|infix| file_name.contains(infix))
}

pub struct FileWalker {
    languages: Vec<Language>,
    include_tests: bool,
    exclude: Vec<glob::Pattern>,
    max_file_bytes: Option<u64>,
}

impl FileWalker {
    pub fn new() -> Self {
        Self {
            languages: Vec::new(),
            include_tests: false,
            exclude: Vec::new(),
            max_file_bytes: None,
        }
    }

    /// Empty means every supported language.
    pub fn with_languages(mut self, languages: &[Language]) -> Self {
        self.languages = languages.to_vec();
        self
    }

    pub fn include_tests(mut self, include: bool) -> Self {
        self.include_tests = include;
        self
    }

    pub fn with_excludes(mut self, patterns: &[String]) -> Result<Self> {
        self.exclude = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| GraphError::Config(format!("Invalid exclude pattern {}: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self)
    }

    pub fn with_max_file_bytes(mut self, limit: u64) -> Self {
        self.max_file_bytes = Some(limit);
        self
    }

    /// Supported source files under `root`, sorted by path.
    pub fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(GraphError::Analysis(format!(
                "Repository root is not a directory: {}",
                root.display()
            )));
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .build();

        for entry in walker.flatten() {
            let path = entry.path();
            if !path.is_file() || self.language_of(path).is_none() {
                continue;
            }
            let rel = relative_path(path, root);
            if !self.include_tests && is_test_file(&rel) {
                continue;
            }
            if self.exclude.iter().any(|p| p.matches(&rel)) {
                debug!("Excluded {}", rel);
                continue;
            }
            if let Some(limit) = self.max_file_bytes {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                if size > limit {
                    debug!("Skipping {} ({} bytes)", rel, size);
                    continue;
                }
            }
            files.push(path.to_path_buf());
        }

        files.sort();
        Ok(files)
    }

    pub fn language_of(&self, path: &Path) -> Option<Language> {
        Language::from_path(path)
            .filter(|lang| self.languages.is_empty() || self.languages.contains(lang))
    }
}

impl Default for FileWalker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn names(files: &[PathBuf], root: &Path) -> Vec<String> {
        files.iter().map(|f| relative_path(f, root)).collect()
    }

    #[test]
    fn test_walk_finds_supported_files_sorted() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "b.py", "x = 1");
        create_file(temp_dir.path(), "a/main.go", "package main");
        create_file(temp_dir.path(), "web/app.tsx", "export {}");
        create_file(temp_dir.path(), "README.md", "# readme");

        let files = FileWalker::new().walk(temp_dir.path()).unwrap();
        assert_eq!(
            names(&files, temp_dir.path()),
            vec!["a/main.go", "b.py", "web/app.tsx"]
        );
    }

    #[test]
    fn test_walk_skips_tests_unless_requested() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "app.py", "");
        create_file(temp_dir.path(), "test_app.py", "");
        create_file(temp_dir.path(), "tests/helpers.py", "");
        create_file(temp_dir.path(), "ui/button.test.ts", "");

        let default_walk = FileWalker::new().walk(temp_dir.path()).unwrap();
        assert_eq!(names(&default_walk, temp_dir.path()), vec!["app.py"]);

        let with_tests = FileWalker::new()
            .include_tests(true)
            .walk(temp_dir.path())
            .unwrap();
        assert_eq!(with_tests.len(), 4);
    }

    #[test]
    fn test_walk_filters_languages_excludes_and_size() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "keep.py", "");
        create_file(temp_dir.path(), "skip.go", "");
        create_file(temp_dir.path(), "vendor/dep.py", "");
        create_file(temp_dir.path(), "big.py", &"x = 1\n".repeat(100));

        let walker = FileWalker::new()
            .with_languages(&[Language::Python])
            .with_excludes(&["vendor/**".to_string()])
            .unwrap()
            .with_max_file_bytes(64);
        let files = walker.walk(temp_dir.path()).unwrap();
        assert_eq!(names(&files, temp_dir.path()), vec!["keep.py"]);
    }

    #[test]
    fn test_walk_skips_hidden_directories() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), ".repograph/stale.py", "");
        create_file(temp_dir.path(), "visible.py", "");

        let files = FileWalker::new().walk(temp_dir.path()).unwrap();
        assert_eq!(names(&files, temp_dir.path()), vec!["visible.py"]);
    }

    #[test]
    fn test_walk_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileWalker::new().walk(&temp_dir.path().join("missing"));
        assert!(matches!(result, Err(GraphError::Analysis(_))));
    }

    #[test]
    fn test_is_test_file() {
        assert!(is_test_file("pkg/test_models.py"));
        assert!(is_test_file("pkg/models_test.go"));
        assert!(is_test_file("src/__tests__/a.js"));
        assert!(is_test_file("src/a.spec.tsx"));
        assert!(!is_test_file("src/contest.py"));
        assert!(!is_test_file("src/latest/a.py"));
    }
}
