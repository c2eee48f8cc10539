//! Plain value types returned by [`QueryEngine`](super::QueryEngine).
//!
//! Everything here serializes directly to JSON; nothing borrows from the
//! engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Export, Symbol, SymbolKind};

pub const FILE_LEVEL: &str = "file-level";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerEntry {
    pub file: String,
    pub line: u32,
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallersResult {
    pub symbol: String,
    pub callers: Vec<CallerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdge {
    pub file: String,
    pub dependency_type: String,
}

impl FileEdge {
    pub fn file_level(file: &str) -> Self {
        Self {
            file: file.to_string(),
            dependency_type: FILE_LEVEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentsResult {
    pub file: String,
    pub dependents: Vec<FileEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepsResult {
    pub file: String,
    pub deps: Vec<FileEdge>,
}

/// Symbol as shown to query consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolView {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SymbolKind,
    pub line_start: u32,
    pub line_end: u32,
    pub signature: Option<String>,
    pub is_exported: bool,
    pub is_private: bool,
}

impl From<&Symbol> for SymbolView {
    fn from(symbol: &Symbol) -> Self {
        Self {
            name: symbol.name.clone(),
            kind: symbol.kind,
            line_start: symbol.line_start,
            line_end: symbol.line_end,
            signature: symbol.signature.clone(),
            is_exported: symbol.is_exported,
            is_private: symbol.is_private,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportView {
    pub name: String,
    pub export_type: String,
}

impl From<&Export> for ExportView {
    fn from(export: &Export) -> Self {
        Self {
            name: export.name.clone(),
            export_type: export.export_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextResult {
    pub file: String,
    pub language: String,
    pub loc: u32,
    pub sha256: String,
    pub symbols: Vec<SymbolView>,
    pub exports: Vec<ExportView>,
    pub deps: Vec<FileEdge>,
    pub dependents: Vec<FileEdge>,
}

/// Search filters; absent filters match everything. Echoed back in results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub name_pattern: Option<String>,
    pub complexity_gt: Option<u32>,
    pub lang: Option<String>,
    pub has_symbol: Option<String>,
}

impl SearchQuery {
    pub fn is_empty(&self) -> bool {
        self.name_pattern.is_none()
            && self.complexity_gt.is_none()
            && self.lang.is_none()
            && self.has_symbol.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub file: String,
    pub language: String,
    pub loc: u32,
    pub symbol_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: SearchQuery,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    pub from: String,
    pub to: String,
    pub path: Vec<String>,
    pub found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolsResult {
    pub file: String,
    pub symbols: Vec<SymbolView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclesResult {
    pub count: usize,
    /// Each cycle lists its member paths in sorted order.
    pub cycles: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResult {
    pub files: usize,
    pub symbols: usize,
    pub file_dependencies: usize,
    pub function_dependencies: usize,
    pub languages: BTreeMap<String, usize>,
}
