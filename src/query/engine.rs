use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use regex::Regex;
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::model::{canonical_path, AnalysisResult, FileRecord};
use crate::query::results::*;

/// Read-only graph queries over one [`AnalysisResult`].
///
/// Indices are built once in [`QueryEngine::new`]; nothing mutates afterwards,
/// so a shared engine can be queried from several threads.
pub struct QueryEngine {
    result: AnalysisResult,
    file_by_id: HashMap<Uuid, usize>,
    file_by_path: HashMap<String, usize>,
    /// Every declaration of a name, in file then symbol order.
    symbol_by_name: HashMap<String, Vec<(usize, usize)>>,
    /// Target file id to the files that depend on it.
    reverse_deps: HashMap<Uuid, Vec<usize>>,
}

impl QueryEngine {
    pub fn new(result: AnalysisResult) -> Self {
        let mut file_by_id = HashMap::with_capacity(result.files.len());
        let mut file_by_path = HashMap::with_capacity(result.files.len());
        let mut symbol_by_name: HashMap<String, Vec<(usize, usize)>> = HashMap::new();
        let mut reverse_deps: HashMap<Uuid, Vec<usize>> = HashMap::new();

        for (fi, file) in result.files.iter().enumerate() {
            file_by_id.insert(file.id, fi);
            file_by_path.insert(canonical_path(&file.path), fi);
            for (si, symbol) in file.symbols.iter().enumerate() {
                symbol_by_name
                    .entry(symbol.name.clone())
                    .or_default()
                    .push((fi, si));
            }
        }

        for (fi, file) in result.files.iter().enumerate() {
            for dep in &file.dependencies {
                reverse_deps.entry(*dep).or_default().push(fi);
            }
        }

        Self {
            result,
            file_by_id,
            file_by_path,
            symbol_by_name,
            reverse_deps,
        }
    }

    pub fn result(&self) -> &AnalysisResult {
        &self.result
    }

    pub fn into_result(self) -> AnalysisResult {
        self.result
    }

    fn file_at(&self, path: &str) -> Option<&FileRecord> {
        self.index_of(path).map(|i| &self.result.files[i])
    }

    fn index_of(&self, path: &str) -> Option<usize> {
        self.file_by_path.get(&canonical_path(path)).copied()
    }

    fn record_by_id(&self, id: &Uuid) -> Option<&FileRecord> {
        self.file_by_id.get(id).map(|i| &self.result.files[*i])
    }

    /// Call sites whose target is a symbol named exactly `symbol_name`.
    ///
    /// Only edges into symbols declared inside this result can be found.
    pub fn callers(&self, symbol_name: &str) -> CallersResult {
        let targets: HashSet<Uuid> = self
            .symbol_by_name
            .get(symbol_name)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(fi, si)| self.result.files[*fi].symbols[*si].id)
                    .collect()
            })
            .unwrap_or_default();

        let mut callers = Vec::new();
        if !targets.is_empty() {
            for file in &self.result.files {
                for dep in &file.function_dependencies {
                    if targets.contains(&dep.to_symbol) {
                        callers.push(CallerEntry {
                            file: file.path.clone(),
                            line: dep.line_number,
                            context: dep.context.clone(),
                        });
                    }
                }
            }
        }

        CallersResult {
            symbol: symbol_name.to_string(),
            callers,
        }
    }

    pub fn dependents(&self, file_path: &str) -> DependentsResult {
        let dependents = self
            .file_at(file_path)
            .and_then(|file| self.reverse_deps.get(&file.id))
            .map(|sources| {
                sources
                    .iter()
                    .map(|i| FileEdge::file_level(&self.result.files[*i].path))
                    .collect()
            })
            .unwrap_or_default();

        DependentsResult {
            file: file_path.to_string(),
            dependents,
        }
    }

    pub fn deps(&self, file_path: &str) -> DepsResult {
        let deps = self
            .file_at(file_path)
            .map(|file| self.resolve_deps(file))
            .unwrap_or_default();

        DepsResult {
            file: file_path.to_string(),
            deps,
        }
    }

    fn resolve_deps(&self, file: &FileRecord) -> Vec<FileEdge> {
        file.dependencies
            .iter()
            .filter_map(|id| self.record_by_id(id))
            .map(|dep| FileEdge::file_level(&dep.path))
            .collect()
    }

    /// Everything known about one file. Unknown paths are an error.
    pub fn context(&self, file_path: &str) -> Result<ContextResult> {
        let file = self
            .file_at(file_path)
            .ok_or_else(|| GraphError::FileNotFound(file_path.to_string()))?;

        Ok(ContextResult {
            file: file_path.to_string(),
            language: file.language.as_str().to_string(),
            loc: file.loc,
            sha256: file.sha256.clone(),
            symbols: file.symbols.iter().map(SymbolView::from).collect(),
            exports: file.exports.iter().map(ExportView::from).collect(),
            deps: self.resolve_deps(file),
            dependents: self.dependents(file_path).dependents,
        })
    }

    /// Files passing every supplied filter, in result order.
    pub fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        let pattern = query.name_pattern.as_deref().map(Regex::new).transpose()?;

        let results = self
            .result
            .files
            .iter()
            .filter(|file| pattern.as_ref().map_or(true, |re| re.is_match(&file.path)))
            .filter(|file| {
                query.lang.as_deref().map_or(true, |lang| {
                    file.language.as_str().eq_ignore_ascii_case(lang)
                        || file.language.tag().eq_ignore_ascii_case(lang)
                })
            })
            .filter(|file| {
                query
                    .has_symbol
                    .as_deref()
                    .map_or(true, |name| file.symbols.iter().any(|s| s.name == name))
            })
            .filter(|file| passes_complexity(file.complexity_score, query.complexity_gt))
            .map(|file| SearchHit {
                file: file.path.clone(),
                language: file.language.as_str().to_string(),
                loc: file.loc,
                symbol_count: file.symbols.len(),
            })
            .collect();

        Ok(SearchResult {
            query: query.clone(),
            results,
        })
    }

    /// Shortest chain of file-level dependencies from `file_a` to `file_b`.
    pub fn path(&self, file_a: &str, file_b: &str) -> PathResult {
        let not_found = || PathResult {
            from: file_a.to_string(),
            to: file_b.to_string(),
            path: Vec::new(),
            found: false,
        };

        if canonical_path(file_a) == canonical_path(file_b) {
            return PathResult {
                from: file_a.to_string(),
                to: file_b.to_string(),
                path: vec![file_a.to_string()],
                found: true,
            };
        }

        let (Some(start), Some(goal)) = (self.index_of(file_a), self.index_of(file_b)) else {
            return not_found();
        };

        let mut predecessor: HashMap<usize, Option<usize>> = HashMap::new();
        predecessor.insert(start, None);
        let mut queue = VecDeque::from([start]);
        let mut found = false;

        'search: while let Some(current) = queue.pop_front() {
            for dep in &self.result.files[current].dependencies {
                let Some(&next) = self.file_by_id.get(dep) else {
                    continue;
                };
                if predecessor.contains_key(&next) {
                    continue;
                }
                predecessor.insert(next, Some(current));
                if next == goal {
                    found = true;
                    break 'search;
                }
                queue.push_back(next);
            }
        }

        if !found {
            return not_found();
        }

        let mut chain = Vec::new();
        let mut node = Some(goal);
        while let Some(i) = node {
            chain.push(self.result.files[i].path.clone());
            node = predecessor.get(&i).copied().flatten();
        }
        chain.reverse();

        PathResult {
            from: file_a.to_string(),
            to: file_b.to_string(),
            path: chain,
            found: true,
        }
    }

    pub fn symbols(&self, file_path: &str) -> Result<SymbolsResult> {
        let file = self
            .file_at(file_path)
            .ok_or_else(|| GraphError::FileNotFound(file_path.to_string()))?;

        Ok(SymbolsResult {
            file: file_path.to_string(),
            symbols: file.symbols.iter().map(SymbolView::from).collect(),
        })
    }

    /// Dependency cycles: strongly connected components with more than one
    /// file, or a file that depends on itself.
    pub fn cycles(&self) -> CyclesResult {
        let files = &self.result.files;
        let adjacency: Vec<Vec<usize>> = files
            .iter()
            .map(|file| {
                file.dependencies
                    .iter()
                    .filter_map(|id| self.file_by_id.get(id).copied())
                    .collect()
            })
            .collect();

        let mut cycles: Vec<Vec<String>> = strongly_connected(&adjacency)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || adjacency[component[0]].contains(&component[0])
            })
            .map(|component| {
                let mut paths: Vec<String> =
                    component.iter().map(|i| files[*i].path.clone()).collect();
                paths.sort();
                paths
            })
            .collect();
        cycles.sort();

        CyclesResult {
            count: cycles.len(),
            cycles,
        }
    }

    pub fn stats(&self) -> StatsResult {
        let mut languages: BTreeMap<String, usize> = BTreeMap::new();
        for file in &self.result.files {
            *languages.entry(file.language.as_str().to_string()).or_default() += 1;
        }

        StatsResult {
            files: self.result.file_count(),
            symbols: self.result.symbol_count(),
            file_dependencies: self.result.files.iter().map(|f| f.dependencies.len()).sum(),
            function_dependencies: self
                .result
                .files
                .iter()
                .map(|f| f.function_dependencies.len())
                .sum(),
            languages,
        }
    }
}

/// A score of zero means no metric was collected; such files always pass.
fn passes_complexity(score: u32, complexity_gt: Option<u32>) -> bool {
    match complexity_gt {
        None => true,
        Some(_) if score == 0 => true,
        Some(threshold) => score > threshold,
    }
}

/// Tarjan's algorithm without recursion. Every node appears in exactly one
/// returned component.
fn strongly_connected(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut index: Vec<Option<usize>> = vec![None; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components = Vec::new();

    for root in 0..n {
        if index[root].is_some() {
            continue;
        }
        // (node, next child position)
        let mut work: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(&(v, child)) = work.last() {
            if index[v].is_none() {
                index[v] = Some(next_index);
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }

            if child < adjacency[v].len() {
                if let Some(top) = work.last_mut() {
                    top.1 += 1;
                }
                let w = adjacency[v][child];
                match index[w] {
                    None => work.push((w, 0)),
                    Some(wi) if on_stack[w] => lowlink[v] = lowlink[v].min(wi),
                    Some(_) => {}
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if index[v] == Some(lowlink[v]) {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }

    components
}
