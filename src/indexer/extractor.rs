//! Shared machinery for language extractors: a pre-order tree visitor and a
//! builder that turns visited declarations into canonical, sorted output.

use std::collections::{BTreeSet, HashSet};

use tree_sitter::Node;
use uuid::Uuid;

use crate::model::ids::{file_id, symbol_id};
use crate::model::{Export, FunctionDependency, Symbol, SymbolKind};

const MAX_SIGNATURE_LEN: usize = 200;

/// A call whose target was not declared in the same file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub caller: Uuid,
    pub callee: String,
    pub line: u32,
    pub context: Option<String>,
    pub dependency_type: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionMetadata {
    /// 1 + decision points, or 0 when nothing was parsed.
    pub complexity_score: u32,
    pub has_syntax_errors: bool,
    pub unresolved_calls: Vec<CallSite>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedStructure {
    pub symbols: Vec<Symbol>,
    pub exports: Vec<Export>,
    pub function_dependencies: Vec<FunctionDependency>,
    pub imports: Vec<String>,
    pub metadata: ExtractionMetadata,
}

/// Structure and resolved dependencies from a single parse.
#[derive(Debug, Clone, Default)]
pub struct FileExtraction {
    pub structure: ExtractedStructure,
    pub dependencies: Vec<String>,
}

/// Context inherited by the children of a visited node.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Innermost declared symbol, used as the source of call edges.
    pub symbol: Option<Uuid>,
    /// Enclosing class or type name for member declarations.
    pub container: Option<String>,
    /// True inside any function or class body.
    pub nested: bool,
}

impl Scope {
    pub fn enter_function(&self, id: Uuid) -> Scope {
        Scope {
            symbol: Some(id),
            container: None,
            nested: true,
        }
    }

    pub fn enter_class(&self, id: Uuid, name: &str) -> Scope {
        Scope {
            symbol: Some(id),
            container: Some(name.to_string()),
            nested: true,
        }
    }
}

pub trait NodeVisitor {
    /// Called in pre-order; returns the scope the node's children see.
    fn visit(&mut self, node: Node<'_>, scope: &Scope) -> Scope;
}

/// Iterative pre-order walk, children left to right.
pub fn walk_tree<V: NodeVisitor + ?Sized>(root: Node<'_>, visitor: &mut V) {
    let mut stack = vec![(root, Scope::default())];
    while let Some((node, scope)) = stack.pop() {
        let child_scope = visitor.visit(node, &scope);
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        for child in children.into_iter().rev() {
            stack.push((child, child_scope.clone()));
        }
    }
}

/// All nodes of the given kinds, in source order.
pub fn collect_nodes<'t>(root: Node<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if kinds.contains(&node.kind()) {
            found.push(node);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    found
}

/// Comment nodes directly above `node`, top to bottom, with no blank line between.
pub fn leading_comments<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut comments = Vec::new();
    let mut expected_row = node.start_position().row;
    let mut current = node.prev_sibling();
    while let Some(sibling) = current {
        if sibling.kind() != "comment" || sibling.end_position().row + 1 != expected_row {
            break;
        }
        expected_row = sibling.start_position().row;
        comments.push(sibling);
        current = sibling.prev_sibling();
    }
    comments.reverse();
    comments
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

struct PendingExport {
    export: Export,
    /// Local binding to resolve to a symbol id once all symbols are known.
    local: Option<String>,
}

pub struct StructureBuilder<'a> {
    rel_path: &'a str,
    lines: Vec<&'a str>,
    symbols: Vec<Symbol>,
    top_level: HashSet<Uuid>,
    exports: Vec<PendingExport>,
    calls: Vec<CallSite>,
    imports: BTreeSet<String>,
    decision_points: u32,
}

impl<'a> StructureBuilder<'a> {
    pub fn new(rel_path: &'a str, source: &'a str) -> Self {
        Self {
            rel_path,
            lines: source.lines().collect(),
            symbols: Vec::new(),
            top_level: HashSet::new(),
            exports: Vec::new(),
            calls: Vec::new(),
            imports: BTreeSet::new(),
            decision_points: 0,
        }
    }

    pub fn rel_path(&self) -> &str {
        self.rel_path
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn line_of(node: &Node<'_>) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn line_text(&self, row: usize) -> Option<&'a str> {
        self.lines.get(row).copied()
    }

    /// Records a declaration. The id is derived from the position of `node`.
    pub fn add_symbol(
        &mut self,
        node: Node<'_>,
        name: &str,
        kind: SymbolKind,
        scope: &Scope,
    ) -> &mut Symbol {
        let start = node.start_position();
        let line_start = start.row as u32 + 1;
        let id = symbol_id(self.rel_path, kind, name, line_start, start.column as u32);
        let signature = self.line_text(start.row).map(|line| {
            let trimmed = line.trim();
            if trimmed.len() > MAX_SIGNATURE_LEN {
                let mut end = MAX_SIGNATURE_LEN;
                while !trimmed.is_char_boundary(end) {
                    end -= 1;
                }
                trimmed[..end].to_string()
            } else {
                trimmed.to_string()
            }
        });

        if !scope.nested {
            self.top_level.insert(id);
        }

        self.symbols.push(Symbol {
            id,
            name: name.to_string(),
            kind,
            line_start,
            line_end: node.end_position().row as u32 + 1,
            signature,
            docstring: None,
            is_exported: false,
            is_private: name.starts_with('_'),
            parent: scope.container.clone(),
        });
        let last = self.symbols.len() - 1;
        &mut self.symbols[last]
    }

    pub fn is_top_level(&self, id: &Uuid) -> bool {
        self.top_level.contains(id)
    }

    /// Export tied to a known symbol.
    pub fn export_symbol(&mut self, name: &str, export_type: &str, symbol_id: Uuid) {
        self.exports.push(PendingExport {
            export: Export {
                name: name.to_string(),
                export_type: export_type.to_string(),
                symbol_id: Some(symbol_id),
                is_reexport: false,
                original_module: None,
            },
            local: None,
        });
    }

    /// Export of a local binding resolved by name when the file is finished.
    /// The export type falls back to the symbol kind, or `variable`.
    pub fn export_local(&mut self, name: &str, local: &str, export_type: Option<&str>) {
        self.exports.push(PendingExport {
            export: Export {
                name: name.to_string(),
                export_type: export_type.unwrap_or_default().to_string(),
                symbol_id: None,
                is_reexport: false,
                original_module: None,
            },
            local: Some(local.to_string()),
        });
    }

    pub fn export_external(&mut self, export: Export) {
        self.exports.push(PendingExport {
            export,
            local: None,
        });
    }

    /// Exports every top-level symbol accepted by `include`.
    pub fn export_top_level<F>(&mut self, include: F)
    where
        F: Fn(&Symbol) -> bool,
    {
        let picked: Vec<(String, &'static str, Uuid)> = self
            .symbols
            .iter()
            .filter(|s| self.top_level.contains(&s.id) && include(s))
            .map(|s| (s.name.clone(), s.kind.as_str(), s.id))
            .collect();
        for (name, kind, id) in picked {
            self.export_symbol(&name, kind, id);
        }
    }

    pub fn add_call(&mut self, caller: Uuid, callee: &str, node: Node<'_>, dependency_type: &'static str) {
        if callee.is_empty() {
            return;
        }
        let row = node.start_position().row;
        self.calls.push(CallSite {
            caller,
            callee: callee.to_string(),
            line: row as u32 + 1,
            context: self.line_text(row).map(|l| l.trim().to_string()),
            dependency_type,
        });
    }

    pub fn add_import(&mut self, text: &str) {
        let normalized = collapse_whitespace(text);
        if !normalized.is_empty() {
            self.imports.insert(normalized);
        }
    }

    pub fn add_decision_point(&mut self) {
        self.decision_points += 1;
    }

    fn find_local(&self, name: &str, callable_only: bool) -> Option<&Symbol> {
        let is_match = |s: &&Symbol| {
            s.name == name
                && (!callable_only || matches!(s.kind, SymbolKind::Function | SymbolKind::Class))
        };
        self.symbols
            .iter()
            .filter(is_match)
            .find(|s| self.top_level.contains(&s.id))
            .or_else(|| self.symbols.iter().find(is_match))
    }

    pub fn finish(mut self, has_syntax_errors: bool) -> ExtractedStructure {
        self.symbols.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let pending = std::mem::take(&mut self.exports);
        let mut exports = Vec::with_capacity(pending.len());
        let mut exported_ids = HashSet::new();
        for PendingExport { mut export, local } in pending {
            if let Some(local) = local {
                match self.find_local(&local, false) {
                    Some(symbol) => {
                        export.symbol_id = Some(symbol.id);
                        if export.export_type.is_empty() {
                            export.export_type = symbol.kind.as_str().to_string();
                        }
                    }
                    None if export.export_type.is_empty() => {
                        export.export_type = "variable".to_string();
                    }
                    None => {}
                }
            }
            if let Some(id) = export.symbol_id {
                exported_ids.insert(id);
            }
            exports.push(export);
        }
        exports.sort_by(|a, b| {
            (&a.name, &a.export_type, &a.original_module).cmp(&(&b.name, &b.export_type, &b.original_module))
        });
        exports.dedup();

        for symbol in self.symbols.iter_mut() {
            if exported_ids.contains(&symbol.id) {
                symbol.is_exported = true;
            }
        }

        let this_file = file_id(self.rel_path);
        let mut function_dependencies = Vec::new();
        let mut unresolved_calls = Vec::new();
        for call in std::mem::take(&mut self.calls) {
            match self.find_local(&call.callee, true) {
                Some(target) => function_dependencies.push(FunctionDependency {
                    from_symbol: call.caller,
                    to_symbol: target.id,
                    to_file: this_file,
                    dependency_type: call.dependency_type.to_string(),
                    line_number: call.line,
                    context: call.context,
                }),
                None => unresolved_calls.push(call),
            }
        }

        ExtractedStructure {
            symbols: self.symbols,
            exports,
            function_dependencies,
            imports: self.imports.into_iter().collect(),
            metadata: ExtractionMetadata {
                complexity_score: self.decision_points + 1,
                has_syntax_errors,
                unresolved_calls,
            },
        }
    }
}
