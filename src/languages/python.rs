use std::path::{Path, PathBuf};

use tracing::warn;
use tree_sitter::Node;

use super::LanguageExtractor;
use crate::indexer::extractor::{walk_tree, NodeVisitor, Scope, StructureBuilder};
use crate::indexer::parser::{LazyGrammar, LazyQuery, ParsedSource};
use crate::model::{Language, SymbolKind};

const IMPORTS_QUERY: &str = r#"
(import_statement) @import
(import_from_statement) @import
"#;

const ENUM_BASES: &[&str] = &["Enum", "IntEnum", "StrEnum", "Flag", "IntFlag"];

const DECISION_NODES: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "except_clause",
    "conditional_expression",
    "boolean_operator",
    "case_clause",
    "for_in_clause",
    "if_clause",
];

fn python_language() -> tree_sitter::Language {
    tree_sitter_python::LANGUAGE.into()
}

pub struct PythonExtractor {
    grammar: LazyGrammar,
    imports: LazyQuery,
}

impl PythonExtractor {
    pub fn new() -> Self {
        Self {
            grammar: LazyGrammar::new("python", python_language),
            imports: LazyQuery::new(IMPORTS_QUERY),
        }
    }

    fn import_nodes<'p>(&self, parsed: &'p ParsedSource) -> Vec<Node<'p>> {
        match self.imports.get(&self.grammar) {
            Ok(query) => parsed.captured_nodes(query, "import"),
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        }
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageExtractor for PythonExtractor {
    fn language(&self) -> Language {
        Language::Python
    }

    fn grammar_for(&self, _path: &Path) -> &LazyGrammar {
        &self.grammar
    }

    fn collect_structure(&self, parsed: &ParsedSource, builder: &mut StructureBuilder<'_>) {
        let mut visitor = PythonVisitor {
            parsed,
            builder: &mut *builder,
        };
        walk_tree(parsed.root_node(), &mut visitor);

        for node in self.import_nodes(parsed) {
            builder.add_import(parsed.node_text(&node));
        }

        match dunder_all(parsed) {
            Some(names) => {
                for name in names {
                    builder.export_local(&name, &name, None);
                }
            }
            None => builder.export_top_level(|symbol| !symbol.is_private),
        }
    }

    fn import_specifiers(&self, parsed: &ParsedSource) -> Vec<String> {
        let mut specifiers = Vec::new();
        for node in self.import_nodes(parsed) {
            let mut cursor = node.walk();
            match node.kind() {
                "import_statement" => {
                    for name in node.children_by_field_name("name", &mut cursor) {
                        specifiers.push(imported_name(parsed, name));
                    }
                }
                "import_from_statement" => {
                    let Some(module) = node.child_by_field_name("module_name") else {
                        continue;
                    };
                    let module = parsed.node_text(&module).replace(char::is_whitespace, "");
                    // `from pkg import mod` may name a submodule rather than an attribute.
                    for name in node.children_by_field_name("name", &mut cursor) {
                        let name = imported_name(parsed, name);
                        if module.ends_with('.') {
                            specifiers.push(format!("{}{}", module, name));
                        } else {
                            specifiers.push(format!("{}.{}", module, name));
                        }
                    }
                    specifiers.push(module);
                }
                _ => {}
            }
        }
        specifiers
    }

    fn resolve_specifier(&self, specifier: &str, file: &Path, repo_root: &Path) -> Vec<PathBuf> {
        let dots = specifier.chars().take_while(|c| *c == '.').count();
        let parts: Vec<&str> = specifier[dots..]
            .split('.')
            .filter(|p| !p.is_empty())
            .collect();

        let bases: Vec<PathBuf> = if dots > 0 {
            let mut base = file.parent();
            for _ in 1..dots {
                base = base.and_then(Path::parent);
            }
            base.map(Path::to_path_buf).into_iter().collect()
        } else {
            // Absolute imports are followed only into modules that live in the repository.
            let mut bases = vec![repo_root.to_path_buf()];
            if let Some(dir) = file.parent() {
                if dir != repo_root {
                    bases.push(dir.to_path_buf());
                }
            }
            bases
        };

        for base in bases {
            let target = parts.iter().fold(base, |path, part| path.join(part));
            if let Some(found) = probe_python_module(&target, parts.is_empty()) {
                return vec![found];
            }
        }
        Vec::new()
    }
}

fn probe_python_module(target: &Path, package_only: bool) -> Option<PathBuf> {
    if !package_only {
        for ext in ["py", "pyi"] {
            let mut raw = target.as_os_str().to_os_string();
            raw.push(".");
            raw.push(ext);
            let candidate = PathBuf::from(raw);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    let init = target.join("__init__.py");
    init.is_file().then_some(init)
}

fn imported_name(parsed: &ParsedSource, node: Node<'_>) -> String {
    let target = if node.kind() == "aliased_import" {
        node.child_by_field_name("name").unwrap_or(node)
    } else {
        node
    };
    parsed.node_text(&target).to_string()
}

/// Names listed in a module-level `__all__`, if one is assigned.
fn dunder_all(parsed: &ParsedSource) -> Option<Vec<String>> {
    let root = parsed.root_node();
    let mut cursor = root.walk();
    for statement in root.named_children(&mut cursor) {
        if statement.kind() != "expression_statement" {
            continue;
        }
        let mut inner = statement.walk();
        for assignment in statement.named_children(&mut inner) {
            if assignment.kind() != "assignment" {
                continue;
            }
            let is_all = assignment
                .child_by_field_name("left")
                .is_some_and(|left| parsed.node_text(&left) == "__all__");
            if !is_all {
                continue;
            }
            let Some(right) = assignment.child_by_field_name("right") else {
                continue;
            };
            let mut items = right.walk();
            let names = right
                .named_children(&mut items)
                .filter(|n| n.kind() == "string")
                .map(|n| string_contents(parsed.node_text(&n)))
                .collect();
            return Some(names);
        }
    }
    None
}

fn string_contents(literal: &str) -> String {
    let unprefixed = literal.trim_start_matches(|c: char| "rRbBuUfF".contains(c));
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = unprefixed
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    unprefixed.trim().to_string()
}

struct PythonVisitor<'p, 'b, 'a> {
    parsed: &'p ParsedSource,
    builder: &'b mut StructureBuilder<'a>,
}

impl PythonVisitor<'_, '_, '_> {
    fn text(&self, node: &Node<'_>) -> &str {
        self.parsed.node_text(node)
    }

    fn docstring(&self, node: &Node<'_>) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let mut cursor = body.walk();
        let first = body.named_children(&mut cursor).next()?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let mut inner = first.walk();
        let literal = first.named_children(&mut inner).next()?;
        (literal.kind() == "string").then(|| string_contents(self.text(&literal)))
    }

    fn class_kind(&self, node: &Node<'_>) -> SymbolKind {
        let Some(bases) = node.child_by_field_name("superclasses") else {
            return SymbolKind::Class;
        };
        let mut cursor = bases.walk();
        for base in bases.named_children(&mut cursor) {
            if base.kind() == "keyword_argument" {
                continue;
            }
            let text = self.text(&base);
            let simple = text
                .split('[')
                .next()
                .unwrap_or(text)
                .rsplit('.')
                .next()
                .unwrap_or(text);
            if ENUM_BASES.contains(&simple) {
                return SymbolKind::Enum;
            }
            if simple == "Protocol" {
                return SymbolKind::Interface;
            }
        }
        SymbolKind::Class
    }

    fn callee(&self, call: &Node<'_>) -> Option<String> {
        let function = call.child_by_field_name("function")?;
        match function.kind() {
            "identifier" => Some(self.text(&function).to_string()),
            "attribute" => function
                .child_by_field_name("attribute")
                .map(|attr| self.text(&attr).to_string()),
            _ => None,
        }
    }
}

impl NodeVisitor for PythonVisitor<'_, '_, '_> {
    fn visit(&mut self, node: Node<'_>, scope: &Scope) -> Scope {
        match node.kind() {
            "function_definition" => {
                let Some(name_node) = node.child_by_field_name("name") else {
                    return scope.clone();
                };
                let name = self.text(&name_node).to_string();
                let docstring = self.docstring(&node);
                let symbol = self.builder.add_symbol(node, &name, SymbolKind::Function, scope);
                symbol.docstring = docstring;
                let id = symbol.id;
                scope.enter_function(id)
            }
            "class_definition" => {
                let Some(name_node) = node.child_by_field_name("name") else {
                    return scope.clone();
                };
                let name = self.text(&name_node).to_string();
                let kind = self.class_kind(&node);
                let docstring = self.docstring(&node);
                let symbol = self.builder.add_symbol(node, &name, kind, scope);
                symbol.docstring = docstring;
                let id = symbol.id;
                scope.enter_class(id, &name)
            }
            "call" => {
                if let (Some(caller), Some(callee)) = (scope.symbol, self.callee(&node)) {
                    self.builder.add_call(caller, &callee, node, "calls");
                }
                scope.clone()
            }
            kind if DECISION_NODES.contains(&kind) => {
                self.builder.add_decision_point();
                scope.clone()
            }
            _ => scope.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn repo() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn test_extracts_functions_classes_and_methods() {
        let temp = repo();
        let file = write(
            temp.path(),
            "shapes.py",
            r#"
class Shape:
    """Base shape."""

    def area(self):
        return 0

def _helper():
    pass

def build():
    return Shape()
"#,
        );

        let out = PythonExtractor::new().extract_structure(&file, temp.path());
        let names: Vec<&str> = out.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Shape", "area", "_helper", "build"]);

        let shape = &out.symbols[0];
        assert_eq!(shape.kind, SymbolKind::Class);
        assert_eq!(shape.docstring.as_deref(), Some("Base shape."));
        assert!(shape.is_exported);

        let area = &out.symbols[1];
        assert_eq!(area.parent.as_deref(), Some("Shape"));
        assert!(!area.is_exported);

        let helper = &out.symbols[2];
        assert!(helper.is_private);
        assert!(!helper.is_exported);

        let export_names: Vec<&str> = out.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(export_names, vec!["Shape", "build"]);
    }

    #[test]
    fn test_dunder_all_controls_exports() {
        let temp = repo();
        let file = write(
            temp.path(),
            "api.py",
            "__all__ = ['public', 'VERSION']\n\ndef public():\n    pass\n\ndef other():\n    pass\n",
        );

        let out = PythonExtractor::new().extract_structure(&file, temp.path());
        let exports: Vec<(&str, &str)> = out
            .exports
            .iter()
            .map(|e| (e.name.as_str(), e.export_type.as_str()))
            .collect();
        assert_eq!(exports, vec![("VERSION", "variable"), ("public", "function")]);
        let other = out.symbols.iter().find(|s| s.name == "other").unwrap();
        assert!(!other.is_exported);
    }

    #[test]
    fn test_enum_and_protocol_kinds() {
        let temp = repo();
        let file = write(
            temp.path(),
            "kinds.py",
            "from enum import Enum\nfrom typing import Protocol\n\nclass Color(Enum):\n    RED = 1\n\nclass Drawable(Protocol):\n    def draw(self): ...\n",
        );

        let out = PythonExtractor::new().extract_structure(&file, temp.path());
        let color = out.symbols.iter().find(|s| s.name == "Color").unwrap();
        assert_eq!(color.kind, SymbolKind::Enum);
        let drawable = out.symbols.iter().find(|s| s.name == "Drawable").unwrap();
        assert_eq!(drawable.kind, SymbolKind::Interface);
    }

    #[test]
    fn test_local_calls_become_edges() {
        let temp = repo();
        let file = write(
            temp.path(),
            "calls.py",
            "def leaf():\n    return 1\n\ndef root():\n    return leaf() + external()\n",
        );

        let out = PythonExtractor::new().extract_structure(&file, temp.path());
        assert_eq!(out.function_dependencies.len(), 1);
        let edge = &out.function_dependencies[0];
        let leaf = out.symbols.iter().find(|s| s.name == "leaf").unwrap();
        assert_eq!(edge.to_symbol, leaf.id);
        assert_eq!(edge.line_number, 5);
        assert_eq!(edge.context.as_deref(), Some("return leaf() + external()"));
        assert_eq!(out.metadata.unresolved_calls.len(), 1);
        assert_eq!(out.metadata.unresolved_calls[0].callee, "external");
    }

    #[test]
    fn test_complexity_counts_branches() {
        let temp = repo();
        let file = write(
            temp.path(),
            "branchy.py",
            "def f(x):\n    if x and x > 1:\n        return 1\n    elif x:\n        return 2\n    for i in range(3):\n        pass\n    return 0\n",
        );

        let out = PythonExtractor::new().extract_structure(&file, temp.path());
        // if, boolean_operator, elif, for
        assert_eq!(out.metadata.complexity_score, 5);
    }

    #[test]
    fn test_relative_and_local_imports_resolve() {
        let temp = repo();
        write(temp.path(), "pkg/__init__.py", "");
        write(temp.path(), "pkg/models.py", "class User: pass\n");
        write(temp.path(), "pkg/sub/helpers.py", "def h(): pass\n");
        write(temp.path(), "main.py", "def add(a, b):\n    return a + b\n");
        let file = write(
            temp.path(),
            "pkg/sub/service.py",
            "import os\nimport requests\nfrom ..models import User\nfrom . import helpers\nfrom main import add\n",
        );

        let deps = PythonExtractor::new().extract_dependencies(&file, temp.path());
        assert_eq!(
            deps,
            vec!["main.py", "pkg/models.py", "pkg/sub/helpers.py"]
        );
    }

    #[test]
    fn test_imports_are_sorted_raw_statements() {
        let temp = repo();
        let file = write(temp.path(), "a.py", "import sys\nfrom . import b\nimport os\n");
        let out = PythonExtractor::new().extract_structure(&file, temp.path());
        assert_eq!(out.imports, vec!["from . import b", "import os", "import sys"]);
    }

    #[test]
    fn test_unreadable_file_yields_empty_structure() {
        let temp = repo();
        let missing = temp.path().join("gone.py");
        let out = PythonExtractor::new().extract_structure(&missing, temp.path());
        assert!(out.symbols.is_empty());
        assert_eq!(out.metadata.complexity_score, 0);
        assert!(PythonExtractor::new()
            .extract_dependencies(&missing, temp.path())
            .is_empty());
    }

    #[test]
    fn test_ids_stable_across_runs() {
        let temp = repo();
        let file = write(temp.path(), "stable.py", "def a():\n    pass\n\nclass B:\n    pass\n");
        let first = PythonExtractor::new().extract_structure(&file, temp.path());
        let second = PythonExtractor::new().extract_structure(&file, temp.path());
        assert_eq!(first.symbols, second.symbols);
    }
}
