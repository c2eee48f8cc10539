use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};
use tree_sitter::Node;

use super::LanguageExtractor;
use crate::indexer::extractor::{
    leading_comments, strip_quotes, walk_tree, NodeVisitor, Scope, StructureBuilder,
};
use crate::indexer::import_resolver::{is_relative_specifier, normalize_lexically};
use crate::indexer::parser::{LazyGrammar, LazyQuery, ParsedSource};
use crate::model::{Language, SymbolKind};

const IMPORTS_QUERY: &str = r#"
(import_spec path: (_) @path)
"#;

const DECISION_NODES: &[&str] = &[
    "if_statement",
    "for_statement",
    "expression_case",
    "type_case",
    "communication_case",
];

fn go_language() -> tree_sitter::Language {
    tree_sitter_go::LANGUAGE.into()
}

pub struct GoExtractor {
    grammar: LazyGrammar,
    imports: LazyQuery,
    /// Module path from `go.mod`, per repository root.
    module_paths: Mutex<HashMap<PathBuf, Option<String>>>,
}

impl GoExtractor {
    pub fn new() -> Self {
        Self {
            grammar: LazyGrammar::new("go", go_language),
            imports: LazyQuery::new(IMPORTS_QUERY),
            module_paths: Mutex::new(HashMap::new()),
        }
    }

    fn module_path(&self, repo_root: &Path) -> Option<String> {
        let mut cache = self
            .module_paths
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .entry(repo_root.to_path_buf())
            .or_insert_with(|| read_module_path(repo_root))
            .clone()
    }
}

impl Default for GoExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn read_module_path(repo_root: &Path) -> Option<String> {
    let content = fs::read_to_string(repo_root.join("go.mod")).ok()?;
    let module = content.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("module")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let name = strip_quotes(rest.trim());
        (!name.is_empty()).then(|| name.to_string())
    });
    debug!("go.mod module path for {}: {:?}", repo_root.display(), module);
    module
}

/// Non-test `.go` files directly inside `dir`, sorted.
fn package_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some("go")
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_test.go"))
        })
        .collect();
    files.sort();
    files
}

fn is_exported_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

impl LanguageExtractor for GoExtractor {
    fn language(&self) -> Language {
        Language::Go
    }

    fn grammar_for(&self, _path: &Path) -> &LazyGrammar {
        &self.grammar
    }

    fn collect_structure(&self, parsed: &ParsedSource, builder: &mut StructureBuilder<'_>) {
        let mut visitor = GoVisitor {
            parsed,
            builder: &mut *builder,
        };
        walk_tree(parsed.root_node(), &mut visitor);
        builder.export_top_level(|symbol| !symbol.is_private);
    }

    fn import_specifiers(&self, parsed: &ParsedSource) -> Vec<String> {
        match self.imports.get(&self.grammar) {
            Ok(query) => parsed
                .captured_nodes(query, "path")
                .iter()
                .map(|node| strip_quotes(parsed.node_text(node)).to_string())
                .collect(),
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        }
    }

    fn resolve_specifier(&self, specifier: &str, file: &Path, repo_root: &Path) -> Vec<PathBuf> {
        let dir = if is_relative_specifier(specifier) {
            match file.parent() {
                Some(parent) => normalize_lexically(&parent.join(specifier)),
                None => return Vec::new(),
            }
        } else {
            let Some(module) = self.module_path(repo_root) else {
                return Vec::new();
            };
            if specifier == module {
                repo_root.to_path_buf()
            } else if let Some(rest) = specifier
                .strip_prefix(module.as_str())
                .and_then(|r| r.strip_prefix('/'))
            {
                repo_root.join(rest)
            } else {
                return Vec::new();
            }
        };
        package_files(&dir)
            .into_iter()
            .filter(|candidate| candidate != file)
            .collect()
    }
}

struct GoVisitor<'p, 'b, 'a> {
    parsed: &'p ParsedSource,
    builder: &'b mut StructureBuilder<'a>,
}

impl GoVisitor<'_, '_, '_> {
    fn text(&self, node: &Node<'_>) -> &str {
        self.parsed.node_text(node)
    }

    fn doc_comment(&self, node: Node<'_>) -> Option<String> {
        let lines: Vec<String> = leading_comments(node)
            .iter()
            .map(|c| {
                let text = self.text(c);
                text.strip_prefix("//")
                    .map(str::trim)
                    .unwrap_or_else(|| text.trim_start_matches("/*").trim_end_matches("*/").trim())
                    .to_string()
            })
            .collect();
        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    fn receiver_type(&self, method: &Node<'_>) -> Option<String> {
        let receiver = method.child_by_field_name("receiver")?;
        let mut cursor = receiver.walk();
        let param = receiver
            .named_children(&mut cursor)
            .find(|n| n.kind() == "parameter_declaration")?;
        let ty = param.child_by_field_name("type")?;
        let text = self.text(&ty).trim_start_matches('*');
        Some(text.split('[').next().unwrap_or(text).trim().to_string())
    }

    fn declare(
        &mut self,
        node: Node<'_>,
        doc_anchor: Node<'_>,
        name: &str,
        kind: SymbolKind,
        scope: &Scope,
    ) -> uuid::Uuid {
        let docstring = self.doc_comment(doc_anchor);
        let symbol = self.builder.add_symbol(node, name, kind, scope);
        symbol.docstring = docstring;
        symbol.is_private = !is_exported_name(name);
        symbol.id
    }

    fn visit_type_declaration(&mut self, node: Node<'_>, scope: &Scope) {
        let mut cursor = node.walk();
        let specs: Vec<Node<'_>> = node
            .named_children(&mut cursor)
            .filter(|n| matches!(n.kind(), "type_spec" | "type_alias"))
            .collect();
        let single = specs.len() == 1;
        for spec in specs {
            let Some(name_node) = spec.child_by_field_name("name") else {
                continue;
            };
            let name = self.text(&name_node).to_string();
            let kind = match spec.child_by_field_name("type").map(|t| t.kind()) {
                Some("struct_type") => SymbolKind::Class,
                Some("interface_type") => SymbolKind::Interface,
                _ => SymbolKind::Type,
            };
            let anchor = if single { node } else { spec };
            self.declare(spec, anchor, &name, kind, scope);
        }
    }
}

impl NodeVisitor for GoVisitor<'_, '_, '_> {
    fn visit(&mut self, node: Node<'_>, scope: &Scope) -> Scope {
        match node.kind() {
            "function_declaration" => {
                let Some(name_node) = node.child_by_field_name("name") else {
                    return scope.clone();
                };
                let name = self.text(&name_node).to_string();
                let id = self.declare(node, node, &name, SymbolKind::Function, scope);
                scope.enter_function(id)
            }
            "method_declaration" => {
                let Some(name_node) = node.child_by_field_name("name") else {
                    return scope.clone();
                };
                let name = self.text(&name_node).to_string();
                let receiver = self.receiver_type(&node);
                let method_scope = Scope {
                    container: receiver,
                    ..scope.clone()
                };
                let id = self.declare(node, node, &name, SymbolKind::Function, &method_scope);
                scope.enter_function(id)
            }
            "type_declaration" => {
                self.visit_type_declaration(node, scope);
                scope.clone()
            }
            "import_spec" => {
                let text = self.text(&node).to_string();
                self.builder.add_import(&format!("import {}", text));
                scope.clone()
            }
            "call_expression" => {
                if let (Some(caller), Some(function)) =
                    (scope.symbol, node.child_by_field_name("function"))
                {
                    let callee = match function.kind() {
                        "identifier" => Some(self.text(&function).to_string()),
                        "selector_expression" => function
                            .child_by_field_name("field")
                            .map(|f| self.text(&f).to_string()),
                        _ => None,
                    };
                    if let Some(callee) = callee {
                        self.builder.add_call(caller, &callee, node, "calls");
                    }
                }
                scope.clone()
            }
            "binary_expression" => {
                let short_circuit = node
                    .child_by_field_name("operator")
                    .is_some_and(|op| matches!(op.kind(), "&&" | "||"));
                if short_circuit {
                    self.builder.add_decision_point();
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
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    const SERVER_GO: &str = r#"package server

import (
	"fmt"
	"example.com/app/store"
)

// Server handles requests.
type Server struct {
	db *store.DB
}

type Handler interface {
	Serve() error
}

type ID string

func New() *Server {
	return &Server{db: store.Open()}
}

func (s *Server) Start(port int) error {
	if port == 0 || port > 65535 {
		return fmt.Errorf("bad port")
	}
	s.listen()
	return nil
}

func (s *Server) listen() {}
"#;

    #[test]
    fn test_go_declarations() {
        let temp = TempDir::new().unwrap();
        let file = write(temp.path(), "server/server.go", SERVER_GO);

        let out = GoExtractor::new().extract_structure(&file, temp.path());
        let summary: Vec<(&str, &str, Option<&str>)> = out
            .symbols
            .iter()
            .map(|s| (s.name.as_str(), s.kind.as_str(), s.parent.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Server", "class", None),
                ("Handler", "interface", None),
                ("ID", "type", None),
                ("New", "function", None),
                ("Start", "function", Some("Server")),
                ("listen", "function", Some("Server")),
            ]
        );

        let server = &out.symbols[0];
        assert_eq!(server.docstring.as_deref(), Some("Server handles requests."));
        assert!(server.is_exported);

        let listen = out.symbols.iter().find(|s| s.name == "listen").unwrap();
        assert!(listen.is_private);
        assert!(!listen.is_exported);

        assert_eq!(
            out.imports,
            vec!["import \"example.com/app/store\"", "import \"fmt\""]
        );
        // if, ||
        assert_eq!(out.metadata.complexity_score, 3);

        let start = out.symbols.iter().find(|s| s.name == "Start").unwrap();
        assert!(out
            .function_dependencies
            .iter()
            .any(|d| d.from_symbol == start.id && d.to_symbol == listen.id));
    }

    #[test]
    fn test_module_imports_resolve_to_package_files() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "go.mod", "module example.com/app\n\ngo 1.22\n");
        write(temp.path(), "store/db.go", "package store\n");
        write(temp.path(), "store/open.go", "package store\n");
        write(temp.path(), "store/db_test.go", "package store\n");
        let file = write(temp.path(), "server/server.go", SERVER_GO);

        let deps = GoExtractor::new().extract_dependencies(&file, temp.path());
        assert_eq!(deps, vec!["store/db.go", "store/open.go"]);
    }

    #[test]
    fn test_without_go_mod_only_relative_imports_resolve() {
        let temp = TempDir::new().unwrap();
        let file = write(temp.path(), "server/server.go", SERVER_GO);
        let deps = GoExtractor::new().extract_dependencies(&file, temp.path());
        assert!(deps.is_empty());
    }

    #[test]
    fn test_read_module_path() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "go.mod", "// comment\nmodule \"github.com/x/y\"\n");
        assert_eq!(read_module_path(temp.path()), Some("github.com/x/y".to_string()));
        assert_eq!(read_module_path(&temp.path().join("nowhere")), None);
    }
}
