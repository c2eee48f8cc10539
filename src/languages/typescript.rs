//! JavaScript and TypeScript share one extractor. `.ts`, `.mts` and `.cts`
//! use the TypeScript grammar; `.tsx` and all JavaScript use TSX, which also
//! accepts JSX.

use std::path::{Path, PathBuf};

use tracing::warn;
use tree_sitter::Node;

use super::LanguageExtractor;
use crate::indexer::extractor::{
    leading_comments, strip_quotes, walk_tree, NodeVisitor, Scope, StructureBuilder,
};
use crate::indexer::import_resolver::{probe_module, specifier_base};
use crate::indexer::parser::{LazyGrammar, LazyQuery, ParsedSource};
use crate::model::{Export, Language, SymbolKind};

const IMPORTS_QUERY: &str = r#"
(import_statement source: (string) @source)
(export_statement source: (string) @source)
(call_expression
    function: (identifier) @callee
    arguments: (arguments (string) @source)
    (#eq? @callee "require"))
"#;

const TS_EXTENSIONS: &[&str] = &["ts", "tsx", "d.ts", "js", "jsx", "mjs", "cjs"];
const JS_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs", "ts", "tsx"];
const SCRIPT_SUFFIXES: &[&str] = &[".js", ".jsx", ".mjs", ".cjs"];
const INDEX_NAMES: &[&str] = &["index"];

const DECISION_NODES: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "switch_case",
    "catch_clause",
    "ternary_expression",
];

const FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

fn typescript_language() -> tree_sitter::Language {
    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
}

fn tsx_language() -> tree_sitter::Language {
    tree_sitter_typescript::LANGUAGE_TSX.into()
}

pub struct EcmaScriptExtractor {
    language: Language,
    typescript: LazyGrammar,
    tsx: LazyGrammar,
    typescript_imports: LazyQuery,
    tsx_imports: LazyQuery,
}

impl EcmaScriptExtractor {
    fn with_language(language: Language) -> Self {
        Self {
            language,
            typescript: LazyGrammar::new("typescript", typescript_language),
            tsx: LazyGrammar::new("tsx", tsx_language),
            typescript_imports: LazyQuery::new(IMPORTS_QUERY),
            tsx_imports: LazyQuery::new(IMPORTS_QUERY),
        }
    }

    pub fn typescript() -> Self {
        Self::with_language(Language::TypeScript)
    }

    pub fn javascript() -> Self {
        Self::with_language(Language::JavaScript)
    }

    fn probe_extensions(&self) -> &'static [&'static str] {
        match self.language {
            Language::TypeScript => TS_EXTENSIONS,
            _ => JS_EXTENSIONS,
        }
    }
}

impl LanguageExtractor for EcmaScriptExtractor {
    fn language(&self) -> Language {
        self.language
    }

    fn grammar_for(&self, path: &Path) -> &LazyGrammar {
        let is_tsx = path.extension().and_then(|e| e.to_str()) == Some("tsx");
        if self.language == Language::TypeScript && !is_tsx {
            &self.typescript
        } else {
            &self.tsx
        }
    }

    fn collect_structure(&self, parsed: &ParsedSource, builder: &mut StructureBuilder<'_>) {
        let mut visitor = EcmaScriptVisitor {
            parsed,
            builder: &mut *builder,
        };
        walk_tree(parsed.root_node(), &mut visitor);
    }

    fn import_specifiers(&self, parsed: &ParsedSource) -> Vec<String> {
        let (grammar, query) = if parsed.grammar == self.typescript.name() {
            (&self.typescript, &self.typescript_imports)
        } else {
            (&self.tsx, &self.tsx_imports)
        };
        match query.get(grammar) {
            Ok(query) => parsed
                .captured_nodes(query, "source")
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
        let Some(base) = specifier_base(specifier, file, repo_root) else {
            return Vec::new();
        };
        if let Some(found) = probe_module(&base, self.probe_extensions(), INDEX_NAMES) {
            return vec![found];
        }
        // ESM sources import `./x.js` for a sibling `x.ts`.
        let base_str = base.to_string_lossy();
        for suffix in SCRIPT_SUFFIXES {
            if let Some(stem) = base_str.strip_suffix(suffix) {
                let stem = PathBuf::from(stem);
                if let Some(found) = probe_module(&stem, self.probe_extensions(), INDEX_NAMES) {
                    return vec![found];
                }
            }
        }
        Vec::new()
    }
}

struct EcmaScriptVisitor<'p, 'b, 'a> {
    parsed: &'p ParsedSource,
    builder: &'b mut StructureBuilder<'a>,
}

fn export_statement_of<'t>(decl: Node<'t>) -> Option<Node<'t>> {
    decl.parent().filter(|p| p.kind() == "export_statement")
}

fn is_default_export(statement: &Node<'_>) -> bool {
    let mut cursor = statement.walk();
    let found = statement.children(&mut cursor).any(|c| c.kind() == "default");
    found
}

impl EcmaScriptVisitor<'_, '_, '_> {
    fn text(&self, node: &Node<'_>) -> &str {
        self.parsed.node_text(node)
    }

    fn field_text(&self, node: &Node<'_>, field: &str) -> Option<String> {
        node.child_by_field_name(field)
            .map(|n| self.text(&n).to_string())
    }

    fn jsdoc(&self, node: Node<'_>) -> Option<String> {
        let anchor = export_statement_of(node).unwrap_or(node);
        let comment = leading_comments(anchor).pop()?;
        let text = self.text(&comment);
        let body = text.strip_prefix("/**")?.strip_suffix("*/")?;
        let lines: Vec<&str> = body
            .lines()
            .map(|line| line.trim().trim_start_matches('*').trim())
            .filter(|line| !line.is_empty())
            .collect();
        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    fn has_private_modifier(&self, node: &Node<'_>) -> bool {
        let mut cursor = node.walk();
        let found = node
            .children(&mut cursor)
            .any(|c| c.kind() == "accessibility_modifier" && self.text(&c) == "private");
        found
    }

    /// Records a declaration and any `export` wrapping `export_anchor`.
    fn declare(
        &mut self,
        node: Node<'_>,
        export_anchor: Node<'_>,
        name: &str,
        kind: SymbolKind,
        scope: &Scope,
    ) -> uuid::Uuid {
        let docstring = self.jsdoc(export_anchor);
        let private = name.starts_with('_') || name.starts_with('#') || self.has_private_modifier(&node);
        let symbol = self.builder.add_symbol(node, name, kind, scope);
        symbol.docstring = docstring;
        symbol.is_private = private;
        let id = symbol.id;

        if let Some(statement) = export_statement_of(export_anchor) {
            let exported_name = if is_default_export(&statement) {
                "default"
            } else {
                name
            };
            self.builder.export_symbol(exported_name, kind.as_str(), id);
        }
        id
    }

    fn visit_export_statement(&mut self, node: Node<'_>) {
        let source = self.field_text(&node, "source").map(|s| strip_quotes(&s).to_string());
        if source.is_some() {
            self.builder.add_import(self.parsed.node_text(&node));
        }

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        for child in &children {
            match child.kind() {
                "export_clause" => {
                    let mut inner = child.walk();
                    let specifiers: Vec<Node<'_>> = child
                        .named_children(&mut inner)
                        .filter(|n| n.kind() == "export_specifier")
                        .collect();
                    for specifier in specifiers {
                        let Some(local) = self.field_text(&specifier, "name") else {
                            continue;
                        };
                        let exported = self
                            .field_text(&specifier, "alias")
                            .unwrap_or_else(|| local.clone());
                        match &source {
                            Some(module) => self.builder.export_external(Export {
                                name: exported,
                                export_type: "reexport".to_string(),
                                symbol_id: None,
                                is_reexport: true,
                                original_module: Some(module.clone()),
                            }),
                            None => self.builder.export_local(&exported, &local, None),
                        }
                    }
                }
                "namespace_export" => {
                    let mut inner = child.walk();
                    let alias = child
                        .named_children(&mut inner)
                        .last()
                        .map(|n| self.text(&n).to_string())
                        .unwrap_or_else(|| "*".to_string());
                    self.builder.export_external(Export {
                        name: alias,
                        export_type: "namespace".to_string(),
                        symbol_id: None,
                        is_reexport: true,
                        original_module: source.clone(),
                    });
                }
                "*" if source.is_some() => {
                    self.builder.export_external(Export {
                        name: "*".to_string(),
                        export_type: "reexport".to_string(),
                        symbol_id: None,
                        is_reexport: true,
                        original_module: source.clone(),
                    });
                }
                _ => {}
            }
        }

        if is_default_export(&node) && node.child_by_field_name("declaration").is_none() {
            match node.child_by_field_name("value") {
                Some(value) if value.kind() == "identifier" => {
                    let local = self.text(&value).to_string();
                    self.builder.export_local("default", &local, None);
                }
                Some(_) => self.builder.export_external(Export {
                    name: "default".to_string(),
                    export_type: "default".to_string(),
                    symbol_id: None,
                    is_reexport: false,
                    original_module: None,
                }),
                None => {}
            }
        }
    }

    /// `exports.x = ...`, `module.exports.x = ...` and `module.exports = {...}`.
    fn visit_commonjs_assignment(&mut self, node: Node<'_>) {
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        if left.kind() != "member_expression" {
            return;
        }
        let object = left
            .child_by_field_name("object")
            .map(|o| self.text(&o).to_string())
            .unwrap_or_default();
        let property = left
            .child_by_field_name("property")
            .map(|p| self.text(&p).to_string())
            .unwrap_or_default();

        if object == "module" && property == "exports" {
            match right.kind() {
                "object" => {
                    let mut cursor = right.walk();
                    let members: Vec<Node<'_>> = right.named_children(&mut cursor).collect();
                    for member in members {
                        match member.kind() {
                            "shorthand_property_identifier" => {
                                let name = self.text(&member).to_string();
                                self.builder.export_local(&name, &name, Some("commonjs"));
                            }
                            "pair" => {
                                let (Some(key), Some(value)) =
                                    (self.field_text(&member, "key"), self.field_text(&member, "value"))
                                else {
                                    continue;
                                };
                                self.builder.export_local(&key, &value, Some("commonjs"));
                            }
                            _ => {}
                        }
                    }
                }
                "identifier" => {
                    let local = self.text(&right).to_string();
                    self.builder.export_local("default", &local, Some("commonjs"));
                }
                _ => {}
            }
        } else if object == "exports" || object == "module.exports" {
            let local = if right.kind() == "identifier" {
                self.text(&right).to_string()
            } else {
                property.clone()
            };
            self.builder.export_local(&property, &local, Some("commonjs"));
        }
    }

    fn visit_call(&mut self, node: Node<'_>, scope: &Scope) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let callee = match function.kind() {
            "identifier" => {
                let name = self.text(&function);
                if name == "require" {
                    self.builder.add_import(self.parsed.node_text(&node));
                    return;
                }
                name.to_string()
            }
            "member_expression" => match self.field_text(&function, "property") {
                Some(property) => property,
                None => return,
            },
            _ => return,
        };
        if let Some(caller) = scope.symbol {
            self.builder.add_call(caller, &callee, node, "calls");
        }
    }
}

impl NodeVisitor for EcmaScriptVisitor<'_, '_, '_> {
    fn visit(&mut self, node: Node<'_>, scope: &Scope) -> Scope {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                let Some(name) = self.field_text(&node, "name") else {
                    return scope.clone();
                };
                let id = self.declare(node, node, &name, SymbolKind::Function, scope);
                scope.enter_function(id)
            }
            "class_declaration" | "abstract_class_declaration" => {
                let Some(name) = self.field_text(&node, "name") else {
                    return scope.clone();
                };
                let id = self.declare(node, node, &name, SymbolKind::Class, scope);
                scope.enter_class(id, &name)
            }
            "method_definition" => {
                let Some(name) = self.field_text(&node, "name") else {
                    return scope.clone();
                };
                let id = self.declare(node, node, &name, SymbolKind::Function, scope);
                scope.enter_function(id)
            }
            "interface_declaration" => {
                if let Some(name) = self.field_text(&node, "name") {
                    self.declare(node, node, &name, SymbolKind::Interface, scope);
                }
                scope.clone()
            }
            "type_alias_declaration" => {
                if let Some(name) = self.field_text(&node, "name") {
                    self.declare(node, node, &name, SymbolKind::Type, scope);
                }
                scope.clone()
            }
            "enum_declaration" => {
                if let Some(name) = self.field_text(&node, "name") {
                    self.declare(node, node, &name, SymbolKind::Enum, scope);
                }
                scope.clone()
            }
            "variable_declarator" => {
                let (Some(name_node), Some(value)) = (
                    node.child_by_field_name("name"),
                    node.child_by_field_name("value"),
                ) else {
                    return scope.clone();
                };
                if name_node.kind() != "identifier" {
                    return scope.clone();
                }
                let name = self.text(&name_node).to_string();
                let anchor = node
                    .parent()
                    .filter(|p| matches!(p.kind(), "lexical_declaration" | "variable_declaration"))
                    .unwrap_or(node);
                if FUNCTION_VALUES.contains(&value.kind()) {
                    let id = self.declare(node, anchor, &name, SymbolKind::Function, scope);
                    scope.enter_function(id)
                } else if value.kind() == "class" {
                    let id = self.declare(node, anchor, &name, SymbolKind::Class, scope);
                    scope.enter_class(id, &name)
                } else {
                    if export_statement_of(anchor).is_some() {
                        self.builder.export_local(&name, &name, Some("variable"));
                    }
                    scope.clone()
                }
            }
            "export_statement" => {
                self.visit_export_statement(node);
                scope.clone()
            }
            "import_statement" => {
                self.builder.add_import(self.parsed.node_text(&node));
                scope.clone()
            }
            "call_expression" => {
                self.visit_call(node, scope);
                scope.clone()
            }
            "new_expression" => {
                if let (Some(caller), Some(constructor)) =
                    (scope.symbol, node.child_by_field_name("constructor"))
                {
                    let callee = match constructor.kind() {
                        "member_expression" => self.field_text(&constructor, "property"),
                        _ => Some(self.text(&constructor).to_string()),
                    };
                    if let Some(callee) = callee {
                        self.builder.add_call(caller, &callee, node, "instantiates");
                    }
                }
                scope.clone()
            }
            "assignment_expression" => {
                self.visit_commonjs_assignment(node);
                scope.clone()
            }
            "binary_expression" => {
                let short_circuit = node
                    .child_by_field_name("operator")
                    .is_some_and(|op| matches!(op.kind(), "&&" | "||" | "??"));
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
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_typescript_declarations() {
        let temp = TempDir::new().unwrap();
        let file = write(
            temp.path(),
            "src/service.ts",
            r#"/** Loads users. */
export class UserService {
  private cache = new Map();

  private reset(): void {}

  load(id: string) {
    return this.fetch(id);
  }
}

export interface User { id: string }
export type UserId = string;
export enum Role { Admin, Guest }
const _internal = () => 1;
export function makeService(): UserService {
  return new UserService();
}
"#,
        );

        let out = EcmaScriptExtractor::typescript().extract_structure(&file, temp.path());
        let summary: Vec<(&str, &str)> = out
            .symbols
            .iter()
            .map(|s| (s.name.as_str(), s.kind.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("UserService", "class"),
                ("reset", "function"),
                ("load", "function"),
                ("User", "interface"),
                ("UserId", "type"),
                ("Role", "enum"),
                ("_internal", "function"),
                ("makeService", "function"),
            ]
        );

        let service = &out.symbols[0];
        assert!(service.is_exported);
        assert_eq!(service.docstring.as_deref(), Some("Loads users."));

        let reset = out.symbols.iter().find(|s| s.name == "reset").unwrap();
        assert!(reset.is_private);
        assert_eq!(reset.parent.as_deref(), Some("UserService"));

        let internal = out.symbols.iter().find(|s| s.name == "_internal").unwrap();
        assert!(internal.is_private);
        assert!(!internal.is_exported);

        let exports: Vec<&str> = out.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(exports, vec!["Role", "User", "UserId", "UserService", "makeService"]);

        let instantiation = out
            .function_dependencies
            .iter()
            .find(|d| d.dependency_type == "instantiates")
            .unwrap();
        assert_eq!(instantiation.to_symbol, service.id);
    }

    #[test]
    fn test_export_clauses_and_reexports() {
        let temp = TempDir::new().unwrap();
        let file = write(
            temp.path(),
            "index.ts",
            "function a() {}\nconst b = 2;\nexport { a, b as bee };\nexport * from './lib';\nexport { x as y } from './other';\nexport default a;\n",
        );

        let out = EcmaScriptExtractor::typescript().extract_structure(&file, temp.path());
        let exports: Vec<(&str, &str, bool)> = out
            .exports
            .iter()
            .map(|e| (e.name.as_str(), e.export_type.as_str(), e.is_reexport))
            .collect();
        assert_eq!(
            exports,
            vec![
                ("*", "reexport", true),
                ("a", "function", false),
                ("bee", "variable", false),
                ("default", "function", false),
                ("y", "reexport", true),
            ]
        );
        let a = out.symbols.iter().find(|s| s.name == "a").unwrap();
        assert!(a.is_exported);
    }

    #[test]
    fn test_commonjs_exports() {
        let temp = TempDir::new().unwrap();
        let file = write(
            temp.path(),
            "lib.js",
            "const util = require('./util');\nfunction helper() { return util.run(); }\nfunction main() { return helper(); }\nmodule.exports = { helper, entry: main };\n",
        );

        let out = EcmaScriptExtractor::javascript().extract_structure(&file, temp.path());
        let exports: Vec<&str> = out.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(exports, vec!["entry", "helper"]);
        assert!(out.exports.iter().all(|e| e.symbol_id.is_some()));
        assert_eq!(out.imports, vec!["require('./util')"]);
        assert_eq!(out.function_dependencies.len(), 1);
        assert_eq!(out.metadata.unresolved_calls[0].callee, "run");
    }

    #[test]
    fn test_relative_imports_resolve() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/util.ts", "export const x = 1;\n");
        write(temp.path(), "src/models/index.ts", "export interface M {}\n");
        write(temp.path(), "src/esm.ts", "export const e = 1;\n");
        write(temp.path(), "shared/config.ts", "export const c = 1;\n");
        let file = write(
            temp.path(),
            "src/app.ts",
            "import React from 'react';\nimport { x } from './util';\nimport { M } from './models';\nimport { e } from './esm.js';\nimport { c } from '/shared/config';\nimport { gone } from './missing';\nexport { x } from './util';\n",
        );

        let deps = EcmaScriptExtractor::typescript().extract_dependencies(&file, temp.path());
        assert_eq!(
            deps,
            vec![
                "shared/config.ts",
                "src/esm.ts",
                "src/models/index.ts",
                "src/util.ts"
            ]
        );
    }

    #[test]
    fn test_jsx_parses_with_tsx_grammar() {
        let temp = TempDir::new().unwrap();
        let file = write(
            temp.path(),
            "App.jsx",
            "export function App() {\n  return <div className=\"x\">{ok ? 1 : 2}</div>;\n}\n",
        );

        let out = EcmaScriptExtractor::javascript().extract_structure(&file, temp.path());
        assert_eq!(out.symbols.len(), 1);
        assert!(out.symbols[0].is_exported);
        assert_eq!(out.metadata.complexity_score, 2);
        assert!(!out.metadata.has_syntax_errors);
    }

    #[test]
    fn test_complexity_counts_short_circuit_operators() {
        let temp = TempDir::new().unwrap();
        let file = write(
            temp.path(),
            "logic.ts",
            "function f(a: number, b?: number) {\n  if (a > 0 && b) { return 1; }\n  for (const x of [1]) {}\n  return b ?? a;\n}\n",
        );

        let out = EcmaScriptExtractor::typescript().extract_structure(&file, temp.path());
        // if, &&, for-of, ??
        assert_eq!(out.metadata.complexity_score, 5);
    }
}
