use once_cell::sync::OnceCell;
use tracing::debug;
use tree_sitter::{Query, QueryCursor, StreamingIterator};

use crate::error::{GraphError, Result};

/// Grammar handle owned by an extractor and initialised on first use.
///
/// The outcome of the first initialisation, success or failure, is cached and
/// returned by every later call.
pub struct LazyGrammar {
    name: &'static str,
    loader: fn() -> tree_sitter::Language,
    cell: OnceCell<std::result::Result<tree_sitter::Language, String>>,
}

impl LazyGrammar {
    pub fn new(name: &'static str, loader: fn() -> tree_sitter::Language) -> Self {
        Self {
            name,
            loader,
            cell: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn language(&self) -> Result<&tree_sitter::Language> {
        self.cell
            .get_or_init(|| {
                let language = (self.loader)();
                // Probe the ABI once so an incompatible grammar fails here, not per file.
                let mut probe = tree_sitter::Parser::new();
                match probe.set_language(&language) {
                    Ok(()) => {
                        debug!("Loaded {} grammar", self.name);
                        Ok(language)
                    }
                    Err(e) => Err(format!("{} grammar unavailable: {}", self.name, e)),
                }
            })
            .as_ref()
            .map_err(|e| GraphError::Parse(e.clone()))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn parse(&self, source: &str) -> Result<ParsedSource> {
        let language = self.language()?;
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(language)
            .map_err(|e| GraphError::Parse(e.to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| GraphError::Parse(format!("Failed to parse {} source", self.name)))?;

        Ok(ParsedSource {
            tree,
            source: source.to_string(),
            grammar: self.name,
        })
    }
}

/// Query source compiled against a grammar on first use.
pub struct LazyQuery {
    source: &'static str,
    cell: OnceCell<std::result::Result<Query, String>>,
}

impl LazyQuery {
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    pub fn get(&self, grammar: &LazyGrammar) -> Result<&Query> {
        let language = grammar.language()?;
        self.cell
            .get_or_init(|| Query::new(language, self.source).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| GraphError::Parse(format!("Invalid {} query: {}", grammar.name(), e)))
    }
}

pub struct ParsedSource {
    pub tree: tree_sitter::Tree,
    pub source: String,
    /// Name of the grammar that produced `tree`.
    pub grammar: &'static str,
}

impl ParsedSource {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    pub fn source_bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    pub fn node_text(&self, node: &tree_sitter::Node) -> &str {
        node.utf8_text(self.source_bytes()).unwrap_or("")
    }

    /// Nodes bound to `capture` across all matches, in source order.
    pub fn captured_nodes(&self, query: &Query, capture: &str) -> Vec<tree_sitter::Node<'_>> {
        let Some(index) = query.capture_index_for_name(capture) else {
            return Vec::new();
        };

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, self.root_node(), self.source_bytes());
        let mut nodes = Vec::new();
        while let Some(m) = matches.next() {
            for c in m.captures {
                if c.index == index {
                    nodes.push(c.node);
                }
            }
        }
        nodes.sort_by_key(|n| n.start_byte());
        nodes.dedup_by_key(|n| n.id());
        nodes
    }

    /// True when the parser had to recover from syntax errors anywhere in the file.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }
}
