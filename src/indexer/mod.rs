pub mod analyzer;
pub mod extractor;
pub mod import_resolver;
pub mod parser;
pub mod progress;
pub mod walker;

pub use analyzer::{AnalyzerOptions, ModelBuilder, RepositoryAnalyzer};
pub use extractor::{
    CallSite, ExtractedStructure, ExtractionMetadata, FileExtraction, NodeVisitor, Scope,
    StructureBuilder,
};
pub use parser::{LazyGrammar, LazyQuery, ParsedSource};
pub use progress::{AnalysisProgress, ProgressSnapshot};
pub use walker::{is_test_file, FileWalker};
