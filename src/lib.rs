pub mod cache;
pub mod config;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod model;
pub mod query;
pub mod snapshot;

pub use cache::{CacheManager, CacheStatus};
pub use config::Config;
pub use error::{GraphError, Result};
pub use indexer::{AnalyzerOptions, ModelBuilder, RepositoryAnalyzer};
pub use languages::{ExtractorRegistry, LanguageExtractor};
pub use model::{
    AnalysisResult, Export, FileRecord, FunctionDependency, Language, LanguageSummary, Symbol,
    SymbolKind,
};
pub use query::{QueryEngine, SearchQuery};
pub use snapshot::StructureSnapshot;
