//! In-memory query layer over an analysis result.

pub mod engine;
pub mod results;

pub use engine::QueryEngine;
pub use results::{
    CallerEntry, CallersResult, ContextResult, CyclesResult, DependentsResult, DepsResult,
    ExportView, FileEdge, PathResult, SearchHit, SearchQuery, SearchResult, StatsResult,
    SymbolView, SymbolsResult,
};
