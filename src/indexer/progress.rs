use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by the analysis workers.
pub struct AnalysisProgress {
    files_total: usize,
    files_processed: AtomicUsize,
    symbols_extracted: AtomicUsize,
    failures: AtomicUsize,
    started_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub files_total: usize,
    pub files_processed: usize,
    pub symbols_extracted: usize,
    pub failures: usize,
    pub elapsed: Duration,
}

impl AnalysisProgress {
    pub fn start(files_total: usize) -> Self {
        Self {
            files_total,
            files_processed: AtomicUsize::new(0),
            symbols_extracted: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, symbols_count: usize) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.symbols_extracted
            .fetch_add(symbols_count, Ordering::Relaxed);
    }

    /// A file that was kept with empty structure because extraction failed.
    pub fn inc_failure(&self) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files_total: self.files_total,
            files_processed: self.files_processed.load(Ordering::Acquire),
            symbols_extracted: self.symbols_extracted.load(Ordering::Acquire),
            failures: self.failures.load(Ordering::Acquire),
            elapsed: self.started_at.elapsed(),
        }
    }
}
