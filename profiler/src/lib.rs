//! In-process build profiler.
//!
//! A thread-safe event recorder instrumenting code regions across worker
//! threads: events are classified by [`TaskKind`], aggregated into per-kind
//! histograms and top-K slowest lists, counted into 200 ms action series,
//! and streamed by a background thread to a Chrome Trace JSON file
//! (optionally gzip-compressed). Resource usage is sampled alongside on a
//! second background thread.
//!
//! The fast path is lock-free: recording loads an atomic activity flag and
//! an atomic queue slot, and enqueueing never blocks the instrumented code.

use thiserror::Error;
use tracing::warn;

pub mod clock;
mod future;
pub mod histogram;
pub mod lane;
pub mod profiler;
pub mod sampler;
pub mod slowest;
pub mod task;
mod time_series;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use future::ProfiledFuture;
pub use histogram::{HistogramSnapshot, SingleStatRecorder, StatRecorder, HISTOGRAM_BUCKETS};
pub use lane::{LaneKind, LaneMetadata, LANE_ID_BASE, LANE_SORT_INDEX};
pub use profiler::{
    PhaseObserver, ProfileConfig, Profiler, ScopedProfiler, StartOptions, TaskGuard,
};
pub use sampler::{ResourceEstimator, WorkerMetrics, WorkerMetricsCollector};
pub use slowest::{SlowTask, SLOWEST_KEPT};
pub use task::{ActionData, ProfilePhase, TaskEvent, TaskKind, TaskKindSet};
pub use writer::{TraceFormat, CRITICAL_PATH_LANE_ID};

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("profiler is already active")]
    AlreadyActive,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace writer thread panicked")]
    WriterPanicked,
}

pub type Result<T> = std::result::Result<T, ProfilerError>;

/// Receives failures from the background threads; instrumented call sites
/// never see them.
pub trait BugReporter: Send + Sync {
    fn report(&self, error: &ProfilerError);
}

/// Default reporter: logs the failure and moves on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBugReporter;

impl BugReporter for LogBugReporter {
    fn report(&self, error: &ProfilerError) {
        warn!(%error, "profiler background failure");
    }
}
