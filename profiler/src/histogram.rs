use parking_lot::Mutex;

use crate::task::TaskKind;

/// Number of fixed-width (1 ms) buckets per histogram; the last bucket is
/// open-ended.
pub const HISTOGRAM_BUCKETS: usize = 20;

#[derive(Debug, Default)]
struct Stats {
    buckets: [u64; HISTOGRAM_BUCKETS],
    count: u64,
    max_millis: u64,
    max_description: String,
}

/// Thread-safe fixed-width duration histogram for one task category.
#[derive(Debug)]
pub struct SingleStatRecorder {
    name: String,
    stats: Mutex<Stats>,
}

impl SingleStatRecorder {
    fn new(name: String) -> Self {
        SingleStatRecorder {
            name,
            stats: Mutex::new(Stats::default()),
        }
    }

    pub fn add(&self, duration_millis: u64, description: &str) {
        let bucket = (duration_millis as usize).min(HISTOGRAM_BUCKETS - 1);
        let mut stats = self.stats.lock();
        stats.buckets[bucket] += 1;
        stats.count += 1;
        if duration_millis >= stats.max_millis {
            stats.max_millis = duration_millis;
            stats.max_description = description.to_string();
        }
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let stats = self.stats.lock();
        HistogramSnapshot {
            name: self.name.clone(),
            buckets: stats.buckets,
            count: stats.count,
            max_millis: stats.max_millis,
            max_description: stats.max_description.clone(),
        }
    }
}

/// Immutable view of one histogram, taken while the profiler is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub name: String,
    pub buckets: [u64; HISTOGRAM_BUCKETS],
    pub count: u64,
    pub max_millis: u64,
    pub max_description: String,
}

type DescriptionPredicate = fn(&str) -> bool;

fn is_output_path(description: &str) -> bool {
    description.contains("/out/")
}

fn is_external_path(description: &str) -> bool {
    description.contains("/external/")
}

fn is_cache_path(description: &str) -> bool {
    description.contains("/cache/")
}

fn any_path(_description: &str) -> bool {
    true
}

/// Ordered predicate cascade used to split VFS samples by path family.
/// The final catch-all always matches.
const VFS_HEURISTICS: [(&str, DescriptionPredicate); 4] = [
    ("output files", is_output_path),
    ("external files", is_external_path),
    ("cache files", is_cache_path),
    ("other files", any_path),
];

/// Stat recorder for one task kind: a single histogram for ordinary kinds,
/// a predicate cascade of sub-recorders for VFS kinds.
#[derive(Debug)]
pub enum StatRecorder {
    Single(SingleStatRecorder),
    PredicateBased(Vec<(DescriptionPredicate, SingleStatRecorder)>),
}

impl StatRecorder {
    fn for_kind(kind: TaskKind) -> Self {
        if kind.is_vfs() {
            let recorders = VFS_HEURISTICS
                .iter()
                .map(|(label, predicate)| {
                    let name = format!("{} {}", kind.description(), label);
                    (*predicate, SingleStatRecorder::new(name))
                })
                .collect();
            StatRecorder::PredicateBased(recorders)
        } else {
            StatRecorder::Single(SingleStatRecorder::new(kind.description().to_string()))
        }
    }

    pub fn add(&self, duration_millis: u64, description: &str) {
        match self {
            StatRecorder::Single(recorder) => recorder.add(duration_millis, description),
            StatRecorder::PredicateBased(recorders) => {
                for (predicate, recorder) in recorders {
                    if predicate(description) {
                        recorder.add(duration_millis, description);
                        return;
                    }
                }
            }
        }
    }

    pub fn snapshot(&self) -> Vec<HistogramSnapshot> {
        match self {
            StatRecorder::Single(recorder) => vec![recorder.snapshot()],
            StatRecorder::PredicateBased(recorders) => recorders
                .iter()
                .map(|(_, recorder)| recorder.snapshot())
                .collect(),
        }
    }
}

/// One recorder per task kind, rebuilt on every profiler start.
#[derive(Debug)]
pub(crate) struct TaskHistograms {
    recorders: Vec<StatRecorder>,
}

impl TaskHistograms {
    pub fn new() -> Self {
        TaskHistograms {
            recorders: TaskKind::ALL.iter().map(|&k| StatRecorder::for_kind(k)).collect(),
        }
    }

    pub fn add(&self, kind: TaskKind, duration_millis: u64, description: &str) {
        self.recorders[kind.index()].add(duration_millis, description);
    }

    pub fn snapshot_all(&self) -> Vec<HistogramSnapshot> {
        self.recorders.iter().flat_map(StatRecorder::snapshot).collect()
    }
}
