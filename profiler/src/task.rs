use serde::{Deserialize, Serialize};
use std::time::Duration;

const MS: u64 = 1_000_000;

/// Category of a profiled task.
///
/// The set is closed; adding a category is a code change. Each kind carries
/// a stable display description, a minimum duration below which completed
/// regions are dropped from the trace (unless all durations are recorded),
/// and flags selecting VFS sub-bucketing and slowest-instance tracking.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TaskKind {
    Phase,
    Action,
    ActionCheck,
    ActionLock,
    Info,
    Wait,
    VfsStat,
    VfsOpen,
    VfsRead,
    VfsWrite,
    VfsDir,
    VfsReadlink,
    VfsGlob,
    VfsDelete,
    VfsDigest,
    CriticalPathComponent,
    ActionCounts,
    ActionCacheCounts,
    Unknown,
}

impl TaskKind {
    pub const ALL: [TaskKind; 19] = [
        TaskKind::Phase,
        TaskKind::Action,
        TaskKind::ActionCheck,
        TaskKind::ActionLock,
        TaskKind::Info,
        TaskKind::Wait,
        TaskKind::VfsStat,
        TaskKind::VfsOpen,
        TaskKind::VfsRead,
        TaskKind::VfsWrite,
        TaskKind::VfsDir,
        TaskKind::VfsReadlink,
        TaskKind::VfsGlob,
        TaskKind::VfsDelete,
        TaskKind::VfsDigest,
        TaskKind::CriticalPathComponent,
        TaskKind::ActionCounts,
        TaskKind::ActionCacheCounts,
        TaskKind::Unknown,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Stable display description, used as the `cat` field of trace events.
    pub fn description(self) -> &'static str {
        match self {
            TaskKind::Phase => "build phase marker",
            TaskKind::Action => "action processing",
            TaskKind::ActionCheck => "action dependency checking",
            TaskKind::ActionLock => "action resource lock",
            TaskKind::Info => "general information",
            TaskKind::Wait => "thread wait",
            TaskKind::VfsStat => "VFS stat",
            TaskKind::VfsOpen => "VFS open",
            TaskKind::VfsRead => "VFS read",
            TaskKind::VfsWrite => "VFS write",
            TaskKind::VfsDir => "VFS readdir",
            TaskKind::VfsReadlink => "VFS readlink",
            TaskKind::VfsGlob => "VFS glob",
            TaskKind::VfsDelete => "VFS delete",
            TaskKind::VfsDigest => "VFS digest",
            TaskKind::CriticalPathComponent => "critical path component",
            TaskKind::ActionCounts => "action count",
            TaskKind::ActionCacheCounts => "action cache count",
            TaskKind::Unknown => "unknown event",
        }
    }

    /// Completed regions shorter than this are dropped from the trace unless
    /// the profiler records all durations. Values are fixed and stable across
    /// runs.
    pub fn min_duration(self) -> Duration {
        let nanos = match self {
            TaskKind::ActionLock => 50 * MS,
            TaskKind::Wait => 5 * MS,
            kind if kind.is_vfs() => 10 * MS,
            _ => 0,
        };
        Duration::from_nanos(nanos)
    }

    pub fn is_vfs(self) -> bool {
        matches!(
            self,
            TaskKind::VfsStat
                | TaskKind::VfsOpen
                | TaskKind::VfsRead
                | TaskKind::VfsWrite
                | TaskKind::VfsDir
                | TaskKind::VfsReadlink
                | TaskKind::VfsGlob
                | TaskKind::VfsDelete
                | TaskKind::VfsDigest
        )
    }

    /// Whether a top-K slowest-instance aggregator is kept for this kind.
    pub fn collects_slowest_instances(self) -> bool {
        self == TaskKind::Action || self.is_vfs()
    }

    /// Short series label used for counter events of the `*Counts` kinds.
    pub(crate) fn counter_series_label(self) -> &'static str {
        match self {
            TaskKind::ActionCounts => "action",
            TaskKind::ActionCacheCounts => "local action cache",
            _ => "value",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Immutable bitmask of task kinds, the profiled-set representation copied
/// out of the configuration at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskKindSet(u32);

impl TaskKindSet {
    pub const EMPTY: TaskKindSet = TaskKindSet(0);

    pub fn of(kinds: &[TaskKind]) -> Self {
        let mut bits = 0u32;
        for kind in kinds {
            bits |= 1 << kind.index();
        }
        TaskKindSet(bits)
    }

    pub fn all() -> Self {
        TaskKindSet::of(&TaskKind::ALL)
    }

    pub fn contains(self, kind: TaskKind) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn bits(self) -> u32 {
        self.0
    }

    pub(crate) fn from_bits(bits: u32) -> Self {
        TaskKindSet(bits)
    }
}

/// Action-specific payload attached to a task event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionData {
    pub mnemonic: Option<String>,
    pub primary_output: Option<String>,
    pub target_label: Option<String>,
}

impl ActionData {
    pub(crate) fn is_empty(&self) -> bool {
        self.mnemonic.is_none() && self.primary_output.is_none() && self.target_label.is_none()
    }
}

/// A single recorded event. `duration_nanos == 0` denotes an instantaneous
/// event; the lane id defaults to the OS thread id of the recording thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub lane_id: u64,
    pub start_nanos: u64,
    pub duration_nanos: u64,
    pub kind: TaskKind,
    pub description: String,
    pub action: Option<ActionData>,
}

/// Named build phases announced through `mark_phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfilePhase {
    Launch,
    Init,
    TargetPattern,
    Analyze,
    Prepare,
    Execute,
    Finish,
}

impl ProfilePhase {
    pub fn description(self) -> &'static str {
        match self {
            ProfilePhase::Launch => "launch",
            ProfilePhase::Init => "init",
            ProfilePhase::TargetPattern => "target pattern evaluation",
            ProfilePhase::Analyze => "analysis",
            ProfilePhase::Prepare => "preparation",
            ProfilePhase::Execute => "execution",
            ProfilePhase::Finish => "finish",
        }
    }
}
