use parking_lot::Mutex;
use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// First synthetic lane id; keeps lanes disjoint from OS thread ids.
pub const LANE_ID_BASE: u64 = 1_000_000;

/// Sort index given to every synthetic lane so viewers draw them below real
/// threads.
pub const LANE_SORT_INDEX: u64 = 1_000_000;

/// Naming template for a family of asynchronous lanes. The `{}` placeholder
/// is replaced with a per-family counter when a new lane is minted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LaneKind {
    template: Cow<'static, str>,
}

impl LaneKind {
    pub fn new(template: impl Into<Cow<'static, str>>) -> Self {
        LaneKind {
            template: template.into(),
        }
    }

    pub fn lane_name(&self, index: u64) -> String {
        let index = index.to_string();
        if self.template.contains("{}") {
            self.template.replacen("{}", &index, 1)
        } else {
            format!("{} {}", self.template, index)
        }
    }
}

/// Lane-naming record, emitted once per minted lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneMetadata {
    pub lane_id: u64,
    pub display_name: String,
    pub sort_index: u64,
}

#[derive(Debug, Default)]
struct LaneState {
    /// Freed lane ids, smallest first.
    free: BinaryHeap<Reverse<u64>>,
    /// How many lanes of this kind have been named so far.
    named: u64,
}

/// Pool of synthetic lane ids per [`LaneKind`], recycling released ids.
#[derive(Debug)]
pub(crate) struct LaneAllocator {
    next_lane_id: AtomicU64,
    states: Mutex<HashMap<LaneKind, LaneState>>,
}

impl LaneAllocator {
    pub fn new() -> Self {
        LaneAllocator {
            next_lane_id: AtomicU64::new(LANE_ID_BASE),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a lane id, preferring the smallest previously released one.
    /// When a fresh id is minted, also returns the naming record to emit.
    pub fn acquire(&self, kind: &LaneKind) -> (u64, Option<LaneMetadata>) {
        let mut states = self.states.lock();
        let state = states.entry(kind.clone()).or_default();
        if let Some(Reverse(lane_id)) = state.free.pop() {
            return (lane_id, None);
        }
        let lane_id = self.next_lane_id.fetch_add(1, Ordering::Relaxed);
        let display_name = kind.lane_name(state.named);
        state.named += 1;
        let metadata = LaneMetadata {
            lane_id,
            display_name,
            sort_index: LANE_SORT_INDEX,
        };
        (lane_id, Some(metadata))
    }

    /// Returns a lane to its kind's free list. Callers release exactly once.
    pub fn release(&self, kind: &LaneKind, lane_id: u64) {
        let mut states = self.states.lock();
        if let Some(state) = states.get_mut(kind) {
            state.free.push(Reverse(lane_id));
        }
    }
}
