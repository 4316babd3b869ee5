use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::clock::current_thread_id;
use crate::task::{TaskEvent, TaskKind};

/// How many of the slowest instances are kept per task kind.
pub const SLOWEST_KEPT: usize = 30;

/// Shard count; threads map to shards by `thread_id % SHARDS` so concurrent
/// inserts rarely contend on the same lock.
const SHARDS: usize = 16;

/// One task that was notably slow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlowTask {
    pub duration_nanos: u64,
    pub description: String,
    pub kind: TaskKind,
}

impl From<&TaskEvent> for SlowTask {
    fn from(event: &TaskEvent) -> Self {
        SlowTask {
            duration_nanos: event.duration_nanos,
            description: event.description.clone(),
            kind: event.kind,
        }
    }
}

/// Sharded bounded top-K over task durations.
///
/// Each shard is a min-heap of at most [`SLOWEST_KEPT`] entries holding the
/// largest durations seen by that shard; merging happens only when the
/// result is read, which is rare.
#[derive(Debug)]
pub(crate) struct SlowestTaskAggregator {
    shards: [Mutex<BinaryHeap<Reverse<SlowTask>>>; SHARDS],
}

fn aggregate(heap: &mut BinaryHeap<Reverse<SlowTask>>, task: SlowTask) {
    if heap.len() < SLOWEST_KEPT {
        heap.push(Reverse(task));
    } else if heap.peek().is_some_and(|Reverse(smallest)| task > *smallest) {
        heap.pop();
        heap.push(Reverse(task));
    }
}

impl SlowestTaskAggregator {
    pub fn new() -> Self {
        SlowestTaskAggregator {
            shards: std::array::from_fn(|_| Mutex::new(BinaryHeap::new())),
        }
    }

    pub fn add(&self, task: SlowTask) {
        self.add_to_shard(current_thread_id() as usize % SHARDS, task);
    }

    fn add_to_shard(&self, shard: usize, task: SlowTask) {
        aggregate(&mut self.shards[shard].lock(), task);
    }

    /// Merges all shards into the top [`SLOWEST_KEPT`], slowest first.
    pub fn slowest(&self) -> Vec<SlowTask> {
        let mut merged: BinaryHeap<Reverse<SlowTask>> = BinaryHeap::new();
        for shard in &self.shards {
            for Reverse(task) in shard.lock().iter() {
                aggregate(&mut merged, task.clone());
            }
        }
        let mut tasks: Vec<SlowTask> = merged.into_iter().map(|Reverse(t)| t).collect();
        tasks.sort_by(|a, b| b.cmp(a));
        tasks
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slow(duration_nanos: u64) -> SlowTask {
        SlowTask {
            duration_nanos,
            description: format!("task-{duration_nanos}"),
            kind: TaskKind::Action,
        }
    }

    #[test]
    fn keeps_the_largest_k_within_one_shard() {
        let aggregator = SlowestTaskAggregator::new();
        for d in 1..=100 {
            aggregator.add_to_shard(0, slow(d));
        }
        let slowest = aggregator.slowest();
        assert_eq!(slowest.len(), SLOWEST_KEPT);
        assert_eq!(slowest[0].duration_nanos, 100);
        assert_eq!(slowest[SLOWEST_KEPT - 1].duration_nanos, 71);
    }

    #[test]
    fn merges_across_shards() {
        let aggregator = SlowestTaskAggregator::new();
        for d in 0..200 {
            aggregator.add_to_shard(d as usize % SHARDS, slow(d + 1));
        }
        let slowest = aggregator.slowest();
        let durations: Vec<u64> = slowest.iter().map(|t| t.duration_nanos).collect();
        let expected: Vec<u64> = (171..=200).rev().collect();
        assert_eq!(durations, expected);
    }

    #[test]
    fn concurrent_adds_find_the_true_top() {
        let aggregator = std::sync::Arc::new(SlowestTaskAggregator::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for i in 0..500u64 {
                        aggregator.add(slow(t * 500 + i + 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let slowest = aggregator.slowest();
        assert_eq!(slowest.len(), SLOWEST_KEPT);
        assert_eq!(slowest[0].duration_nanos, 2000);
        assert!(slowest.iter().all(|t| t.duration_nanos > 2000 - SLOWEST_KEPT as u64));
    }

    #[test]
    fn clear_empties_all_shards() {
        let aggregator = SlowestTaskAggregator::new();
        for d in 0..50 {
            aggregator.add_to_shard(d % SHARDS, slow(d as u64 + 1));
        }
        aggregator.clear();
        assert!(aggregator.slowest().is_empty());
    }
}
