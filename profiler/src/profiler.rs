use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

use crate::clock::{current_thread_id, process_cpu_time, Clock, MonotonicClock};
use crate::future::{LaneCompletion, ProfiledFuture};
use crate::histogram::{HistogramSnapshot, TaskHistograms};
use crate::lane::{LaneAllocator, LaneKind};
use crate::sampler::{ResourceEstimator, ResourceSampler, SamplerOptions, WorkerMetricsCollector};
use crate::slowest::{SlowTask, SlowestTaskAggregator};
use crate::task::{ActionData, ProfilePhase, TaskEvent, TaskKind, TaskKindSet};
use crate::time_series::TimeSeries;
use crate::writer::{CounterSeries, Record, TraceFormat, TraceQueue, TraceWriter, WriterSettings};
use crate::{BugReporter, LogBugReporter, ProfilerError, Result};

/// Width of the action-count and action-cache-count buckets.
const ACTION_COUNT_BUCKET_DURATION: Duration = Duration::from_millis(200);

/// Info events with exactly this description count as actions; a historical
/// coupling with the input-discovery step, preserved verbatim.
const DISCOVER_INPUTS_DESCRIPTION: &str = "discoverInputs";

/// Notified on phase boundaries; the hook the memory profiler hangs off of.
pub trait PhaseObserver: Send + Sync {
    fn phase_started(&self, phase: ProfilePhase);
}

/// Plain-data profiling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Which task kinds are recorded. Kinds outside the set still feed
    /// histograms through the explicit logging calls.
    pub profiled: Vec<TaskKind>,
    pub format: TraceFormat,
    /// Identifies the build tree in the trace header.
    pub output_base: Option<String>,
    /// Identifies the invocation in the trace header.
    pub build_id: Option<String>,
    /// Record every completed region, ignoring per-kind minimum durations.
    pub record_all_durations: bool,
    /// Merge runs of short events to shrink the output.
    pub slim_profile: bool,
    pub include_primary_output: bool,
    pub include_target_label: bool,
    pub collect_task_histograms: bool,
    pub collect_worker_data: bool,
    pub collect_load_average: bool,
    pub collect_system_network: bool,
    pub collect_pressure_stall: bool,
    pub collect_resource_estimation: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        ProfileConfig {
            profiled: TaskKind::ALL.to_vec(),
            format: TraceFormat::default(),
            output_base: None,
            build_id: None,
            record_all_durations: false,
            slim_profile: false,
            include_primary_output: false,
            include_target_label: false,
            collect_task_histograms: true,
            collect_worker_data: false,
            collect_load_average: false,
            collect_system_network: false,
            collect_pressure_stall: false,
            collect_resource_estimation: false,
        }
    }
}

/// Configuration plus injected collaborators handed to [`Profiler::start`].
pub struct StartOptions {
    pub config: ProfileConfig,
    pub clock: Arc<dyn Clock>,
    /// Profile epoch, in `clock` nanos; read from the clock when absent.
    /// Must be nonzero, since zero encodes "inactive".
    pub start_nanos: Option<u64>,
    pub resource_estimator: Option<Arc<dyn ResourceEstimator>>,
    pub worker_metrics: Option<Arc<dyn WorkerMetricsCollector>>,
    pub bug_reporter: Arc<dyn BugReporter>,
    pub phase_observer: Option<Arc<dyn PhaseObserver>>,
}

impl StartOptions {
    pub fn new(config: ProfileConfig) -> Self {
        StartOptions {
            config,
            ..StartOptions::default()
        }
    }
}

impl Default for StartOptions {
    fn default() -> Self {
        StartOptions {
            config: ProfileConfig::default(),
            clock: Arc::new(MonotonicClock),
            start_nanos: None,
            resource_estimator: None,
            worker_metrics: None,
            bug_reporter: Arc::new(LogBugReporter),
            phase_observer: None,
        }
    }
}

struct ClockSlot(Arc<dyn Clock>);

#[derive(Default)]
struct State {
    action_counts: Option<TimeSeries>,
    action_cache_counts: Option<TimeSeries>,
    counts_start_nanos: u64,
    profile_cpu_start: Option<Duration>,
    writer: Option<TraceWriter>,
    sampler: Option<ResourceSampler>,
    phase_observer: Option<Arc<dyn PhaseObserver>>,
}

struct Inner {
    /// Nonzero iff the profiler is active.
    profile_start_nanos: AtomicU64,
    /// Bits of the profiled [`TaskKindSet`], copied immutably at start.
    profiled: AtomicU32,
    record_all_durations: AtomicBool,
    collect_task_histograms: AtomicBool,
    include_primary_output: AtomicBool,
    include_target_label: AtomicBool,
    clock: ArcSwapOption<ClockSlot>,
    /// Live writer queue; `None` once stop begins. Producers load it once
    /// per event and silently drop the enqueue when it is gone.
    queue: ArcSwapOption<TraceQueue>,
    histograms: ArcSwapOption<TaskHistograms>,
    slowest: Vec<Option<SlowestTaskAggregator>>,
    lanes: LaneAllocator,
    state: Mutex<State>,
}

/// The profiler facade. Cheap to clone; all clones share one recorder.
///
/// Most callers go through [`Profiler::global`] since instrumentation points
/// live in code that cannot thread a profiler parameter around. Every
/// operation is safe, and silent, while the profiler is inactive.
#[derive(Clone)]
pub struct Profiler {
    inner: Arc<Inner>,
}

impl Default for Profiler {
    fn default() -> Self {
        Profiler::new()
    }
}

impl Profiler {
    pub fn new() -> Profiler {
        Profiler {
            inner: Arc::new(Inner {
                profile_start_nanos: AtomicU64::new(0),
                profiled: AtomicU32::new(0),
                record_all_durations: AtomicBool::new(false),
                collect_task_histograms: AtomicBool::new(false),
                include_primary_output: AtomicBool::new(false),
                include_target_label: AtomicBool::new(false),
                clock: ArcSwapOption::empty(),
                queue: ArcSwapOption::empty(),
                histograms: ArcSwapOption::empty(),
                slowest: TaskKind::ALL
                    .iter()
                    .map(|kind| {
                        kind.collects_slowest_instances()
                            .then(SlowestTaskAggregator::new)
                    })
                    .collect(),
                lanes: LaneAllocator::new(),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// The process-wide instance, inactive until started.
    pub fn global() -> &'static Profiler {
        static GLOBAL: OnceLock<Profiler> = OnceLock::new();
        GLOBAL.get_or_init(Profiler::new)
    }

    /// Starts profiling into `sink`. Fails if already active; everything the
    /// previous session allocated has been released by then.
    pub fn start(&self, sink: Box<dyn Write + Send>, options: StartOptions) -> Result<()> {
        let mut state = self.inner.state.lock();
        if self.is_active() {
            return Err(ProfilerError::AlreadyActive);
        }
        let StartOptions {
            config,
            clock,
            start_nanos,
            resource_estimator,
            worker_metrics,
            bug_reporter,
            phase_observer,
        } = options;
        let start_nanos = start_nanos.unwrap_or_else(|| clock.nanos());
        assert!(start_nanos != 0, "profile start time must be nonzero");

        let writer = TraceWriter::spawn(
            sink,
            WriterSettings {
                profile_start_nanos: start_nanos,
                format: config.format,
                slim_profile: config.slim_profile,
                output_base: config.output_base.clone(),
                build_id: config.build_id.clone(),
            },
            bug_reporter.clone(),
        )?;
        let queue = writer.queue();

        self.inner
            .profiled
            .store(TaskKindSet::of(&config.profiled).bits(), Ordering::Release);
        self.inner
            .record_all_durations
            .store(config.record_all_durations, Ordering::Release);
        self.inner
            .collect_task_histograms
            .store(config.collect_task_histograms, Ordering::Release);
        self.inner
            .include_primary_output
            .store(config.include_primary_output, Ordering::Release);
        self.inner
            .include_target_label
            .store(config.include_target_label, Ordering::Release);
        self.inner.histograms.store(Some(Arc::new(TaskHistograms::new())));
        self.inner.clock.store(Some(Arc::new(ClockSlot(clock.clone()))));
        self.inner.queue.store(Some(queue.clone()));

        state.action_counts = Some(TimeSeries::new(start_nanos, ACTION_COUNT_BUCKET_DURATION));
        state.action_cache_counts =
            Some(TimeSeries::new(start_nanos, ACTION_COUNT_BUCKET_DURATION));
        state.counts_start_nanos = start_nanos;
        state.profile_cpu_start = Some(process_cpu_time());
        state.writer = Some(writer);
        state.phase_observer = phase_observer;

        // Sampler records are dropped unless the profiler is already active.
        self.inner
            .profile_start_nanos
            .store(start_nanos, Ordering::Release);

        let mut sampler_options = SamplerOptions::new(bug_reporter);
        sampler_options.collect_load_average = config.collect_load_average;
        sampler_options.collect_system_network = config.collect_system_network;
        sampler_options.collect_pressure_stall = config.collect_pressure_stall;
        sampler_options.collect_worker_data = config.collect_worker_data;
        sampler_options.collect_resource_estimation = config.collect_resource_estimation;
        sampler_options.resource_estimator = resource_estimator;
        sampler_options.worker_metrics = worker_metrics;
        match ResourceSampler::spawn(queue, clock, sampler_options) {
            Ok(sampler) => state.sampler = Some(sampler),
            Err(error) => {
                self.inner.profile_start_nanos.store(0, Ordering::Release);
                self.inner.queue.store(None);
                self.inner.histograms.store(None);
                if let Some(writer) = state.writer.take() {
                    let _ = writer.shutdown();
                }
                return Err(error.into());
            }
        }
        debug!("profiler started");
        Ok(())
    }

    /// Stops profiling, drains both background threads and finalizes the
    /// trace. A no-op when already inactive.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if !self.is_active() {
            return Ok(());
        }

        self.collect_action_counts(&mut state);

        // The info events logged below must stay outside the action-counting
        // criteria; counted kinds retake the state lock held here.
        if let Some(sampler) = state.sampler.take() {
            if let Some(summary) = sampler.stop() {
                self.log_event_now(
                    TaskKind::Info,
                    &format!(
                        "collected {} resource samples, {:.2} avg cores",
                        summary.samples, summary.average_cores
                    ),
                );
            }
        }

        self.log_event_now(TaskKind::Info, "Finishing");

        self.inner.queue.store(None);
        let writer_result = match state.writer.take() {
            Some(writer) => writer.shutdown().map(drop),
            None => Ok(()),
        };

        self.inner.histograms.store(None);
        for aggregator in self.inner.slowest.iter().flatten() {
            aggregator.clear();
        }
        self.inner.profile_start_nanos.store(0, Ordering::Release);
        state.action_counts = None;
        state.action_cache_counts = None;
        state.profile_cpu_start = None;
        state.phase_observer = None;
        debug!("profiler stopped");
        writer_result
    }

    fn collect_action_counts(&self, state: &mut State) {
        let Some(queue) = self.inner.queue.load_full() else {
            return;
        };
        let bucket_nanos = ACTION_COUNT_BUCKET_DURATION.as_nanos() as u64;
        let start_nanos = state.counts_start_nanos;
        let elapsed = self.clock_nanos().saturating_sub(start_nanos);
        let len = elapsed.div_ceil(bucket_nanos) as usize;
        for (kind, series) in [
            (TaskKind::ActionCounts, state.action_counts.take()),
            (TaskKind::ActionCacheCounts, state.action_cache_counts.take()),
        ] {
            if let Some(series) = series {
                queue.send(Record::Counters(CounterSeries {
                    name: kind.description().to_string(),
                    series_label: kind.counter_series_label().to_string(),
                    start_nanos,
                    bucket_nanos,
                    values: series.to_values(len),
                }));
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.profile_start_nanos.load(Ordering::Acquire) != 0
    }

    pub fn is_profiling(&self, kind: TaskKind) -> bool {
        TaskKindSet::from_bits(self.inner.profiled.load(Ordering::Relaxed)).contains(kind)
    }

    /// Current clock nanos while active.
    pub fn nanos_maybe(&self) -> Option<u64> {
        self.is_active().then(|| self.clock_nanos())
    }

    /// Wall time since the profile started, while active.
    pub fn elapsed_maybe(&self) -> Option<Duration> {
        let start = self.inner.profile_start_nanos.load(Ordering::Acquire);
        (start != 0).then(|| Duration::from_nanos(self.clock_nanos().saturating_sub(start)))
    }

    /// Process CPU time since the profile started, while active.
    pub fn process_cpu_maybe(&self) -> Option<Duration> {
        if !self.is_active() {
            return None;
        }
        let start = self.inner.state.lock().profile_cpu_start?;
        Some(process_cpu_time().saturating_sub(start))
    }

    fn clock_nanos(&self) -> u64 {
        match &*self.inner.clock.load() {
            Some(slot) => slot.0.nanos(),
            None => 0,
        }
    }

    /// Records an already-completed task that ends now.
    pub fn log_simple_task(&self, start_nanos: u64, kind: TaskKind, description: impl Into<String>) {
        let duration = self.clock_nanos().saturating_sub(start_nanos);
        self.log_task(
            current_thread_id(),
            start_nanos,
            duration,
            kind,
            description.into(),
            None,
        );
    }

    /// Records an already-completed task with explicit start and stop times,
    /// both read from the profiler's clock.
    pub fn log_simple_task_between(
        &self,
        start_nanos: u64,
        stop_nanos: u64,
        kind: TaskKind,
        description: impl Into<String>,
    ) {
        self.log_task(
            current_thread_id(),
            start_nanos,
            stop_nanos.saturating_sub(start_nanos),
            kind,
            description.into(),
            None,
        );
    }

    /// Records an already-completed task with an explicit duration.
    pub fn log_simple_task_duration(
        &self,
        start_nanos: u64,
        duration: Duration,
        kind: TaskKind,
        description: impl Into<String>,
    ) {
        self.log_task(
            current_thread_id(),
            start_nanos,
            duration.as_nanos() as u64,
            kind,
            description.into(),
            None,
        );
    }

    /// Records an instantaneous event at the given time.
    pub fn log_event_at(&self, at_nanos: u64, kind: TaskKind, description: impl Into<String>) {
        self.log_task(current_thread_id(), at_nanos, 0, kind, description.into(), None);
    }

    fn log_event_now(&self, kind: TaskKind, description: &str) {
        self.log_event_at(self.clock_nanos(), kind, description);
    }

    /// Starts a region; dropping the returned guard records its completion.
    /// Returns an inert guard when inactive or the kind is not profiled.
    pub fn profile(&self, kind: TaskKind, description: impl Into<String>) -> TaskGuard {
        if !(self.is_active() && self.is_profiling(kind)) {
            return TaskGuard::noop();
        }
        self.profile_on_lane(current_thread_id(), kind, description.into())
    }

    /// Like [`Profiler::profile`], but the description is only computed when
    /// the region is actually recorded.
    pub fn profile_with(
        &self,
        kind: TaskKind,
        description: impl FnOnce() -> String,
    ) -> TaskGuard {
        if !(self.is_active() && self.is_profiling(kind)) {
            return TaskGuard::noop();
        }
        self.profile_on_lane(current_thread_id(), kind, description())
    }

    /// Convenience for [`TaskKind::Info`] regions.
    pub fn profile_info(&self, description: impl Into<String>) -> TaskGuard {
        self.profile(TaskKind::Info, description)
    }

    pub(crate) fn profile_on_lane(
        &self,
        lane_id: u64,
        kind: TaskKind,
        description: String,
    ) -> TaskGuard {
        if !(self.is_active() && self.is_profiling(kind)) {
            return TaskGuard::noop();
        }
        assert!(!description.is_empty(), "task description must not be empty");
        TaskGuard {
            inner: Some(GuardState {
                profiler: self.clone(),
                lane_id,
                start_nanos: self.clock_nanos(),
                kind,
                description,
                action: None,
            }),
        }
    }

    /// Starts an action region carrying mnemonic, primary output and target
    /// label; the output and label are retained only when the corresponding
    /// include flags were set at start.
    pub fn profile_action(
        &self,
        kind: TaskKind,
        mnemonic: Option<String>,
        description: impl Into<String>,
        primary_output: Option<String>,
        target_label: Option<String>,
    ) -> TaskGuard {
        if !(self.is_active() && self.is_profiling(kind)) {
            return TaskGuard::noop();
        }
        let description = description.into();
        assert!(!description.is_empty(), "task description must not be empty");
        let action = ActionData {
            mnemonic,
            primary_output: primary_output
                .filter(|_| self.inner.include_primary_output.load(Ordering::Relaxed)),
            target_label: target_label
                .filter(|_| self.inner.include_target_label.load(Ordering::Relaxed)),
        };
        TaskGuard {
            inner: Some(GuardState {
                profiler: self.clone(),
                lane_id: current_thread_id(),
                start_nanos: self.clock_nanos(),
                kind,
                description,
                action: (!action.is_empty()).then_some(action),
            }),
        }
    }

    /// Builds a future on its own synthetic lane. The builder receives a
    /// [`ScopedProfiler`] recording onto that lane; completion (or drop) of
    /// the returned future records the whole task and recycles the lane.
    pub fn profile_future<F, B>(
        &self,
        kind: &LaneKind,
        description: impl Into<String>,
        build: B,
    ) -> ProfiledFuture<F>
    where
        F: Future,
        B: FnOnce(ScopedProfiler) -> F,
    {
        if !(self.is_active() && self.is_profiling(TaskKind::Info)) {
            return ProfiledFuture::inert(build(ScopedProfiler::inactive()));
        }
        let description = description.into();
        assert!(!description.is_empty(), "task description must not be empty");
        let (lane_id, metadata) = self.inner.lanes.acquire(kind);
        if let Some(metadata) = metadata {
            if let Some(queue) = self.inner.queue.load_full() {
                queue.send(Record::Lane(metadata));
            }
        }
        let start_nanos = self.clock_nanos();
        let scoped = ScopedProfiler {
            profiler: Some(self.clone()),
            lane_id,
        };
        let inner = build(scoped);
        ProfiledFuture::recording(
            inner,
            LaneCompletion {
                profiler: self.clone(),
                kind: kind.clone(),
                lane_id,
                start_nanos,
                description,
            },
        )
    }

    pub(crate) fn finish_lane(
        &self,
        kind: &LaneKind,
        lane_id: u64,
        start_nanos: u64,
        description: String,
    ) {
        if self.is_active() {
            let duration = self.clock_nanos().saturating_sub(start_nanos);
            self.record_task(TaskEvent {
                lane_id,
                start_nanos,
                duration_nanos: duration,
                kind: TaskKind::Info,
                description,
                action: None,
            });
        }
        self.inner.lanes.release(kind, lane_id);
    }

    /// Announces a phase boundary: notifies the observer, then records a
    /// phase marker event.
    pub fn mark_phase(&self, phase: ProfilePhase) {
        let observer = self.inner.state.lock().phase_observer.clone();
        if let Some(observer) = observer {
            observer.phase_started(phase);
        }
        if self.is_active() && self.is_profiling(TaskKind::Phase) {
            self.log_event_now(TaskKind::Phase, phase.description());
        }
    }

    /// The slowest recorded instances across all kinds that collect them.
    /// Meaningful only while active; cleared at stop.
    pub fn slowest_tasks(&self) -> Vec<SlowTask> {
        self.inner
            .slowest
            .iter()
            .flatten()
            .flat_map(SlowestTaskAggregator::slowest)
            .collect()
    }

    /// Snapshots of all task histograms; empty while inactive.
    pub fn task_histograms(&self) -> Vec<HistogramSnapshot> {
        if !self.is_active() {
            return Vec::new();
        }
        match self.inner.histograms.load_full() {
            Some(histograms) => histograms.snapshot_all(),
            None => Vec::new(),
        }
    }

    /// Enqueues pre-built counter series, bypassing task recording.
    pub fn log_counters(
        &self,
        series: Vec<(TaskKind, Vec<f64>)>,
        start_nanos: u64,
        bucket_duration: Duration,
    ) {
        if !self.is_active() {
            return;
        }
        let Some(queue) = self.inner.queue.load_full() else {
            return;
        };
        for (kind, values) in series {
            queue.send(Record::Counters(CounterSeries {
                name: kind.description().to_string(),
                series_label: kind.counter_series_label().to_string(),
                start_nanos,
                bucket_nanos: bucket_duration.as_nanos() as u64,
                values,
            }));
        }
    }

    fn log_task(
        &self,
        lane_id: u64,
        start_nanos: u64,
        duration_nanos: u64,
        kind: TaskKind,
        description: String,
        action: Option<ActionData>,
    ) {
        assert!(!description.is_empty(), "task description must not be empty");

        if self.inner.collect_task_histograms.load(Ordering::Relaxed) {
            if let Some(histograms) = self.inner.histograms.load_full() {
                histograms.add(kind, duration_nanos / 1_000_000, &description);
            }
        }

        if !(self.is_active() && self.is_profiling(kind)) {
            return;
        }
        if self.should_record(kind, duration_nanos) {
            self.record_task(TaskEvent {
                lane_id,
                start_nanos,
                duration_nanos,
                kind,
                description,
                action,
            });
        }
    }

    fn should_record(&self, kind: TaskKind, duration_nanos: u64) -> bool {
        self.inner.record_all_durations.load(Ordering::Relaxed)
            || duration_nanos >= kind.min_duration().as_nanos() as u64
    }

    fn record_task(&self, event: TaskEvent) {
        let end_nanos = event.start_nanos + event.duration_nanos;
        if count_action(event.kind, &event.description) {
            let mut state = self.inner.state.lock();
            if let Some(series) = &mut state.action_counts {
                series.add_range(event.start_nanos, end_nanos);
            }
        }
        if event.kind == TaskKind::ActionCheck {
            let mut state = self.inner.state.lock();
            if let Some(series) = &mut state.action_cache_counts {
                series.add_range(event.start_nanos, end_nanos);
            }
        }
        if let Some(aggregator) = &self.inner.slowest[event.kind.index()] {
            aggregator.add(SlowTask::from(&event));
        }
        if let Some(queue) = self.inner.queue.load_full() {
            queue.send(Record::Task(event));
        }
    }

    fn complete_task(
        &self,
        lane_id: u64,
        start_nanos: u64,
        kind: TaskKind,
        description: String,
        action: Option<ActionData>,
    ) {
        // Stopped between region start and release: ignore silently.
        if !self.is_active() {
            return;
        }
        let duration = self.clock_nanos().saturating_sub(start_nanos);
        self.log_task(lane_id, start_nanos, duration, kind, description, action);
    }
}

fn count_action(kind: TaskKind, description: &str) -> bool {
    kind == TaskKind::Action
        || (kind == TaskKind::Info && description == DISCOVER_INPUTS_DESCRIPTION)
}

struct GuardState {
    profiler: Profiler,
    lane_id: u64,
    start_nanos: u64,
    kind: TaskKind,
    description: String,
    action: Option<ActionData>,
}

/// Single-shot region handle; dropping it records the completion. The inert
/// variant, returned while the profiler is disabled, carries no state.
#[must_use = "dropping the guard ends the profiled region"]
pub struct TaskGuard {
    inner: Option<GuardState>,
}

impl TaskGuard {
    pub(crate) fn noop() -> TaskGuard {
        TaskGuard { inner: None }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let Some(guard) = self.inner.take() else {
            return;
        };
        let GuardState {
            profiler,
            lane_id,
            start_nanos,
            kind,
            description,
            action,
        } = guard;
        profiler.complete_task(lane_id, start_nanos, kind, description, action);
    }
}

/// Profiler view bound to one synthetic lane, handed to async task builders.
/// The inactive form records nothing.
pub struct ScopedProfiler {
    profiler: Option<Profiler>,
    lane_id: u64,
}

impl ScopedProfiler {
    pub(crate) fn inactive() -> ScopedProfiler {
        ScopedProfiler {
            profiler: None,
            lane_id: 0,
        }
    }

    pub fn lane_id(&self) -> u64 {
        self.lane_id
    }

    /// Starts an info region attributed to this lane.
    pub fn profile(&self, description: impl Into<String>) -> TaskGuard {
        match &self.profiler {
            Some(profiler) => {
                profiler.profile_on_lane(self.lane_id, TaskKind::Info, description.into())
            }
            None => TaskGuard::noop(),
        }
    }
}
