use profiler::{
    LaneKind, ManualClock, ProfileConfig, Profiler, StartOptions, TaskKind, TraceFormat,
    LANE_ID_BASE,
};
use rstest::{fixture, rstest};
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;

const PROFILE_START: u64 = 1_000_000;
const BUCKET_NANOS: u64 = 200_000_000;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .init();
    });
}

struct TestSetup {
    _temp_dir: TempDir,
    trace_path: PathBuf,
    clock: Arc<ManualClock>,
    profiler: Profiler,
}

impl TestSetup {
    fn start(config: ProfileConfig) -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("create temp dir");
        let trace_path = temp_dir.path().join("command.profile");
        let clock = Arc::new(ManualClock::new(PROFILE_START));
        let profiler = Profiler::new();
        let sink = fs::File::create(&trace_path).expect("create trace file");
        let options = StartOptions {
            config,
            clock: clock.clone(),
            ..StartOptions::default()
        };
        profiler.start(Box::new(sink), options).expect("start profiler");
        TestSetup {
            _temp_dir: temp_dir,
            trace_path,
            clock,
            profiler,
        }
    }

    fn stop_and_read(&self) -> Vec<Value> {
        self.profiler.stop().expect("stop profiler");
        let bytes = fs::read(&self.trace_path).expect("read trace");
        serde_json::from_slice(&bytes).expect("trace is a valid JSON array")
    }
}

#[fixture]
fn setup() -> TestSetup {
    TestSetup::start(ProfileConfig::default())
}

fn complete_events<'a>(events: &'a [Value], name: &str) -> Vec<&'a Value> {
    events
        .iter()
        .filter(|e| e["ph"] == "X" && e["name"] == name)
        .collect()
}

#[rstest]
fn short_region_truncates_to_zero_microseconds(setup: TestSetup) {
    // 1000 ns in, a 500 ns region: both land below the microsecond grid.
    setup.clock.set(PROFILE_START + 1_000);
    let guard = setup.profiler.profile(TaskKind::Info, "x");
    setup.clock.set(PROFILE_START + 1_500);
    drop(guard);

    let events = setup.stop_and_read();
    let regions = complete_events(&events, "x");
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0]["ts"], 1);
    assert_eq!(regions[0]["dur"], 0);
    assert_eq!(regions[0]["cat"], "general information");
    assert_eq!(regions[0]["pid"], 1);
}

#[rstest]
fn emitted_events_round_trip_their_fields(setup: TestSetup) {
    setup
        .profiler
        .log_simple_task_between(
            PROFILE_START + 2_000_000,
            PROFILE_START + 5_500_000,
            TaskKind::ActionCheck,
            "checking deps",
        );

    let events = setup.stop_and_read();
    let checks = complete_events(&events, "checking deps");
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0]["cat"], "action dependency checking");
    assert_eq!(checks[0]["ts"], 2_000);
    assert_eq!(checks[0]["dur"], 3_500);
}

#[test]
fn concurrent_actions_keep_the_true_top_thirty() {
    let setup = TestSetup::start(ProfileConfig {
        record_all_durations: true,
        ..ProfileConfig::default()
    });

    let mut handles = Vec::new();
    for thread_index in 0..2u64 {
        let profiler = setup.profiler.clone();
        handles.push(std::thread::spawn(move || {
            // Deterministic xorshift; durations spread over 0..10ms.
            let mut state = 0x9e3779b9u64 + thread_index;
            let mut durations = Vec::with_capacity(1000);
            for i in 0..1000u64 {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let duration = state % 10_000_000;
                durations.push(duration);
                profiler.log_simple_task_duration(
                    PROFILE_START + i,
                    Duration::from_nanos(duration),
                    TaskKind::Action,
                    format!("action {thread_index}/{i}"),
                );
            }
            durations
        }));
    }
    let mut all_durations: Vec<u64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    all_durations.sort_unstable_by(|a, b| b.cmp(a));

    let slowest = setup.profiler.slowest_tasks();
    let mut recorded: Vec<u64> = slowest
        .iter()
        .filter(|task| task.kind == TaskKind::Action)
        .map(|task| task.duration_nanos)
        .collect();
    recorded.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(recorded.len(), 30);
    assert_eq!(recorded, all_durations[..30].to_vec());

    setup.stop_and_read();
}

#[rstest]
fn async_lane_gets_metadata_and_recycles(setup: TestSetup) {
    let lane_kind = LaneKind::new("remote-fetcher-{}");

    let first = setup.profiler.profile_future(&lane_kind, "fetch a", |scoped| {
        let clock = setup.clock.clone();
        async move {
            clock.advance(Duration::from_millis(7));
            scoped.lane_id()
        }
    });
    let first_lane = block_on_ready(first);
    assert!(first_lane >= LANE_ID_BASE);

    // The first lane completed, so the next acquisition reuses its id.
    let second = setup.profiler.profile_future(&lane_kind, "fetch b", |scoped| async move {
        scoped.lane_id()
    });
    assert_eq!(block_on_ready(second), first_lane);

    let events = setup.stop_and_read();
    let fetch = complete_events(&events, "fetch a");
    assert_eq!(fetch.len(), 1);
    assert_eq!(fetch[0]["tid"], first_lane);
    assert_eq!(fetch[0]["dur"], 7_000);

    let names: Vec<&Value> = events
        .iter()
        .filter(|e| e["name"] == "thread_name")
        .collect();
    assert_eq!(names.len(), 1, "recycled lanes are named once");
    assert_eq!(names[0]["args"]["name"], "remote-fetcher-0");
    assert_eq!(names[0]["tid"], first_lane);
    assert!(events
        .iter()
        .any(|e| e["name"] == "thread_sort_index" && e["args"]["sort_index"] == 1_000_000));
}

#[rstest]
fn immediate_stop_produces_a_wellformed_trace(setup: TestSetup) {
    setup.clock.advance(Duration::from_millis(1));
    let events = setup.stop_and_read();
    // Near-empty: the finishing marker, the sampler summary, and densified
    // (single-bucket) counter series are all that may appear.
    assert!(events.iter().any(|e| e["name"] == "Finishing"));
    for event in &events {
        let ph = event["ph"].as_str().unwrap();
        assert!(matches!(ph, "i" | "C" | "M"), "unexpected event {event}");
    }
}

#[rstest]
fn action_counts_are_bucketed_by_overlap(setup: TestSetup) {
    let t0 = PROFILE_START;
    // One action covering bucket 0 fully and half of bucket 1.
    setup.profiler.log_simple_task_between(
        t0,
        t0 + BUCKET_NANOS + BUCKET_NANOS / 2,
        TaskKind::Action,
        "build lib",
    );
    // Input discovery counts as an action; half of bucket 2.
    setup.profiler.log_simple_task_between(
        t0 + 2 * BUCKET_NANOS,
        t0 + 2 * BUCKET_NANOS + BUCKET_NANOS / 2,
        TaskKind::Info,
        "discoverInputs",
    );
    // A cache check spanning a fifth of bucket 1.
    setup.profiler.log_simple_task_between(
        t0 + BUCKET_NANOS,
        t0 + BUCKET_NANOS + BUCKET_NANOS / 5,
        TaskKind::ActionCheck,
        "cache probe",
    );

    setup.clock.set(t0 + 2 * BUCKET_NANOS + BUCKET_NANOS / 2);
    let events = setup.stop_and_read();

    let action_counts: Vec<f64> = events
        .iter()
        .filter(|e| e["ph"] == "C" && e["name"] == "action count")
        .map(|e| e["args"]["action"].as_f64().unwrap())
        .collect();
    // ceil(500ms / 200ms) = 3 buckets.
    assert_eq!(action_counts.len(), 3);
    assert!((action_counts[0] - 1.0).abs() < 1e-9);
    assert!((action_counts[1] - 0.5).abs() < 1e-9);
    assert!((action_counts[2] - 0.5).abs() < 1e-9);

    let cache_counts: Vec<f64> = events
        .iter()
        .filter(|e| e["ph"] == "C" && e["name"] == "action cache count")
        .map(|e| e["args"]["local action cache"].as_f64().unwrap())
        .collect();
    assert_eq!(cache_counts.len(), 3);
    assert!((cache_counts[0]).abs() < 1e-9);
    assert!((cache_counts[1] - 0.2).abs() < 1e-9);
    assert!((cache_counts[2]).abs() < 1e-9);
}

fn run_workload(format: TraceFormat) -> Vec<u8> {
    let temp_dir = TempDir::new().unwrap();
    let trace_path = temp_dir.path().join("trace.profile");
    let clock = Arc::new(ManualClock::new(PROFILE_START));
    let profiler = Profiler::new();
    let sink = fs::File::create(&trace_path).unwrap();
    let options = StartOptions {
        config: ProfileConfig {
            format,
            build_id: Some("workload".to_string()),
            ..ProfileConfig::default()
        },
        clock: clock.clone(),
        ..StartOptions::default()
    };
    profiler.start(Box::new(sink), options).unwrap();

    for i in 0..10u64 {
        let guard = profiler.profile(TaskKind::Action, format!("step {i}"));
        clock.advance(Duration::from_millis(3));
        drop(guard);
    }
    clock.set(PROFILE_START + 100_000_000);
    profiler.stop().unwrap();
    fs::read(&trace_path).unwrap()
}

#[test]
fn compressed_trace_matches_the_plain_baseline() {
    let plain = run_workload(TraceFormat::Json);
    let compressed = run_workload(TraceFormat::JsonGzip);

    assert_eq!(compressed[..2], [0x1f, 0x8b], "gzip magic bytes");
    let mut decoded = Vec::new();
    flate2::read::GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut decoded)
        .unwrap();

    let plain_events: Vec<Value> = serde_json::from_slice(&plain).unwrap();
    let decoded_events: Vec<Value> = serde_json::from_slice(&decoded).unwrap();
    assert_eq!(normalized(plain_events), normalized(decoded_events));
}

/// Drops wall-clock-dependent sampler output; everything else in the two
/// workload runs is driven by the manual clock and must match exactly.
fn normalized(events: Vec<Value>) -> Vec<Value> {
    events
        .into_iter()
        .filter(|e| {
            let name = e["name"].as_str().unwrap_or("");
            name != "CPU usage (cores)" && !name.starts_with("collected ")
        })
        .collect()
}

#[test]
fn global_profiler_is_shared_and_initially_inactive() {
    let a = Profiler::global();
    let b = Profiler::global();
    assert!(std::ptr::eq(a, b));
    assert!(!a.is_active());
    // Recording through the global instance while inactive is silent.
    let _guard = a.profile(TaskKind::Info, "nothing");
}

fn block_on_ready<F: std::future::Future>(future: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        |_| RawWaker::new(std::ptr::null(), &VTABLE),
        |_| {},
        |_| {},
        |_| {},
    );
    let waker = unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) };
    let mut cx = Context::from_waker(&waker);
    let mut future = std::pin::pin!(future);
    match future.as_mut().poll(&mut cx) {
        Poll::Ready(output) => output,
        Poll::Pending => panic!("future was not ready"),
    }
}
