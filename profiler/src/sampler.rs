use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

use crate::clock::{process_cpu_time, Clock};
use crate::writer::{CounterSeries, Record, TraceQueue};
use crate::BugReporter;

/// Sampling cadence. Fixed so emitted series are stable across runs.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Estimated resource consumption of the build, supplied by the scheduler.
pub trait ResourceEstimator: Send + Sync {
    fn used_cpu(&self) -> Option<f64>;
    fn used_memory_mb(&self) -> Option<f64>;
}

/// Point-in-time metrics for external worker processes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorkerMetrics {
    pub worker_count: u64,
    pub memory_mb: f64,
}

/// Supplies [`WorkerMetrics`]; invoked from the sampler thread only.
pub trait WorkerMetricsCollector: Send + Sync {
    fn collect_metrics(&self) -> WorkerMetrics;
}

pub(crate) struct SamplerOptions {
    pub collect_load_average: bool,
    pub collect_system_network: bool,
    pub collect_pressure_stall: bool,
    pub collect_worker_data: bool,
    pub collect_resource_estimation: bool,
    pub resource_estimator: Option<Arc<dyn ResourceEstimator>>,
    pub worker_metrics: Option<Arc<dyn WorkerMetricsCollector>>,
    pub bug_reporter: Arc<dyn BugReporter>,
    /// Tick cadence; [`SAMPLE_INTERVAL`] outside of tests.
    pub sample_interval: Duration,
}

impl SamplerOptions {
    pub fn new(bug_reporter: Arc<dyn BugReporter>) -> Self {
        SamplerOptions {
            collect_load_average: false,
            collect_system_network: false,
            collect_pressure_stall: false,
            collect_worker_data: false,
            collect_resource_estimation: false,
            resource_estimator: None,
            worker_metrics: None,
            bug_reporter,
            sample_interval: SAMPLE_INTERVAL,
        }
    }
}

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    /// Sleeps for `timeout` unless interrupted; returns whether stop was
    /// requested.
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if *stopped {
            return true;
        }
        self.condvar.wait_for(&mut stopped, timeout);
        *stopped
    }

    fn signal(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }
}

/// What the sampler saw over its lifetime, logged by the facade after the
/// join so the summary is attributed to the stopping thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SamplerSummary {
    pub samples: u64,
    pub average_cores: f64,
}

/// Background thread sampling process and system counters into the trace.
pub(crate) struct ResourceSampler {
    stop: Arc<StopSignal>,
    thread: JoinHandle<SamplerSummary>,
}

impl ResourceSampler {
    pub fn spawn(
        queue: Arc<TraceQueue>,
        clock: Arc<dyn Clock>,
        options: SamplerOptions,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(StopSignal::default());
        let stop_thread = stop.clone();
        let thread = std::thread::Builder::new()
            .name("resource-sampler".to_string())
            .spawn(move || run(queue, clock, options, stop_thread))?;
        Ok(ResourceSampler { stop, thread })
    }

    /// Signals termination and joins; a panicking sampler is contained and
    /// yields no summary.
    pub fn stop(self) -> Option<SamplerSummary> {
        self.stop.signal();
        self.thread.join().ok()
    }
}

/// Tracks one optional sample source. A source that was never readable is
/// silently omitted; one that stops working mid-run is worth a bug report.
struct Source {
    enabled: bool,
    succeeded: bool,
}

impl Source {
    fn new(enabled: bool) -> Self {
        Source {
            enabled,
            succeeded: false,
        }
    }

    fn disable(&mut self, name: &str, bug_reporter: &dyn BugReporter) {
        if self.succeeded {
            let error =
                std::io::Error::other(format!("resource series {name} became unavailable")).into();
            bug_reporter.report(&error);
        } else {
            debug!(source = name, "resource series unavailable");
        }
        self.enabled = false;
    }
}

fn run(
    queue: Arc<TraceQueue>,
    clock: Arc<dyn Clock>,
    options: SamplerOptions,
    stop: Arc<StopSignal>,
) -> SamplerSummary {
    let mut prev_wall_nanos = clock.nanos();
    let mut prev_cpu = process_cpu_time();
    let mut network = options
        .collect_system_network
        .then(NetworkTracker::new)
        .flatten();
    let mut load_average = Source::new(options.collect_load_average);
    let mut pressure = Source::new(options.collect_pressure_stall);

    let mut samples: u64 = 0;
    let mut cpu_total = 0.0f64;

    let interval = options.sample_interval;
    let emit = |name: &str, label: &str, at_nanos: u64, value: f64| {
        queue.send(Record::Counters(CounterSeries {
            name: name.to_string(),
            series_label: label.to_string(),
            start_nanos: at_nanos,
            bucket_nanos: interval.as_nanos() as u64,
            values: vec![value],
        }));
    };

    while !stop.wait(interval) {
        let now_nanos = clock.nanos();
        let wall_nanos = now_nanos.saturating_sub(prev_wall_nanos);
        if wall_nanos == 0 {
            continue;
        }
        prev_wall_nanos = now_nanos;

        let cpu = process_cpu_time();
        let cores = cpu.saturating_sub(prev_cpu).as_nanos() as f64 / wall_nanos as f64;
        prev_cpu = cpu;
        emit("CPU usage (cores)", "cpu", now_nanos, cores);
        samples += 1;
        cpu_total += cores;

        if load_average.enabled {
            match read_load_average() {
                Some(load) => {
                    load_average.succeeded = true;
                    emit("System load average", "load", now_nanos, load);
                }
                None => load_average.disable("load average", &*options.bug_reporter),
            }
        }

        if let Some(tracker) = &mut network {
            if let Some((up_mbps, down_mbps)) = tracker.rates_mbps(wall_nanos) {
                emit("Network Up (Mbps)", "up", now_nanos, up_mbps);
                emit("Network Down (Mbps)", "down", now_nanos, down_mbps);
            } else {
                network = None;
            }
        }

        if pressure.enabled {
            match (
                read_pressure_some_avg10("/proc/pressure/memory"),
                read_pressure_some_avg10("/proc/pressure/io"),
            ) {
                (Some(memory), Some(io)) => {
                    pressure.succeeded = true;
                    emit("Memory pressure (some)", "memory", now_nanos, memory);
                    emit("I/O pressure (some)", "io", now_nanos, io);
                }
                _ => pressure.disable("pressure stall", &*options.bug_reporter),
            }
        }

        if options.collect_worker_data {
            if let Some(collector) = &options.worker_metrics {
                let metrics = collector.collect_metrics();
                emit("Workers memory (MB)", "workers", now_nanos, metrics.memory_mb);
                emit(
                    "Worker count",
                    "workers",
                    now_nanos,
                    metrics.worker_count as f64,
                );
            }
        }

        if options.collect_resource_estimation {
            if let Some(estimator) = &options.resource_estimator {
                if let Some(cpu) = estimator.used_cpu() {
                    emit("Estimated CPU usage (cores)", "estimated cpu", now_nanos, cpu);
                }
                if let Some(memory) = estimator.used_memory_mb() {
                    emit(
                        "Estimated memory usage (MB)",
                        "estimated memory",
                        now_nanos,
                        memory,
                    );
                }
            }
        }
    }

    let average_cores = if samples > 0 { cpu_total / samples as f64 } else { 0.0 };
    debug!(samples, average_cores, "resource sampler finished");
    SamplerSummary {
        samples,
        average_cores,
    }
}

fn read_load_average() -> Option<f64> {
    let text = std::fs::read_to_string("/proc/loadavg").ok()?;
    text.split_whitespace().next()?.parse().ok()
}

/// Reads `avg10` off the `some` line of a PSI file. Absent on kernels
/// without PSI; the series is then omitted.
fn read_pressure_some_avg10(path: &str) -> Option<f64> {
    let text = std::fs::read_to_string(path).ok()?;
    let line = text.lines().find(|line| line.starts_with("some"))?;
    let token = line
        .split_whitespace()
        .find_map(|token| token.strip_prefix("avg10="))?;
    token.parse().ok()
}

/// Totals of `/proc/net/dev` across physical interfaces, for rate deltas.
struct NetworkTracker {
    prev_rx_bytes: u64,
    prev_tx_bytes: u64,
}

impl NetworkTracker {
    fn new() -> Option<Self> {
        let (rx, tx) = read_network_totals()?;
        Some(NetworkTracker {
            prev_rx_bytes: rx,
            prev_tx_bytes: tx,
        })
    }

    fn rates_mbps(&mut self, wall_nanos: u64) -> Option<(f64, f64)> {
        let (rx, tx) = read_network_totals()?;
        let seconds = wall_nanos as f64 / 1e9;
        let up = (tx.saturating_sub(self.prev_tx_bytes)) as f64 * 8.0 / 1e6 / seconds;
        let down = (rx.saturating_sub(self.prev_rx_bytes)) as f64 * 8.0 / 1e6 / seconds;
        self.prev_rx_bytes = rx;
        self.prev_tx_bytes = tx;
        Some((up, down))
    }
}

fn read_network_totals() -> Option<(u64, u64)> {
    let text = std::fs::read_to_string("/proc/net/dev").ok()?;
    parse_network_totals(&text)
}

fn parse_network_totals(text: &str) -> Option<(u64, u64)> {
    let mut rx_total = 0u64;
    let mut tx_total = 0u64;
    let mut seen = false;
    for line in text.lines().skip(2) {
        let (name, rest) = match line.split_once(':') {
            Some(parts) => parts,
            None => continue,
        };
        if name.trim() == "lo" {
            continue;
        }
        let fields: Vec<&str> = rest.split_whitespace().collect();
        if fields.len() < 9 {
            continue;
        }
        rx_total += fields[0].parse::<u64>().ok()?;
        tx_total += fields[8].parse::<u64>().ok()?;
        seen = true;
    }
    seen.then_some((rx_total, tx_total))
}
