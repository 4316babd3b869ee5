use crossbeam_channel::{Receiver, Sender};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

use chrome_trace::{
    CompleteEvent, CounterEvent, InstantEvent, MetadataEvent, MetadataName, Phase, StreamWriter,
};

use crate::lane::LaneMetadata;
use crate::task::{TaskEvent, TaskKind};
use crate::{BugReporter, ProfilerError};

/// On-disk trace representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TraceFormat {
    /// Plain Chrome Trace JSON array.
    #[default]
    Json,
    /// The same array wrapped in a gzip stream.
    JsonGzip,
}

/// Reserved `tid` under which all critical path components are drawn; the
/// real lane id moves into `args.tid`.
pub const CRITICAL_PATH_LANE_ID: u64 = 0;

/// Slim profiles merge runs of same-lane, same-kind events that are each
/// shorter than this and separated by less than this.
const SLIM_MERGE_THRESHOLD_NANOS: u64 = 10_000_000;

/// A densified counter series handed to the writer as one record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CounterSeries {
    /// Display name of the counter graph.
    pub name: String,
    /// Key under which values appear in the event args.
    pub series_label: String,
    /// Absolute clock time of the first bucket.
    pub start_nanos: u64,
    pub bucket_nanos: u64,
    pub values: Vec<f64>,
}

/// One unit of work for the writer thread.
#[derive(Debug)]
pub(crate) enum Record {
    Task(TaskEvent),
    Counters(CounterSeries),
    Lane(LaneMetadata),
    /// Termination sentinel; records enqueued by racing producers after it
    /// are still drained before the writer exits.
    Shutdown,
}

/// Producer-side handle to the writer queue. Enqueueing never blocks.
pub(crate) struct TraceQueue {
    sender: Sender<Record>,
}

impl TraceQueue {
    pub fn send(&self, record: Record) {
        // The channel is unbounded; the only failure is a disconnected
        // receiver during teardown, in which case the record is dropped.
        let _ = self.sender.send(record);
    }
}

enum TraceSink {
    Plain(BufWriter<Box<dyn Write + Send>>),
    Gzip(BufWriter<GzEncoder<Box<dyn Write + Send>>>),
}

impl TraceSink {
    fn new(sink: Box<dyn Write + Send>, format: TraceFormat) -> Self {
        match format {
            TraceFormat::Json => TraceSink::Plain(BufWriter::new(sink)),
            TraceFormat::JsonGzip => {
                TraceSink::Gzip(BufWriter::new(GzEncoder::new(sink, Compression::default())))
            }
        }
    }

    fn finish(self) -> io::Result<()> {
        match self {
            TraceSink::Plain(mut sink) => sink.flush(),
            TraceSink::Gzip(sink) => {
                let encoder = sink.into_inner().map_err(|e| e.into_error())?;
                encoder.finish()?.flush()
            }
        }
    }
}

impl Write for TraceSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TraceSink::Plain(sink) => sink.write(buf),
            TraceSink::Gzip(sink) => sink.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TraceSink::Plain(sink) => sink.flush(),
            TraceSink::Gzip(sink) => sink.flush(),
        }
    }
}

pub(crate) struct WriterSettings {
    pub profile_start_nanos: u64,
    pub format: TraceFormat,
    pub slim_profile: bool,
    pub output_base: Option<String>,
    pub build_id: Option<String>,
}

/// The background consumer half: owns the sink, joins on shutdown.
pub(crate) struct TraceWriter {
    queue: Arc<TraceQueue>,
    thread: JoinHandle<crate::Result<u64>>,
}

impl TraceWriter {
    /// Writes the array opener and header metadata, then spawns the
    /// consumer thread.
    pub fn spawn(
        sink: Box<dyn Write + Send>,
        settings: WriterSettings,
        bug_reporter: Arc<dyn BugReporter>,
    ) -> crate::Result<Self> {
        let mut out = StreamWriter::new(TraceSink::new(sink, settings.format))?;
        if let Some(output_base) = &settings.output_base {
            out.write_event(&MetadataEvent {
                name: MetadataName::ProcessName,
                ph: Phase::Metadata,
                pid: 1,
                tid: None,
                args: json!({ "name": output_base }),
            })?;
        }
        if let Some(build_id) = &settings.build_id {
            out.write_event(&MetadataEvent {
                name: MetadataName::ProcessLabels,
                ph: Phase::Metadata,
                pid: 1,
                tid: None,
                args: json!({ "labels": build_id }),
            })?;
        }

        let (sender, receiver) = crossbeam_channel::unbounded();
        let core = WriterCore {
            out,
            profile_start_nanos: settings.profile_start_nanos,
            slim_profile: settings.slim_profile,
            pending: None,
            bug_reporter,
        };
        let thread = std::thread::Builder::new()
            .name("trace-writer".to_string())
            .spawn(move || core.run(receiver))?;

        Ok(TraceWriter {
            queue: Arc::new(TraceQueue { sender }),
            thread,
        })
    }

    pub fn queue(&self) -> Arc<TraceQueue> {
        self.queue.clone()
    }

    /// Sends the sentinel and joins the thread, returning how many events
    /// were written.
    pub fn shutdown(self) -> crate::Result<u64> {
        self.queue.send(Record::Shutdown);
        self.thread
            .join()
            .map_err(|_| ProfilerError::WriterPanicked)?
    }
}

struct PendingMerge {
    first: TaskEvent,
    count: u64,
    end_nanos: u64,
}

struct WriterCore {
    out: StreamWriter<TraceSink>,
    profile_start_nanos: u64,
    slim_profile: bool,
    pending: Option<PendingMerge>,
    bug_reporter: Arc<dyn BugReporter>,
}

impl WriterCore {
    fn run(mut self, receiver: Receiver<Record>) -> crate::Result<u64> {
        let mut failure: Option<ProfilerError> = None;

        while let Ok(record) = receiver.recv() {
            if matches!(record, Record::Shutdown) {
                // A producer that loaded the queue handle before teardown may
                // still have completed an enqueue; drain those now.
                while let Ok(late) = receiver.try_recv() {
                    if !matches!(late, Record::Shutdown) {
                        self.consume(late, &mut failure);
                    }
                }
                break;
            }
            self.consume(record, &mut failure);
        }

        if let Some(error) = failure {
            return Err(error);
        }
        self.flush_pending()?;
        let written = self.out.written();
        debug!(events = written, "trace writer finished");
        self.out.finish()?.finish()?;
        Ok(written)
    }

    /// Writes one record unless a previous write already failed; the first
    /// failure is reported once and ends the trace.
    fn consume(&mut self, record: Record, failure: &mut Option<ProfilerError>) {
        if failure.is_some() {
            return;
        }
        if let Err(error) = self.write_record(record) {
            let error = ProfilerError::from(error);
            warn!(%error, "trace writer failed, dropping further events");
            self.bug_reporter.report(&error);
            *failure = Some(error);
        }
    }

    fn write_record(&mut self, record: Record) -> io::Result<()> {
        match record {
            Record::Task(event) => self.write_task(event),
            Record::Counters(series) => {
                self.flush_pending()?;
                self.write_counters(&series)
            }
            Record::Lane(metadata) => {
                self.flush_pending()?;
                self.write_lane(&metadata)
            }
            Record::Shutdown => Ok(()),
        }
    }

    fn write_task(&mut self, event: TaskEvent) -> io::Result<()> {
        if !self.slim_profile {
            return self.write_task_event(&event);
        }
        if !mergeable(&event) {
            self.flush_pending()?;
            return self.write_task_event(&event);
        }
        if let Some(pending) = &mut self.pending {
            if extends(pending, &event) {
                pending.count += 1;
                pending.end_nanos = event.start_nanos + event.duration_nanos;
                return Ok(());
            }
            self.flush_pending()?;
        }
        self.pending = Some(PendingMerge {
            end_nanos: event.start_nanos + event.duration_nanos,
            first: event,
            count: 1,
        });
        Ok(())
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        if pending.count == 1 {
            return self.write_task_event(&pending.first);
        }
        let merged = TaskEvent {
            description: format!("{} merged events", pending.count),
            duration_nanos: pending.end_nanos - pending.first.start_nanos,
            ..pending.first
        };
        self.write_task_event(&merged)
    }

    fn write_task_event(&mut self, event: &TaskEvent) -> io::Result<()> {
        let ts = self.micros_since_start(event.start_nanos);
        let cat = Some(event.kind.description().to_string());
        let tid = if event.kind == TaskKind::CriticalPathComponent {
            CRITICAL_PATH_LANE_ID
        } else {
            event.lane_id
        };
        let out = event
            .action
            .as_ref()
            .and_then(|action| action.primary_output.clone());
        let args = task_args(event);
        if event.duration_nanos == 0 {
            self.out.write_event(&InstantEvent {
                cat,
                name: event.description.clone(),
                ph: Phase::Instant,
                ts,
                pid: 1,
                out,
                args,
                tid,
            })
        } else {
            self.out.write_event(&CompleteEvent {
                cat,
                name: event.description.clone(),
                ph: Phase::Complete,
                ts,
                dur: event.duration_nanos / 1_000,
                pid: 1,
                out,
                args,
                tid,
            })
        }
    }

    fn write_counters(&mut self, series: &CounterSeries) -> io::Result<()> {
        for (i, value) in series.values.iter().enumerate() {
            let at = series.start_nanos + i as u64 * series.bucket_nanos;
            self.out.write_event(&CounterEvent {
                name: series.name.clone(),
                ph: Phase::Counter,
                ts: self.micros_since_start(at),
                pid: 1,
                args: json!({ series.series_label.clone(): value }),
            })?;
        }
        Ok(())
    }

    fn write_lane(&mut self, metadata: &LaneMetadata) -> io::Result<()> {
        self.out.write_event(&MetadataEvent {
            name: MetadataName::ThreadName,
            ph: Phase::Metadata,
            pid: 1,
            tid: Some(metadata.lane_id),
            args: json!({ "name": metadata.display_name }),
        })?;
        self.out.write_event(&MetadataEvent {
            name: MetadataName::ThreadSortIndex,
            ph: Phase::Metadata,
            pid: 1,
            tid: Some(metadata.lane_id),
            args: json!({ "sort_index": metadata.sort_index }),
        })
    }

    fn micros_since_start(&self, nanos: u64) -> u64 {
        nanos.saturating_sub(self.profile_start_nanos) / 1_000
    }
}

fn task_args(event: &TaskEvent) -> Option<Value> {
    let mut map = serde_json::Map::new();
    if event.kind == TaskKind::CriticalPathComponent {
        map.insert("tid".to_string(), json!(event.lane_id));
    }
    if let Some(action) = &event.action {
        if let Some(target) = &action.target_label {
            map.insert("target".to_string(), json!(target));
        }
        if let Some(mnemonic) = &action.mnemonic {
            map.insert("mnemonic".to_string(), json!(mnemonic));
        }
    }
    (!map.is_empty()).then_some(Value::Object(map))
}

fn mergeable(event: &TaskEvent) -> bool {
    event.duration_nanos > 0
        && event.duration_nanos < SLIM_MERGE_THRESHOLD_NANOS
        && event.action.is_none()
        && event.kind != TaskKind::CriticalPathComponent
}

fn extends(pending: &PendingMerge, next: &TaskEvent) -> bool {
    next.lane_id == pending.first.lane_id
        && next.kind == pending.first.kind
        && next.start_nanos >= pending.end_nanos
        && next.start_nanos - pending.end_nanos < SLIM_MERGE_THRESHOLD_NANOS
}
