//! # Chrome Trace
//!
//! Rust types for the subset of the Chrome Trace Event Format emitted by the
//! build profiler, plus an incremental [`StreamWriter`] that frames events as
//! a single top-level JSON array suitable for chrome://tracing and Perfetto.
//!
//! ## Event types
//!
//! Four phases are modelled, each with its own struct:
//! - **Complete Events** (`X`): a span with a start timestamp and duration
//! - **Instant Events** (`i`): a point in time with no duration
//! - **Counter Events** (`C`): named numeric series sampled over time
//! - **Metadata Events** (`M`): thread/process naming and sort order
//!
//! ## Timestamps
//!
//! All timestamps and durations are in microseconds, relative to whatever
//! epoch the producer chooses (the profiler uses its profile start time).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Write};

/// Event phase, the single-character discriminator of the trace format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Complete event with a start timestamp and a duration.
    #[serde(rename = "X")]
    Complete,
    /// Instant event, drawn as a vertical line at a single timestamp.
    #[serde(rename = "i")]
    Instant,
    /// Counter event, drawn as a stacked line graph.
    #[serde(rename = "C")]
    Counter,
    /// Metadata event carrying thread/process naming information.
    #[serde(rename = "M")]
    Metadata,
}

/// Well-known names for metadata events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataName {
    /// Sets the display name of a thread (or synthetic lane).
    #[serde(rename = "thread_name")]
    ThreadName,
    /// Sets the sort position of a thread in the viewer.
    #[serde(rename = "thread_sort_index")]
    ThreadSortIndex,
    /// Sets the display name of the process.
    #[serde(rename = "process_name")]
    ProcessName,
    /// Attaches free-form labels to the process.
    #[serde(rename = "process_labels")]
    ProcessLabels,
}

/// A span with known duration.
///
/// Field order matters: serialization preserves declaration order, and the
/// emitted key order (`cat`, `name`, `ph`, `ts`, `dur`, `pid`, `out`, `args`,
/// `tid`) is kept stable so traces diff cleanly across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteEvent {
    /// Category, used by the viewer for filtering and coloring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cat: Option<String>,
    /// Display name of the event.
    pub name: String,
    /// Must be [`Phase::Complete`].
    pub ph: Phase,
    /// Start timestamp in microseconds.
    pub ts: u64,
    /// Duration in microseconds.
    pub dur: u64,
    /// Process id.
    pub pid: u32,
    /// Primary output path, a viewer extension used for build actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
    /// Free-form arguments shown in the event detail pane.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    /// Thread (or synthetic lane) id.
    pub tid: u64,
}

/// A point in time with no duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantEvent {
    /// Category, used by the viewer for filtering and coloring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cat: Option<String>,
    /// Display name of the event.
    pub name: String,
    /// Must be [`Phase::Instant`].
    pub ph: Phase,
    /// Timestamp in microseconds.
    pub ts: u64,
    /// Process id.
    pub pid: u32,
    /// Primary output path, a viewer extension used for build actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
    /// Free-form arguments shown in the event detail pane.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    /// Thread (or synthetic lane) id.
    pub tid: u64,
}

/// One sample of one or more counter series.
///
/// Each key of `args` is a series name; the viewer stacks multiple series
/// sharing the same event `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterEvent {
    /// Display name of the counter graph.
    pub name: String,
    /// Must be [`Phase::Counter`].
    pub ph: Phase,
    /// Timestamp in microseconds.
    pub ts: u64,
    /// Process id.
    pub pid: u32,
    /// Series values keyed by series name. Values must be numeric.
    pub args: Value,
}

/// Thread or process naming record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataEvent {
    /// Which metadata is being set.
    pub name: MetadataName,
    /// Must be [`Phase::Metadata`].
    pub ph: Phase,
    /// Process id.
    pub pid: u32,
    /// Thread id; required for thread metadata, absent for process metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<u64>,
    /// Metadata payload, e.g. `{"name": "critical path"}` or
    /// `{"sort_index": 1000000}`.
    pub args: Value,
}

/// Any event this crate can emit or parse back.
///
/// Deserialization picks the variant structurally: completes carry `dur`,
/// instants carry `ts` and `tid` but no `dur`, counters carry `ts` without
/// `tid`, and metadata events have no `ts` at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceEvent {
    Complete(CompleteEvent),
    Instant(InstantEvent),
    Counter(CounterEvent),
    Metadata(MetadataEvent),
}

impl TraceEvent {
    /// Event phase, regardless of variant.
    pub fn phase(&self) -> Phase {
        match self {
            TraceEvent::Complete(e) => e.ph,
            TraceEvent::Instant(e) => e.ph,
            TraceEvent::Counter(e) => e.ph,
            TraceEvent::Metadata(e) => e.ph,
        }
    }

    /// Display name, regardless of variant.
    pub fn name(&self) -> Option<&str> {
        match self {
            TraceEvent::Complete(e) => Some(&e.name),
            TraceEvent::Instant(e) => Some(&e.name),
            TraceEvent::Counter(e) => Some(&e.name),
            TraceEvent::Metadata(_) => None,
        }
    }
}

/// Incremental writer producing a single top-level JSON array of events.
///
/// The opening `[` is written on construction; call [`StreamWriter::finish`]
/// to write the closing `]` and flush. Events are written one per line so a
/// truncated trace is still inspectable with line tools.
///
/// The writer performs no buffering of its own; wrap the sink in a
/// [`std::io::BufWriter`] (or a compressing encoder) before handing it over.
pub struct StreamWriter<W: Write> {
    sink: W,
    written: u64,
}

impl<W: Write> StreamWriter<W> {
    /// Starts a new trace, writing the array opener.
    pub fn new(mut sink: W) -> io::Result<Self> {
        sink.write_all(b"[")?;
        Ok(StreamWriter { sink, written: 0 })
    }

    /// Appends one event to the array.
    pub fn write_event<T: Serialize>(&mut self, event: &T) -> io::Result<()> {
        if self.written == 0 {
            self.sink.write_all(b"\n ")?;
        } else {
            self.sink.write_all(b",\n ")?;
        }
        serde_json::to_writer(&mut self.sink, event)?;
        self.written += 1;
        Ok(())
    }

    /// Number of events written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Closes the array, flushes, and returns the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.sink.write_all(b"\n]\n")?;
        self.sink.flush()?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete(name: &str, ts: u64, dur: u64) -> CompleteEvent {
        CompleteEvent {
            cat: Some("test".to_string()),
            name: name.to_string(),
            ph: Phase::Complete,
            ts,
            dur,
            pid: 1,
            out: None,
            args: None,
            tid: 7,
        }
    }

    #[test]
    fn complete_event_key_order_is_stable() {
        let event = complete("compile", 12, 34);
        let text = serde_json::to_string(&event).unwrap();
        assert_eq!(
            text,
            r#"{"cat":"test","name":"compile","ph":"X","ts":12,"dur":34,"pid":1,"tid":7}"#
        );
    }

    #[test]
    fn optional_fields_are_omitted() {
        let event = InstantEvent {
            cat: None,
            name: "marker".to_string(),
            ph: Phase::Instant,
            ts: 5,
            pid: 1,
            out: None,
            args: None,
            tid: 3,
        };
        let text = serde_json::to_string(&event).unwrap();
        assert!(!text.contains("cat"));
        assert!(!text.contains("args"));
        assert!(!text.contains("dur"));
    }

    #[test]
    fn untagged_roundtrip_picks_the_right_variant() {
        let events = vec![
            TraceEvent::Complete(complete("a", 1, 2)),
            TraceEvent::Instant(InstantEvent {
                cat: None,
                name: "b".to_string(),
                ph: Phase::Instant,
                ts: 3,
                pid: 1,
                out: None,
                args: None,
                tid: 4,
            }),
            TraceEvent::Counter(CounterEvent {
                name: "cpu".to_string(),
                ph: Phase::Counter,
                ts: 9,
                pid: 1,
                args: json!({"cpu": 1.5}),
            }),
            TraceEvent::Metadata(MetadataEvent {
                name: MetadataName::ThreadName,
                ph: Phase::Metadata,
                pid: 1,
                tid: Some(1_000_000),
                args: json!({"name": "lane 0"}),
            }),
        ];
        let text = serde_json::to_string(&events).unwrap();
        let parsed: Vec<TraceEvent> = serde_json::from_str(&text).unwrap();
        let phases: Vec<Phase> = parsed.iter().map(TraceEvent::phase).collect();
        assert_eq!(
            phases,
            vec![Phase::Complete, Phase::Instant, Phase::Counter, Phase::Metadata]
        );
    }

    #[test]
    fn stream_writer_frames_a_json_array() {
        let mut writer = StreamWriter::new(Vec::new()).unwrap();
        writer.write_event(&complete("a", 1, 2)).unwrap();
        writer.write_event(&complete("b", 3, 4)).unwrap();
        assert_eq!(writer.written(), 2);
        let bytes = writer.finish().unwrap();
        let parsed: Vec<TraceEvent> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name(), Some("a"));
        assert_eq!(parsed[1].name(), Some("b"));
    }

    #[test]
    fn empty_trace_is_a_valid_array() {
        let writer = StreamWriter::new(Vec::new()).unwrap();
        let bytes = writer.finish().unwrap();
        let parsed: Vec<TraceEvent> = serde_json::from_slice(&bytes).unwrap();
        assert!(parsed.is_empty());
    }
}
