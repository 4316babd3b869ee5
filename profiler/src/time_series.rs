use std::time::Duration;

/// Fixed-bucket time series accumulating overlap-weighted event counts.
///
/// `add_range` spreads an event across every bucket it overlaps, weighted by
/// `overlap / bucket_duration`, so the bucket value reads as the average
/// number of concurrent events during that bucket. Buckets are appended
/// lazily; `to_values` densifies to a fixed length at collection time.
#[derive(Debug)]
pub(crate) struct TimeSeries {
    start_nanos: u64,
    bucket_nanos: u64,
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(start_nanos: u64, bucket_duration: Duration) -> Self {
        let bucket_nanos = bucket_duration.as_nanos() as u64;
        assert!(bucket_nanos > 0, "bucket duration must be positive");
        TimeSeries {
            start_nanos,
            bucket_nanos,
            values: Vec::new(),
        }
    }

    /// Adds one event spanning `[start_nanos, end_nanos)` in absolute clock
    /// time. Empty ranges contribute nothing; portions before the series
    /// start are ignored.
    pub fn add_range(&mut self, start_nanos: u64, end_nanos: u64) {
        if end_nanos <= start_nanos {
            return;
        }
        let rel_start = start_nanos.saturating_sub(self.start_nanos);
        let rel_end = end_nanos.saturating_sub(self.start_nanos);
        if rel_end == 0 {
            return;
        }
        let first = rel_start / self.bucket_nanos;
        let last = (rel_end - 1) / self.bucket_nanos;
        for bucket in first..=last {
            let bucket_start = bucket * self.bucket_nanos;
            let bucket_end = bucket_start + self.bucket_nanos;
            let overlap = rel_end.min(bucket_end) - rel_start.max(bucket_start);
            self.bump(bucket as usize, overlap as f64 / self.bucket_nanos as f64);
        }
    }

    fn bump(&mut self, bucket: usize, weight: f64) {
        if self.values.len() <= bucket {
            self.values.resize(bucket + 1, 0.0);
        }
        self.values[bucket] += weight;
    }

    /// Densifies to exactly `len` buckets, truncating or zero-padding.
    pub fn to_values(&self, len: usize) -> Vec<f64> {
        let mut values = self.values.clone();
        values.resize(len, 0.0);
        values
    }
}
