//! Bounded rolling buffer of live samples.
//!
//! Monitoring keeps the most recent samples (5000 by default) with running
//! min/max pressure statistics. The extrema are maintained incrementally and
//! are never recomputed when old samples fall out of the window, so they
//! describe everything seen since `start`, not just the retained tail.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

use crate::protocol::measurement::Measurement;

/// Default sample capacity of a monitoring buffer.
pub const MONITOR_CAPACITY: usize = 5000;

/// One monitoring sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSample {
    /// Seconds since monitoring started.
    pub elapsed_seconds: f64,
    /// Reference pressure.
    pub pressure: f64,
    /// Electrical signal (for relay measurements: 1.0 closed, 0.0 open).
    pub signal: f64,
}

/// Summary statistics over everything seen since `start`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MonitorStats {
    /// Lowest pressure observed.
    pub min: f64,
    /// Highest pressure observed.
    pub max: f64,
    /// `max - min`.
    pub span: f64,
    /// Samples currently retained (at most the capacity).
    pub count: usize,
}

/// Rolling sample buffer with pause/resume and running extrema.
#[derive(Debug)]
pub struct MonitoringBuffer {
    samples: VecDeque<MonitoringSample>,
    capacity: usize,
    active: bool,
    paused: bool,
    min: Option<f64>,
    max: Option<f64>,
    started: Option<Instant>,
}

impl Default for MonitoringBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitoringBuffer {
    /// Creates an inactive buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(MONITOR_CAPACITY)
    }

    /// Creates an inactive buffer retaining at most `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(MONITOR_CAPACITY)),
            capacity,
            active: false,
            paused: false,
            min: None,
            max: None,
            started: None,
        }
    }

    /// Begins a fresh monitoring session: clears samples and statistics and
    /// establishes the elapsed-time origin.
    pub fn start(&mut self) {
        self.samples.clear();
        self.min = None;
        self.max = None;
        self.active = true;
        self.paused = false;
        self.started = Some(Instant::now());
    }

    /// Appends a sample, evicting the oldest when full. Silently ignored
    /// while inactive or paused. Returns whether the sample was kept.
    pub fn append(&mut self, sample: MonitoringSample) -> bool {
        if !self.active || self.paused {
            return false;
        }
        self.min = Some(self.min.map_or(sample.pressure, |m| m.min(sample.pressure)));
        self.max = Some(self.max.map_or(sample.pressure, |m| m.max(sample.pressure)));
        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        true
    }

    /// Appends a live measurement, stamping it with the elapsed time.
    pub fn record(&mut self, measurement: &Measurement) -> bool {
        if !self.active || self.paused {
            return false;
        }
        let elapsed_seconds = self
            .started
            .map_or(0.0, |started| started.elapsed().as_secs_f64());
        self.append(MonitoringSample {
            elapsed_seconds,
            pressure: f64::from(measurement.pressure),
            signal: f64::from(measurement.signal),
        })
    }

    /// Suspends sample intake without discarding anything.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resumes sample intake after [`pause`](Self::pause).
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Stops monitoring and discards all samples and statistics.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.min = None;
        self.max = None;
        self.active = false;
        self.paused = false;
        self.started = None;
    }

    /// Whether a monitoring session is running (possibly paused).
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether intake is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &MonitoringSample> {
        self.samples.iter()
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Statistics over the session; absent until the first sample.
    pub fn stats(&self) -> Option<MonitorStats> {
        let min = self.min?;
        let max = self.max?;
        Some(MonitorStats {
            min,
            max,
            span: max - min,
            count: self.samples.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pressure: f64) -> MonitoringSample {
        MonitoringSample {
            elapsed_seconds: 0.0,
            pressure,
            signal: 0.0,
        }
    }

    #[test]
    fn inactive_buffer_ignores_samples() {
        let mut buffer = MonitoringBuffer::new();
        assert!(!buffer.append(sample(1.0)));
        assert!(buffer.is_empty());
        assert!(buffer.stats().is_none());
    }

    #[test]
    fn stats_appear_with_first_sample() {
        let mut buffer = MonitoringBuffer::new();
        buffer.start();
        assert!(buffer.stats().is_none());
        buffer.append(sample(5.0));
        let stats = buffer.stats().unwrap();
        assert_eq!(stats.min, 5.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.span, 0.0);
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn extrema_track_all_samples() {
        let mut buffer = MonitoringBuffer::new();
        buffer.start();
        for p in [3.0, -1.0, 7.0, 2.0] {
            buffer.append(sample(p));
        }
        let stats = buffer.stats().unwrap();
        assert_eq!(stats.min, -1.0);
        assert_eq!(stats.max, 7.0);
        assert_eq!(stats.span, 8.0);
    }

    #[test]
    fn capacity_evicts_oldest_but_keeps_extrema() {
        let mut buffer = MonitoringBuffer::with_capacity(3);
        buffer.start();
        for p in [100.0, 1.0, 2.0, 3.0] {
            buffer.append(sample(p));
        }
        assert_eq!(buffer.len(), 3);
        let retained: Vec<f64> = buffer.samples().map(|s| s.pressure).collect();
        assert_eq!(retained, vec![1.0, 2.0, 3.0]);
        // 100.0 was evicted but the running max still remembers it.
        assert_eq!(buffer.stats().unwrap().max, 100.0);
    }

    #[test]
    fn full_capacity_stays_bounded() {
        let mut buffer = MonitoringBuffer::new();
        buffer.start();
        for i in 0..(MONITOR_CAPACITY + 1) {
            buffer.append(sample(i as f64));
        }
        assert_eq!(buffer.len(), MONITOR_CAPACITY);
        assert_eq!(buffer.samples().next().unwrap().pressure, 1.0);
    }

    #[test]
    fn pause_and_resume_gate_intake() {
        let mut buffer = MonitoringBuffer::new();
        buffer.start();
        buffer.append(sample(1.0));
        buffer.pause();
        assert!(buffer.is_paused());
        assert!(!buffer.append(sample(2.0)));
        buffer.resume();
        assert!(buffer.append(sample(3.0)));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn reset_clears_everything() {
        let mut buffer = MonitoringBuffer::new();
        buffer.start();
        buffer.append(sample(1.0));
        buffer.reset();
        assert!(!buffer.is_active());
        assert!(buffer.is_empty());
        assert!(buffer.stats().is_none());
    }

    #[test]
    fn restart_clears_previous_session() {
        let mut buffer = MonitoringBuffer::new();
        buffer.start();
        buffer.append(sample(50.0));
        buffer.start();
        assert!(buffer.is_empty());
        assert!(buffer.stats().is_none());
        buffer.append(sample(1.0));
        assert_eq!(buffer.stats().unwrap().max, 1.0);
    }
}
