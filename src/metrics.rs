// src/metrics.rs
//
// Pipeline counters. Cheap relaxed atomics, summarised into a plain
// struct for logging.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct PipelineMetrics {
    pub ticks: AtomicU64,
    pub captures: AtomicU64,
    pub capture_failures: AtomicU64,
    pub busy_skips: AtomicU64,
    pub out_of_band_captures: AtomicU64,
    pub low_quality_drops: AtomicU64,
    pub classifications: AtomicU64,
    pub useless_frames: AtomicU64,
    pub classifier_contended: AtomicU64,
    pub classifier_failures: AtomicU64,
    pub commits: AtomicU64,
    pub refresh_commits: AtomicU64,
    pub duplicate_discards: AtomicU64,
    pub detection_readings: AtomicU64,
    pub detector_failures: AtomicU64,
    pub worst_tick_ms: AtomicU64,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            captures: AtomicU64::new(0),
            capture_failures: AtomicU64::new(0),
            busy_skips: AtomicU64::new(0),
            out_of_band_captures: AtomicU64::new(0),
            low_quality_drops: AtomicU64::new(0),
            classifications: AtomicU64::new(0),
            useless_frames: AtomicU64::new(0),
            classifier_contended: AtomicU64::new(0),
            classifier_failures: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            refresh_commits: AtomicU64::new(0),
            duplicate_discards: AtomicU64::new(0),
            detection_readings: AtomicU64::new(0),
            detector_failures: AtomicU64::new(0),
            worst_tick_ms: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn record_tick_duration(&self, elapsed: Duration) {
        self.worst_tick_ms
            .fetch_max(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    /// Share of successful classifications that came back useless.
    pub fn useless_ratio(&self) -> f64 {
        let classified = self.get(&self.classifications);
        if classified == 0 {
            0.0
        } else {
            self.get(&self.useless_frames) as f64 / classified as f64
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            ticks: self.get(&self.ticks),
            captures: self.get(&self.captures),
            capture_failures: self.get(&self.capture_failures),
            busy_skips: self.get(&self.busy_skips),
            out_of_band_captures: self.get(&self.out_of_band_captures),
            low_quality_drops: self.get(&self.low_quality_drops),
            classifications: self.get(&self.classifications),
            useless_frames: self.get(&self.useless_frames),
            classifier_contended: self.get(&self.classifier_contended),
            classifier_failures: self.get(&self.classifier_failures),
            commits: self.get(&self.commits),
            refresh_commits: self.get(&self.refresh_commits),
            duplicate_discards: self.get(&self.duplicate_discards),
            detection_readings: self.get(&self.detection_readings),
            detector_failures: self.get(&self.detector_failures),
            worst_tick_ms: self.get(&self.worst_tick_ms),
            useless_ratio: self.useless_ratio(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub ticks: u64,
    pub captures: u64,
    pub capture_failures: u64,
    pub busy_skips: u64,
    pub out_of_band_captures: u64,
    pub low_quality_drops: u64,
    pub classifications: u64,
    pub useless_frames: u64,
    pub classifier_contended: u64,
    pub classifier_failures: u64,
    pub commits: u64,
    pub refresh_commits: u64,
    pub duplicate_discards: u64,
    pub detection_readings: u64,
    pub detector_failures: u64,
    pub worst_tick_ms: u64,
    pub useless_ratio: f64,
    pub elapsed_secs: f64,
}
