// src/health.rs
//
// Camera source health, derived from two rolling counters:
//   - consecutive capture failures
//   - the last N useful classifications
//
// The state is never stored; it is recomputed from the counters whenever
// someone asks, and `Down` always wins over `StuckOnAngle`.

use crate::types::{HealthConfig, ViewCategory};
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "category", rename_all = "snake_case")]
pub enum CameraHealthState {
    Operational,
    /// Same view reported for the whole stuck window.
    StuckOnAngle(ViewCategory),
    Down,
}

/// Read-time view of the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub state: CameraHealthState,
    pub advisory: String,
    pub last_success_ms: Option<u64>,
    pub consecutive_failures: u32,
}

pub struct HealthMonitor {
    consecutive_failures: u32,
    angle_history: VecDeque<ViewCategory>,
    failure_threshold: u32,
    stuck_threshold: usize,
    last_success_ms: Option<u64>,
}

impl HealthMonitor {
    pub fn new(config: &HealthConfig) -> Self {
        let stuck_threshold = config.stuck_threshold.max(1);
        Self {
            consecutive_failures: 0,
            angle_history: VecDeque::with_capacity(stuck_threshold),
            failure_threshold: config.failure_threshold.max(1),
            stuck_threshold,
            last_success_ms: None,
        }
    }

    /// Capture or read failure of the source itself.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// A frame came back from the source but produced no useful angle
    /// (low quality, useless classification). The source is reachable, so
    /// the failure streak ends; the angle history is left alone.
    pub fn record_noop(&mut self, now_ms: u64) {
        self.consecutive_failures = 0;
        self.last_success_ms = Some(now_ms);
    }

    /// A useful classification, repeated or not. `Useless` is treated as a no-op.
    pub fn record_classification(&mut self, category: ViewCategory, now_ms: u64) {
        if !category.is_useful() {
            self.record_noop(now_ms);
            return;
        }

        self.consecutive_failures = 0;
        self.last_success_ms = Some(now_ms);
        self.angle_history.push_back(category);
        if self.angle_history.len() > self.stuck_threshold {
            self.angle_history.pop_front();
        }
    }

    pub fn state(&self) -> CameraHealthState {
        evaluate(
            self.consecutive_failures,
            &self.angle_history,
            self.failure_threshold,
            self.stuck_threshold,
        )
    }

    pub fn report(&self, now_ms: u64) -> HealthReport {
        let state = self.state();
        HealthReport {
            state,
            advisory: advisory(state, self.last_success_ms, now_ms),
            last_success_ms: self.last_success_ms,
            consecutive_failures: self.consecutive_failures,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_success_ms(&self) -> Option<u64> {
        self.last_success_ms
    }
}

fn evaluate(
    consecutive_failures: u32,
    angle_history: &VecDeque<ViewCategory>,
    failure_threshold: u32,
    stuck_threshold: usize,
) -> CameraHealthState {
    if consecutive_failures >= failure_threshold {
        return CameraHealthState::Down;
    }

    if angle_history.len() >= stuck_threshold {
        let mut recent = angle_history.iter().rev().take(stuck_threshold);
        if let Some(first) = recent.next() {
            if recent.all(|c| c == first) {
                return CameraHealthState::StuckOnAngle(*first);
            }
        }
    }

    CameraHealthState::Operational
}

fn advisory(state: CameraHealthState, last_success_ms: Option<u64>, now_ms: u64) -> String {
    match state {
        CameraHealthState::Operational => "Camera is operating normally.".to_string(),
        CameraHealthState::StuckOnAngle(category) => format!(
            "Camera appears stuck on the {} view; other views may be out of date.",
            category
        ),
        CameraHealthState::Down => match last_success_ms {
            Some(at) => format!(
                "Camera feed is unavailable; last successful capture was {} ago.",
                format_elapsed(now_ms.saturating_sub(at))
            ),
            None => "Camera feed is unavailable; no frame has been captured since startup."
                .to_string(),
        },
    }
}

fn format_elapsed(ms: u64) -> String {
    let secs = ms / 1_000;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3_600 {
        format!("{} min", secs / 60)
    } else {
        format!("{} h {} min", secs / 3_600, (secs % 3_600) / 60)
    }
}
