// src/trend.rs
//
// Per-direction vehicle count history and the congestion trend derived
// from it. Counts come from an external detector; a reading may carry no
// counts at all when the detector was unavailable. Such readings keep
// their place in the window but are ignored when summarising.

use crate::types::TrendConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Vehicle count per direction label, e.g. `{"inbound": 12, "outbound": 3}`.
pub type DirectionCounts = BTreeMap<String, u32>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendReading {
    pub timestamp_ms: u64,
    pub counts: Option<DirectionCounts>,
    /// Analysis pass this reading was produced by, when known.
    pub pass_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowSpeed {
    Unknown,
    Normal,
    MovingWell,
    Slow,
    VerySlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendConfidence {
    Insufficient,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub per_direction: BTreeMap<String, DirectionTrend>,
    pub flow_speed: FlowSpeed,
    pub confidence: TrendConfidence,
    /// Usable readings the summary was computed from.
    pub samples: usize,
    pub mean_total: Option<f64>,
    pub variance_total: Option<f64>,
}

impl TrendSummary {
    pub fn unknown(samples: usize) -> Self {
        Self {
            per_direction: BTreeMap::new(),
            flow_speed: FlowSpeed::Unknown,
            confidence: TrendConfidence::Insufficient,
            samples,
            mean_total: None,
            variance_total: None,
        }
    }
}

pub struct TrendTracker {
    readings: VecDeque<TrendReading>,
    config: TrendConfig,
}

impl TrendTracker {
    pub fn new(config: TrendConfig) -> Self {
        Self {
            readings: VecDeque::with_capacity(config.window_size.max(1)),
            config,
        }
    }

    pub fn add_reading(&mut self, reading: TrendReading) {
        if self.readings.len() >= self.config.window_size.max(1) {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    pub fn summarize(&self) -> TrendSummary {
        let sub_window = self.config.sub_window.max(2);
        let usable: Vec<&DirectionCounts> = self
            .readings
            .iter()
            .filter_map(|r| r.counts.as_ref())
            .collect();
        let recent = &usable[usable.len().saturating_sub(sub_window)..];

        if recent.len() < 2 {
            return TrendSummary::unknown(recent.len());
        }

        let (Some(oldest), Some(newest)) = (recent.first(), recent.last()) else {
            return TrendSummary::unknown(recent.len());
        };

        let per_direction = newest
            .iter()
            .filter_map(|(direction, &latest)| {
                let earliest = *oldest.get(direction)?;
                let delta = latest as i64 - earliest as i64;
                Some((direction.clone(), self.tag_delta(delta)))
            })
            .collect();

        let totals: Vec<f64> = recent
            .iter()
            .map(|counts| counts.values().map(|&n| n as f64).sum())
            .collect();
        let mean = totals.iter().sum::<f64>() / totals.len() as f64;
        let variance =
            totals.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / totals.len() as f64;

        let confidence = if recent.len() == 2 {
            TrendConfidence::Low
        } else if recent.len() < sub_window {
            TrendConfidence::Medium
        } else {
            TrendConfidence::High
        };

        TrendSummary {
            per_direction,
            flow_speed: self.tag_flow(mean, variance),
            confidence,
            samples: recent.len(),
            mean_total: Some(mean),
            variance_total: Some(variance),
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn latest(&self) -> Option<&TrendReading> {
        self.readings.back()
    }

    fn tag_delta(&self, delta: i64) -> DirectionTrend {
        if delta > self.config.dead_band {
            DirectionTrend::Increasing
        } else if delta < -self.config.dead_band {
            DirectionTrend::Decreasing
        } else {
            DirectionTrend::Stable
        }
    }

    fn tag_flow(&self, mean: f64, variance: f64) -> FlowSpeed {
        // Counts that swing around mean vehicles are clearing the frame.
        if variance >= self.config.high_variance {
            FlowSpeed::MovingWell
        } else if mean >= self.config.very_slow_mean {
            FlowSpeed::VerySlow
        } else if mean >= self.config.slow_mean {
            FlowSpeed::Slow
        } else {
            FlowSpeed::Normal
        }
    }
}
