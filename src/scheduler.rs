// src/scheduler.rs
//
// Background capture loop. Each tick:
//   capture -> quality filter -> classify -> commit decision
// and every outcome is reported to the health counters.
//
// A classified frame is only committed when it says something new:
//   - its category differs from the last committed category (angle change)
//   - or the same category has not been committed for `refresh_after`,
//     so the preserved slot does not go stale while the camera lingers
// Everything else is discarded to keep duplicates out of the ring.

use crate::capture::CaptureError;
use crate::classifier::Classification;
use crate::monitor::CameraMonitor;
use crate::types::{now_ms, ViewCategory};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    /// Category differs from the last committed one.
    NewAngle,
    /// Same category, but its last commit is older than the refresh threshold.
    Refresh,
    /// Same category, committed recently.
    Duplicate,
}

impl CommitDecision {
    pub fn should_commit(&self) -> bool {
        !matches!(self, CommitDecision::Duplicate)
    }
}

/// Remembers what was committed and when, and decides on the next frame.
pub struct CommitPolicy {
    refresh_after_ms: u64,
    last_committed: Option<ViewCategory>,
    last_commit_ms: BTreeMap<ViewCategory, u64>,
}

impl CommitPolicy {
    pub fn new(refresh_after_ms: u64) -> Self {
        Self {
            refresh_after_ms,
            last_committed: None,
            last_commit_ms: BTreeMap::new(),
        }
    }

    pub fn decide(&self, category: ViewCategory, now_ms: u64) -> CommitDecision {
        if self.last_committed != Some(category) {
            return CommitDecision::NewAngle;
        }
        match self.last_commit_ms.get(&category) {
            Some(&at) if now_ms.saturating_sub(at) > self.refresh_after_ms => {
                CommitDecision::Refresh
            }
            Some(_) => CommitDecision::Duplicate,
            None => CommitDecision::NewAngle,
        }
    }

    pub fn record_commit(&mut self, category: ViewCategory, now_ms: u64) {
        self.last_committed = Some(category);
        self.last_commit_ms.insert(category, now_ms);
    }

    pub fn last_committed(&self) -> Option<ViewCategory> {
        self.last_committed
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// An out-of-band capture held the capture slot.
    Busy,
    CaptureFailed,
    LowQuality { bytes: usize },
    Useless(Classification),
    Committed {
        frame_id: u64,
        category: ViewCategory,
        decision: CommitDecision,
    },
    Discarded { category: ViewCategory },
}

pub struct CaptureScheduler {
    monitor: Arc<CameraMonitor>,
    policy: CommitPolicy,
    tick_interval: Duration,
}

impl CaptureScheduler {
    pub fn new(monitor: Arc<CameraMonitor>) -> Self {
        let scheduler = &monitor.config().scheduler;
        let policy = CommitPolicy::new(scheduler.refresh_after_secs * 1_000);
        let tick_interval = Duration::from_secs(scheduler.tick_interval_secs.max(1));
        Self {
            monitor,
            policy,
            tick_interval,
        }
    }

    pub async fn tick(&mut self, now_ms: u64) -> TickOutcome {
        let started = Instant::now();
        let outcome = self.run_tick(now_ms).await;

        let metrics = self.monitor.metrics();
        metrics.inc(&metrics.ticks);
        metrics.record_tick_duration(started.elapsed());
        outcome
    }

    async fn run_tick(&mut self, now_ms: u64) -> TickOutcome {
        let monitor = &self.monitor;
        let metrics = monitor.metrics();

        let frame = match monitor.capture_controller().capture(now_ms).await {
            Ok(frame) => frame,
            Err(CaptureError::Busy) => {
                metrics.inc(&metrics.busy_skips);
                debug!("Tick skipped: capture already in flight");
                return TickOutcome::Busy;
            }
            Err(_) => {
                metrics.inc(&metrics.capture_failures);
                monitor.update_health(|h| h.record_failure()).await;
                return TickOutcome::CaptureFailed;
            }
        };
        metrics.inc(&metrics.captures);

        if monitor.quality_filter().is_low_quality(&frame.jpeg_data) {
            metrics.inc(&metrics.low_quality_drops);
            monitor.update_health(|h| h.record_noop(now_ms)).await;
            return TickOutcome::LowQuality {
                bytes: frame.byte_size(),
            };
        }

        let classification = monitor.classifier().classify(&frame.jpeg_data).await;
        match classification {
            Classification::Tagged(_) => metrics.inc(&metrics.classifications),
            Classification::Contended => metrics.inc(&metrics.classifier_contended),
            Classification::Failed => metrics.inc(&metrics.classifier_failures),
        }

        let category = classification.category();
        if !category.is_useful() {
            if matches!(classification, Classification::Tagged(_)) {
                metrics.inc(&metrics.useless_frames);
            }
            monitor.update_health(|h| h.record_noop(now_ms)).await;
            debug!("Frame {} classified useless, not buffered", frame.frame_id);
            return TickOutcome::Useless(classification);
        }

        monitor
            .update_health(|h| h.record_classification(category, now_ms))
            .await;

        let decision = self.policy.decide(category, now_ms);
        if !decision.should_commit() {
            metrics.inc(&metrics.duplicate_discards);
            debug!(
                "Frame {} discarded: {} unchanged since last commit",
                frame.frame_id, category
            );
            return TickOutcome::Discarded { category };
        }

        let frame_id = frame.frame_id;
        if monitor.commit(frame.classified(category)).await.is_none() {
            return TickOutcome::Discarded { category };
        }
        self.policy.record_commit(category, now_ms);
        metrics.inc(&metrics.commits);
        if decision == CommitDecision::Refresh {
            metrics.inc(&metrics.refresh_commits);
        }

        info!(
            "📸 Committed frame {} ({}, {:?})",
            frame_id, category, decision
        );
        TickOutcome::Committed {
            frame_id,
            category,
            decision,
        }
    }

    /// Tick on a fixed interval until `shutdown` flips to true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "⏱️  Capture scheduler started (every {:?})",
            self.tick_interval
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.tick(now_ms()).await;
                    debug!("Tick outcome: {:?}", outcome);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("⏱️  Capture scheduler stopped");
    }
}
