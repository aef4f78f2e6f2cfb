// src/monitor.rs
//
// Owned camera state plus the interface request handlers use.
//
// Each shared structure (frame store, health counters, trend window) sits
// behind its own lock. Writes to the frame store and health counters come
// only from the capture scheduler, through the crate-private methods below;
// handlers get read access, out-of-band captures and detection readings.
// Nothing here returns an error: every failure resolves to `None`, an
// empty list or a typed report.

use crate::capture::{CaptureController, FrameSource};
use crate::classifier::{FrameClassifier, ViewClassifier};
use crate::frame_buffer::{Commit, FrameStore};
use crate::health::{CameraHealthState, HealthMonitor, HealthReport};
use crate::metrics::PipelineMetrics;
use crate::persistence::PreservedFrameDisk;
use crate::quality::QualityFilter;
use crate::selection::select_for_analysis;
use crate::trend::{DirectionCounts, TrendReading, TrendSummary, TrendTracker};
use crate::types::{now_ms, Config, Frame, ViewCategory};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct CameraMonitor {
    config: Config,
    capture: CaptureController,
    quality: QualityFilter,
    classifier: FrameClassifier,
    store: RwLock<FrameStore>,
    health: RwLock<HealthMonitor>,
    trend: RwLock<TrendTracker>,
    persistence: Option<PreservedFrameDisk>,
    metrics: PipelineMetrics,
}

impl CameraMonitor {
    pub fn new(
        config: Config,
        source: Arc<dyn FrameSource>,
        classifier: Arc<dyn ViewClassifier>,
    ) -> Self {
        let persistence = config
            .buffer
            .persist_dir
            .as_ref()
            .map(PreservedFrameDisk::new);

        Self {
            capture: CaptureController::new(source),
            quality: QualityFilter::new(&config.quality),
            classifier: FrameClassifier::new(
                classifier,
                Duration::from_secs(config.classifier.timeout_secs),
            ),
            store: RwLock::new(FrameStore::new(config.buffer.max_buffer_size)),
            health: RwLock::new(HealthMonitor::new(&config.health)),
            trend: RwLock::new(TrendTracker::new(config.trend.clone())),
            persistence,
            metrics: PipelineMetrics::new(),
            config,
        }
    }

    /// Seed the preserved slots from disk. Returns how many frames were restored.
    pub async fn warm_start(&self) -> usize {
        let Some(disk) = &self.persistence else {
            return 0;
        };

        let frames = disk.load_all().await;
        if let Some(max_id) = frames.iter().map(|f| f.frame_id).max() {
            self.capture.reserve_ids_through(max_id);
        }

        let mut store = self.store.write().await;
        let restored = frames
            .into_iter()
            .map(Arc::new)
            .filter(|f| store.preserve(f.clone()))
            .count();
        info!(
            "💾 Warm start: restored {} preserved frame(s) from {}",
            restored,
            disk.dir().display()
        );
        restored
    }

    // ========================================================================
    // REQUEST-SIDE INTERFACE
    // ========================================================================

    /// Grab a fresh frame now, or fall back to the newest buffered frame if a
    /// capture is already running or the grab fails. The fresh frame is not
    /// classified or buffered.
    pub async fn trigger_capture(&self) -> Option<Arc<Frame>> {
        self.metrics.inc(&self.metrics.out_of_band_captures);
        match self.capture.capture(now_ms()).await {
            Ok(frame) => Some(Arc::new(frame)),
            Err(e) => {
                debug!("Out-of-band capture fell back to buffered frame: {}", e);
                self.latest_frame().await
            }
        }
    }

    pub async fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.store.read().await.latest()
    }

    /// Up to three frames for downstream analysis. Empty means no data.
    pub async fn frames_for_analysis(&self) -> Vec<Arc<Frame>> {
        self.frames_for_analysis_at(now_ms()).await
    }

    pub async fn frames_for_analysis_at(&self, now_ms: u64) -> Vec<Arc<Frame>> {
        let store = self.store.read().await;
        select_for_analysis(&store, now_ms, self.config.buffer.fresh_window_secs * 1_000)
    }

    /// Preserved frame still worth showing to a person, under the looser display window.
    pub async fn preserved_for_display(&self, category: ViewCategory) -> Option<Arc<Frame>> {
        self.store
            .read()
            .await
            .preserved(category, now_ms(), self.config.buffer.display_window_secs * 1_000)
    }

    pub async fn health(&self) -> HealthReport {
        self.health.read().await.report(now_ms())
    }

    pub async fn record_detection_reading(
        &self,
        counts: Option<DirectionCounts>,
        pass_id: Option<String>,
    ) -> TrendReading {
        let reading = TrendReading {
            timestamp_ms: now_ms(),
            counts,
            pass_id,
        };
        self.trend.write().await.add_reading(reading.clone());
        self.metrics.inc(&self.metrics.detection_readings);
        reading
    }

    pub async fn trend_summary(&self) -> TrendSummary {
        self.trend.read().await.summarize()
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // SCHEDULER-SIDE WRITES
    // ========================================================================

    pub(crate) fn capture_controller(&self) -> &CaptureController {
        &self.capture
    }

    pub(crate) fn quality_filter(&self) -> &QualityFilter {
        &self.quality
    }

    pub(crate) fn classifier(&self) -> &FrameClassifier {
        &self.classifier
    }

    pub(crate) async fn commit(&self, frame: Frame) -> Option<Commit> {
        let commit = self.store.write().await.commit(frame)?;
        if commit.preserved {
            if let Some(disk) = &self.persistence {
                if let Err(e) = disk.save(&commit.frame).await {
                    warn!("💾 Failed to persist preserved frame: {:#}", e);
                }
            }
        }
        Some(commit)
    }

    /// Apply one update to the health counters, logging any state change.
    pub(crate) async fn update_health<F>(&self, update: F)
    where
        F: FnOnce(&mut HealthMonitor),
    {
        let mut health = self.health.write().await;
        let before = health.state();
        update(&mut health);
        let after = health.state();

        if before != after {
            let report = health.report(now_ms());
            if after == CameraHealthState::Operational {
                info!("🩺 Camera health {:?} -> {:?}", before, after);
            } else {
                warn!(
                    "🩺 Camera health {:?} -> {:?}: {}",
                    before, after, report.advisory
                );
            }
        }
    }
}
