// src/detector.rs
//
// External vehicle detector and the periodic detection pass that feeds the
// trend window. The detector is allowed to be unavailable: a failed or
// empty answer is still recorded, as a reading with no counts, so the trend
// degrades to low confidence instead of silently going stale.

use crate::monitor::CameraMonitor;
use crate::trend::{DirectionCounts, TrendReading};
use crate::types::DetectorConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("detector returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("detector did not answer within {secs}s")]
    Timeout { secs: u64 },
}

#[async_trait]
pub trait VehicleDetector: Send + Sync {
    /// Per-direction vehicle counts for one frame, or `None` if the detector
    /// could not produce any.
    async fn detect(
        &self,
        jpeg: &[u8],
        pass_id: &str,
    ) -> Result<Option<DirectionCounts>, DetectorError>;
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    request_id: &'a str,
    image_base64: String,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    counts: Option<DirectionCounts>,
}

pub struct HttpVehicleDetector {
    http_client: reqwest::Client,
    server_url: String,
}

impl HttpVehicleDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build detector HTTP client")?;

        Ok(Self {
            http_client,
            server_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl VehicleDetector for HttpVehicleDetector {
    async fn detect(
        &self,
        jpeg: &[u8],
        pass_id: &str,
    ) -> Result<Option<DirectionCounts>, DetectorError> {
        let url = format!("{}/detect", self.server_url);
        let request = DetectRequest {
            request_id: pass_id,
            image_base64: base64::engine::general_purpose::STANDARD.encode(jpeg),
        };

        let response = self.http_client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::Status { status, body });
        }

        let parsed: DetectResponse = response.json().await?;
        Ok(parsed.counts)
    }
}

/// Run the detector on the newest frame of the current analysis selection
/// and record the result. Returns `None` only when there is no frame to
/// look at.
pub async fn run_detection_pass(
    monitor: &CameraMonitor,
    detector: &dyn VehicleDetector,
) -> Option<TrendReading> {
    let frames = monitor.frames_for_analysis().await;
    let newest = frames.iter().max_by_key(|f| f.captured_at_ms)?;

    let pass_id = uuid::Uuid::new_v4().to_string();
    let timeout = Duration::from_secs(monitor.config().detector.timeout_secs);

    let counts = match tokio::time::timeout(timeout, detector.detect(&newest.jpeg_data, &pass_id))
        .await
    {
        Ok(Ok(counts)) => counts,
        Ok(Err(e)) => {
            record_failure(monitor, &e);
            None
        }
        Err(_) => {
            record_failure(
                monitor,
                &DetectorError::Timeout {
                    secs: timeout.as_secs(),
                },
            );
            None
        }
    };

    debug!(
        "🚗 Detection pass {} on frame {}: {:?}",
        pass_id, newest.frame_id, counts
    );
    Some(monitor.record_detection_reading(counts, Some(pass_id)).await)
}

fn record_failure(monitor: &CameraMonitor, error: &DetectorError) {
    let metrics = monitor.metrics();
    metrics.inc(&metrics.detector_failures);
    warn!("🚗 Detector unavailable, recording empty reading: {}", error);
}

/// Periodic detection passes until `shutdown` flips to true.
pub async fn run_analysis_loop(
    monitor: Arc<CameraMonitor>,
    detector: Arc<dyn VehicleDetector>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("🚗 Detection loop started (every {:?})", every);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if run_detection_pass(&monitor, detector.as_ref()).await.is_some() {
                    let summary = monitor.trend_summary().await;
                    debug!(
                        "🚗 Trend: {:?} ({:?}, {} samples)",
                        summary.flow_speed, summary.confidence, summary.samples
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("🚗 Detection loop stopped");
}
