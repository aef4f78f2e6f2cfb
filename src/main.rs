// src/main.rs

use anyhow::Result;
use crossing_cam::capture::FfmpegSource;
use crossing_cam::classifier::HttpViewClassifier;
use crossing_cam::detector::{run_analysis_loop, HttpVehicleDetector};
use crossing_cam::monitor::CameraMonitor;
use crossing_cam::scheduler::CaptureScheduler;
use crossing_cam::types::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("📷 Crossing camera monitor starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Stream: {} | classifier: {} | detector: {}",
        config.camera.stream_url,
        config.classifier.url,
        if config.detector.enabled {
            config.detector.url.as_str()
        } else {
            "disabled"
        }
    );

    let source = Arc::new(FfmpegSource::new(&config.camera));
    let classifier = Arc::new(HttpViewClassifier::new(&config.classifier)?);
    let detector = if config.detector.enabled {
        Some(Arc::new(HttpVehicleDetector::new(&config.detector)?))
    } else {
        None
    };

    let monitor = Arc::new(CameraMonitor::new(config.clone(), source, classifier));
    monitor.warm_start().await;

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(
        CaptureScheduler::new(monitor.clone()).run(stop_rx.clone()),
    ));

    if let Some(detector) = detector {
        tasks.push(tokio::spawn(run_analysis_loop(
            monitor.clone(),
            detector,
            Duration::from_secs(config.scheduler.analysis_interval_secs.max(1)),
            stop_rx.clone(),
        )));
    }

    tasks.push(tokio::spawn(log_status(
        monitor.clone(),
        Duration::from_secs(config.scheduler.metrics_log_interval_secs.max(1)),
        stop_rx,
    )));

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutdown requested");
    stop_tx.send(true)?;

    for task in tasks {
        if let Err(e) = task.await {
            error!("Background task ended abnormally: {}", e);
        }
    }

    let summary = monitor.metrics().summary();
    info!(
        "✓ Stopped after {:.0}s: {} ticks, {} commits, {} capture failures",
        summary.elapsed_secs, summary.ticks, summary.commits, summary.capture_failures
    );
    Ok(())
}

/// Periodic metrics and health summary.
async fn log_status(
    monitor: Arc<CameraMonitor>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so the first summary has data.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let summary = monitor.metrics().summary();
                let health = monitor.health().await;
                info!("\n========================================");
                info!("📊 Pipeline status");
                info!(
                    "  Ticks: {} (busy skips: {}, worst tick: {}ms)",
                    summary.ticks, summary.busy_skips, summary.worst_tick_ms
                );
                info!(
                    "  Captures: {} ok, {} failed, {} low quality",
                    summary.captures, summary.capture_failures, summary.low_quality_drops
                );
                info!(
                    "  Classifier: {} tagged ({:.1}% useless), {} contended, {} failed",
                    summary.classifications,
                    summary.useless_ratio * 100.0,
                    summary.classifier_contended,
                    summary.classifier_failures
                );
                info!(
                    "  Commits: {} ({} refresh), {} duplicates discarded",
                    summary.commits, summary.refresh_commits, summary.duplicate_discards
                );
                if summary.detection_readings > 0 {
                    let trend = monitor.trend_summary().await;
                    info!(
                        "  Trend: {:?} ({:?}), {} readings, {} detector failures",
                        trend.flow_speed,
                        trend.confidence,
                        summary.detection_readings,
                        summary.detector_failures
                    );
                }
                info!("  Health: {:?} - {}", health.state, health.advisory);
                info!("========================================\n");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
