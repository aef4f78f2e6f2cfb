// src/capture.rs
//
// Single-still capture from the live stream.
//
// The grab itself runs as an ffmpeg subprocess bounded by two timeouts:
//   1. ffmpeg's own I/O timeout (`-rw_timeout`), so a stalled stream makes
//      ffmpeg exit on its own with an error
//   2. a hard deadline around the whole child; if it passes, the child is
//      dropped and `kill_on_drop` kills it
//
// Only one grab may be in flight. A second caller does not queue: it gets
// `CaptureError::Busy` straight away and is expected to fall back to the
// newest buffered frame.

use crate::types::{CameraConfig, Frame};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Longest stderr excerpt kept in a `ProcessFailed` error.
const MAX_STDERR_CHARS: usize = 400;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("a capture is already in flight")]
    Busy,
    #[error("failed to spawn frame grabber: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed reading frame grabber output: {0}")]
    Read(#[source] std::io::Error),
    #[error("frame grabber did not finish within {secs}s")]
    Timeout { secs: u64 },
    #[error("frame grabber exited with status {code:?}: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },
    #[error("frame grabber produced no output")]
    EmptyOutput,
    #[error("frame grabber output is not a recognisable image")]
    InvalidImage,
}

impl CaptureError {
    /// Busy is load shedding, not a fault of the camera.
    pub fn is_source_failure(&self) -> bool {
        !matches!(self, CaptureError::Busy)
    }
}

/// Anything that can produce one encoded still on demand.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn grab(&self) -> Result<Vec<u8>, CaptureError>;
}

// ============================================================================
// FFMPEG SOURCE
// ============================================================================

pub struct FfmpegSource {
    ffmpeg_path: String,
    stream_url: String,
    frame_width: u32,
    jpeg_quality: u8,
    process_timeout: Duration,
    hard_timeout: Duration,
}

impl FfmpegSource {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            stream_url: config.stream_url.clone(),
            frame_width: config.frame_width,
            jpeg_quality: config.jpeg_quality,
            process_timeout: Duration::from_secs(config.process_timeout_secs),
            hard_timeout: Duration::from_secs(config.hard_timeout_secs),
        }
    }

    fn build_args(&self) -> Vec<String> {
        let io_timeout_us = self.process_timeout.as_micros().to_string();
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-rw_timeout".to_string(),
            io_timeout_us.clone(),
        ];
        // The RTSP demuxer ignores -rw_timeout for its socket; it reads -timeout.
        if self.is_rtsp() {
            args.push("-timeout".to_string());
            args.push(io_timeout_us);
        }
        args.extend([
            "-i".to_string(),
            self.stream_url.clone(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale={}:-2", self.frame_width),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-vcodec".to_string(),
            "mjpeg".to_string(),
            "-q:v".to_string(),
            self.jpeg_quality.to_string(),
            "-".to_string(),
        ]);
        args
    }

    fn is_rtsp(&self) -> bool {
        let url = self.stream_url.to_ascii_lowercase();
        url.starts_with("rtsp://") || url.starts_with("rtsps://")
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    async fn grab(&self) -> Result<Vec<u8>, CaptureError> {
        debug!("capture: ffmpeg single frame from {}", self.stream_url);

        let child = Command::new(&self.ffmpeg_path)
            .args(self.build_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(CaptureError::Spawn)?;

        // On timeout the wait future is dropped with the child inside it,
        // which kills the process.
        let output = match tokio::time::timeout(self.hard_timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(CaptureError::Read(e)),
            Err(_) => {
                return Err(CaptureError::Timeout {
                    secs: self.hard_timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(MAX_STDERR_CHARS)
                .collect();
            return Err(CaptureError::ProcessFailed {
                code: output.status.code(),
                stderr,
            });
        }

        validate_image(output.stdout)
    }
}

fn validate_image(bytes: Vec<u8>) -> Result<Vec<u8>, CaptureError> {
    if bytes.is_empty() {
        return Err(CaptureError::EmptyOutput);
    }
    if image::guess_format(&bytes).is_err() {
        return Err(CaptureError::InvalidImage);
    }
    Ok(bytes)
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct CaptureController {
    source: Arc<dyn FrameSource>,
    in_flight: Semaphore,
    next_frame_id: AtomicU64,
}

impl CaptureController {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            in_flight: Semaphore::new(1),
            next_frame_id: AtomicU64::new(0),
        }
    }

    /// Grab one frame stamped with `captured_at_ms`.
    ///
    /// Returns `CaptureError::Busy` without waiting if another grab holds the
    /// single in-flight slot.
    pub async fn capture(&self, captured_at_ms: u64) -> Result<Frame, CaptureError> {
        let _permit = self
            .in_flight
            .try_acquire()
            .map_err(|_| CaptureError::Busy)?;

        match self.source.grab().await {
            Ok(jpeg) => {
                let frame_id = self.next_frame_id.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("📷 Captured frame {} ({} bytes)", frame_id, jpeg.len());
                Ok(Frame::new(frame_id, captured_at_ms, jpeg))
            }
            Err(e) => {
                warn!("📷 Capture failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    /// Make sure future frame ids are greater than `frame_id`.
    pub fn reserve_ids_through(&self, frame_id: u64) {
        self.next_frame_id.fetch_max(frame_id, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{jpeg_bytes, GatedSource, ScriptedSource};

    #[test]
    fn test_ffmpeg_args() {
        let config = CameraConfig {
            stream_url: "rtsp://cam.local/stream".to_string(),
            frame_width: 960,
            jpeg_quality: 4,
            process_timeout_secs: 10,
            hard_timeout_secs: 12,
            ..CameraConfig::default()
        };
        let args = FfmpegSource::new(&config).build_args();

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-rw_timeout") + 1], "10000000");
        assert_eq!(args[pos("-i") + 1], "rtsp://cam.local/stream");
        assert_eq!(args[pos("-frames:v") + 1], "1");
        assert_eq!(args[pos("-vf") + 1], "scale=960:-2");
        assert_eq!(args[pos("-q:v") + 1], "4");
        assert_eq!(args.last().unwrap(), "-");
        // RTSP socket timeout goes before the input.
        assert_eq!(args[pos("-timeout") + 1], "10000000");
        assert!(pos("-timeout") < pos("-i"));
    }

    #[test]
    fn test_socket_timeout_only_for_rtsp() {
        let config = CameraConfig {
            stream_url: "https://cam.local/live.m3u8".to_string(),
            ..CameraConfig::default()
        };
        let args = FfmpegSource::new(&config).build_args();
        assert!(args.iter().any(|a| a == "-rw_timeout"));
        assert!(!args.iter().any(|a| a == "-timeout"));

        let upper = CameraConfig {
            stream_url: "RTSPS://cam.local/stream".to_string(),
            ..CameraConfig::default()
        };
        assert!(FfmpegSource::new(&upper)
            .build_args()
            .iter()
            .any(|a| a == "-timeout"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_grabber_is_killed_at_hard_timeout() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Instant;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = CameraConfig {
            ffmpeg_path: script.to_string_lossy().into_owned(),
            stream_url: "rtsp://127.0.0.1:1/never".to_string(),
            process_timeout_secs: 1,
            hard_timeout_secs: 2,
            ..CameraConfig::default()
        };
        let source = FfmpegSource::new(&config);

        let started = Instant::now();
        let result = source.grab().await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(CaptureError::Timeout { secs: 2 })));
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(10), "took {:?}", elapsed);
    }

    #[test]
    fn test_validate_image() {
        assert!(matches!(validate_image(Vec::new()), Err(CaptureError::EmptyOutput)));
        assert!(matches!(
            validate_image(b"not an image".to_vec()),
            Err(CaptureError::InvalidImage)
        ));
        assert!(validate_image(jpeg_bytes(64)).is_ok());
    }

    #[tokio::test]
    async fn test_frame_ids_increase() {
        let source = ScriptedSource::new(vec![Some(jpeg_bytes(10)), Some(jpeg_bytes(10))]);
        let controller = CaptureController::new(Arc::new(source));

        let a = controller.capture(1_000).await.unwrap();
        let b = controller.capture(2_000).await.unwrap();
        assert!(b.frame_id > a.frame_id);
        assert_eq!(a.captured_at_ms, 1_000);
        assert!(a.category.is_none());
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let source = ScriptedSource::new(vec![None]);
        let controller = CaptureController::new(Arc::new(source));

        let err = controller.capture(1_000).await.unwrap_err();
        assert!(err.is_source_failure());
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_concurrent_capture_is_shed() {
        let source = Arc::new(GatedSource::new(jpeg_bytes(32)));
        let controller = Arc::new(CaptureController::new(source.clone()));

        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.capture(1_000).await })
        };
        while !controller.is_busy() {
            tokio::task::yield_now().await;
        }

        let second = controller.capture(1_001).await;
        assert!(matches!(second, Err(CaptureError::Busy)));
        assert!(!CaptureError::Busy.is_source_failure());

        source.release();
        let frame = first.await.unwrap().unwrap();
        assert_eq!(frame.captured_at_ms, 1_000);
        assert!(!controller.is_busy());
    }
}
