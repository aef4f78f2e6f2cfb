// src/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub quality: QualityConfig,
    pub classifier: ClassifierConfig,
    pub detector: DetectorConfig,
    pub buffer: BufferConfig,
    pub scheduler: SchedulerConfig,
    pub health: HealthConfig,
    pub trend: TrendConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub stream_url: String,
    pub ffmpeg_path: String,
    /// Output width in pixels; height follows the source aspect ratio.
    pub frame_width: u32,
    /// ffmpeg `-q:v` value (2 = best, 31 = worst).
    pub jpeg_quality: u8,
    /// Passed to ffmpeg as its own I/O timeout.
    pub process_timeout_secs: u64,
    /// Hard kill deadline for the whole subprocess. Must exceed `process_timeout_secs`.
    pub hard_timeout_secs: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            stream_url: String::new(),
            ffmpeg_path: "ffmpeg".to_string(),
            frame_width: 1280,
            jpeg_quality: 3,
            process_timeout_secs: 15,
            hard_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// JPEGs smaller than this at `frame_width` are treated as blurred or blacked out.
    pub min_jpeg_bytes: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_jpeg_bytes: 20_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:8081".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub max_buffer_size: usize,
    /// Preserved frames older than this are not used for automated analysis.
    pub fresh_window_secs: u64,
    /// Preserved frames older than this are no longer worth showing at all.
    pub display_window_secs: u64,
    pub persist_dir: Option<String>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 20,
            fresh_window_secs: 600,
            display_window_secs: 3600,
            persist_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    /// Re-commit an unchanged angle once its last commit is older than this.
    pub refresh_after_secs: u64,
    pub analysis_interval_secs: u64,
    pub metrics_log_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 20,
            refresh_after_secs: 180,
            analysis_interval_secs: 60,
            metrics_log_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub failure_threshold: u32,
    pub stuck_threshold: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            stuck_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub window_size: usize,
    pub sub_window: usize,
    /// Per-direction deltas within +/- this value are `stable`.
    pub dead_band: i64,
    pub slow_mean: f64,
    pub very_slow_mean: f64,
    pub high_variance: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_size: 12,
            sub_window: 5,
            dead_band: 2,
            slow_mean: 8.0,
            very_slow_mean: 15.0,
            high_variance: 6.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "crossing_cam=info".to_string(),
        }
    }
}

// ============================================================================
// FRAMES
// ============================================================================

/// Semantic camera angle a frame shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewCategory {
    BridgeView,
    ProcessingView,
    WideView,
    Useless,
}

impl ViewCategory {
    /// Priority order used when picking frames for analysis.
    pub const ANALYSIS_ORDER: [ViewCategory; 3] = [
        ViewCategory::BridgeView,
        ViewCategory::ProcessingView,
        ViewCategory::WideView,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BridgeView => "bridge",
            Self::ProcessingView => "processing",
            Self::WideView => "wide",
            Self::Useless => "useless",
        }
    }

    /// Map a classifier label onto a category. Unknown labels are `Useless`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "bridge" | "bridge_view" => Self::BridgeView,
            "processing" | "processing_view" => Self::ProcessingView,
            "wide" | "wide_view" => Self::WideView,
            _ => Self::Useless,
        }
    }

    pub fn is_useful(&self) -> bool {
        *self != Self::Useless
    }

    /// Rank in `ANALYSIS_ORDER`; `Useless` sorts last.
    pub fn priority_rank(&self) -> usize {
        Self::ANALYSIS_ORDER
            .iter()
            .position(|c| c == self)
            .unwrap_or(Self::ANALYSIS_ORDER.len())
    }
}

impl fmt::Display for ViewCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured still. Never mutated once built; classification produces a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_id: u64,
    pub captured_at_ms: u64,
    /// `None` until the classifier has tagged it.
    pub category: Option<ViewCategory>,
    pub jpeg_data: Vec<u8>,
}

impl Frame {
    pub fn new(frame_id: u64, captured_at_ms: u64, jpeg_data: Vec<u8>) -> Self {
        Self {
            frame_id,
            captured_at_ms,
            category: None,
            jpeg_data,
        }
    }

    pub fn classified(self, category: ViewCategory) -> Self {
        Self {
            category: Some(category),
            ..self
        }
    }

    pub fn byte_size(&self) -> usize {
        self.jpeg_data.len()
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.captured_at_ms)
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
