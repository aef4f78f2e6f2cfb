// src/quality.rs
//
// Cheap pre-classification filter. At a fixed output width a sharp JPEG of
// the scene compresses to a fairly predictable size; motion blur, heavy
// fog and black frames compress far smaller. Anything under the cutoff is
// dropped before a classifier call is spent on it.

use crate::types::QualityConfig;
use tracing::debug;

pub struct QualityFilter {
    min_jpeg_bytes: usize,
}

impl QualityFilter {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            min_jpeg_bytes: config.min_jpeg_bytes,
        }
    }

    pub fn is_low_quality(&self, jpeg: &[u8]) -> bool {
        let low = jpeg.len() < self.min_jpeg_bytes;
        if low {
            debug!(
                "Frame rejected by quality filter: {} bytes < {} byte cutoff",
                jpeg.len(),
                self.min_jpeg_bytes
            );
        }
        low
    }
}
