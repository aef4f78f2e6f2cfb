// src/persistence.rs
//
// Optional on-disk copy of the preserved frames so a restart does not come
// up blind. One JPEG plus one JSON sidecar per category:
//
//   <dir>/bridge.jpg   <dir>/bridge.json
//
// The sidecar is written last and records the JPEG length, so a torn write
// is detected on load and the pair is skipped. Nothing here is required for
// correctness; every failure is logged and otherwise ignored by callers.

use crate::types::{Frame, ViewCategory};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreservedFrameMeta {
    frame_id: u64,
    captured_at_ms: u64,
    category: ViewCategory,
    byte_size: usize,
}

pub struct PreservedFrameDisk {
    dir: PathBuf,
}

impl PreservedFrameDisk {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn save(&self, frame: &Frame) -> Result<()> {
        let Some(category) = frame.category.filter(|c| c.is_useful()) else {
            bail!("frame {} has no preservable category", frame.frame_id);
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let (jpg_path, json_path) = self.paths(category);
        tokio::fs::write(&jpg_path, &frame.jpeg_data)
            .await
            .with_context(|| format!("writing {}", jpg_path.display()))?;

        let meta = PreservedFrameMeta {
            frame_id: frame.frame_id,
            captured_at_ms: frame.captured_at_ms,
            category,
            byte_size: frame.byte_size(),
        };
        tokio::fs::write(&json_path, serde_json::to_vec_pretty(&meta)?)
            .await
            .with_context(|| format!("writing {}", json_path.display()))?;

        debug!("💾 Saved preserved {} frame {}", category, frame.frame_id);
        Ok(())
    }

    /// Load every intact preserved frame. Missing or damaged pairs are skipped.
    pub async fn load_all(&self) -> Vec<Frame> {
        let mut frames = Vec::new();
        for category in ViewCategory::ANALYSIS_ORDER {
            match self.load(category).await {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {}
                Err(e) => warn!("💾 Skipping preserved {} frame: {:#}", category, e),
            }
        }
        frames
    }

    async fn load(&self, category: ViewCategory) -> Result<Option<Frame>> {
        let (jpg_path, json_path) = self.paths(category);
        if !tokio::fs::try_exists(&json_path).await.unwrap_or(false) {
            return Ok(None);
        }

        let meta: PreservedFrameMeta = serde_json::from_slice(
            &tokio::fs::read(&json_path)
                .await
                .with_context(|| format!("reading {}", json_path.display()))?,
        )
        .with_context(|| format!("parsing {}", json_path.display()))?;
        let jpeg_data = tokio::fs::read(&jpg_path)
            .await
            .with_context(|| format!("reading {}", jpg_path.display()))?;

        if meta.category != category {
            bail!("sidecar says {}, expected {}", meta.category, category);
        }
        if jpeg_data.len() != meta.byte_size {
            bail!(
                "image is {} bytes, sidecar recorded {}",
                jpeg_data.len(),
                meta.byte_size
            );
        }

        Ok(Some(
            Frame::new(meta.frame_id, meta.captured_at_ms, jpeg_data).classified(category),
        ))
    }

    fn paths(&self, category: ViewCategory) -> (PathBuf, PathBuf) {
        (
            self.dir.join(format!("{}.jpg", category.as_str())),
            self.dir.join(format!("{}.json", category.as_str())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::frame;

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let disk = PreservedFrameDisk::new(dir.path().join("preserved"));

        disk.save(&frame(4, 1_000, ViewCategory::BridgeView)).await.unwrap();
        disk.save(&frame(9, 2_000, ViewCategory::WideView)).await.unwrap();

        let loaded = disk.load_all().await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], frame(4, 1_000, ViewCategory::BridgeView));
        assert_eq!(loaded[1].category, Some(ViewCategory::WideView));
        assert_eq!(loaded[1].captured_at_ms, 2_000);
    }

    #[tokio::test]
    async fn test_useless_frame_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let disk = PreservedFrameDisk::new(dir.path());

        assert!(disk.save(&frame(1, 1, ViewCategory::Useless)).await.is_err());
        assert!(disk.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_torn_write_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let disk = PreservedFrameDisk::new(dir.path());
        disk.save(&frame(2, 500, ViewCategory::ProcessingView)).await.unwrap();

        std::fs::write(dir.path().join("processing.jpg"), b"short").unwrap();
        assert!(disk.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_dir_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let disk = PreservedFrameDisk::new(dir.path().join("never-created"));
        assert!(disk.load_all().await.is_empty());
    }
}
