// Shared fakes for unit tests. Nothing here touches the network or spawns processes.

use crate::capture::{CaptureError, FrameSource};
use crate::classifier::{ClassifierError, ViewClassifier};
use crate::types::{Frame, ViewCategory};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Bytes that start with a JPEG SOI marker followed by `len` filler bytes.
pub fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.resize(4 + len, 0x42);
    bytes
}

pub fn frame(frame_id: u64, captured_at_ms: u64, category: ViewCategory) -> Frame {
    Frame::new(frame_id, captured_at_ms, jpeg_bytes(16)).classified(category)
}

/// Plays back a fixed list of grabs; `None` is a failed grab. Fails once exhausted.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Option<Vec<u8>>>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Option<Vec<u8>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn grab(&self) -> Result<Vec<u8>, CaptureError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Some(bytes)) => Ok(bytes),
            Some(None) => Err(CaptureError::ProcessFailed {
                code: Some(1),
                stderr: "scripted failure".to_string(),
            }),
            None => Err(CaptureError::EmptyOutput),
        }
    }
}

/// Blocks every grab until `release` is called.
pub struct GatedSource {
    bytes: Vec<u8>,
    gate: Notify,
}

impl GatedSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            gate: Notify::new(),
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl FrameSource for GatedSource {
    async fn grab(&self) -> Result<Vec<u8>, CaptureError> {
        self.gate.notified().await;
        Ok(self.bytes.clone())
    }
}

/// Plays back a fixed list of classifications; `None` is a backend error.
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Option<ViewCategory>>>,
}

impl ScriptedClassifier {
    pub fn new(script: Vec<Option<ViewCategory>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }

    pub fn repeating(category: ViewCategory, times: usize) -> Self {
        Self::new(vec![Some(category); times])
    }
}

#[async_trait]
impl ViewClassifier for ScriptedClassifier {
    async fn classify(&self, _jpeg: &[u8]) -> Result<ViewCategory, ClassifierError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Some(category)) => Ok(category),
            Some(None) => Err(ClassifierError::Parse("scripted failure".to_string())),
            None => Err(ClassifierError::Parse("script exhausted".to_string())),
        }
    }
}

/// Blocks every classification until `release` is called.
pub struct GatedClassifier {
    category: ViewCategory,
    gate: Notify,
}

impl GatedClassifier {
    pub fn new(category: ViewCategory) -> Self {
        Self {
            category,
            gate: Notify::new(),
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl ViewClassifier for GatedClassifier {
    async fn classify(&self, _jpeg: &[u8]) -> Result<ViewCategory, ClassifierError> {
        self.gate.notified().await;
        Ok(self.category)
    }
}
