// src/classifier.rs
//
// View classification. The rest of the pipeline only ever sees a
// `ViewCategory`: backend errors, timeouts and contention all collapse to
// `Useless`, and none of them count as capture failures.
//
// Like capture, classification is single-flight. A request that finds the
// slot taken is answered `Useless` immediately instead of waiting.

use crate::types::{ClassifierConfig, ViewCategory};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Labels the remote classifier is asked to choose from.
const LABELS: [&str; 4] = ["bridge", "processing", "wide", "useless"];

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("classifier returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not interpret classifier response: {0}")]
    Parse(String),
    #[error("classifier did not answer within {secs}s")]
    Timeout { secs: u64 },
}

#[async_trait]
pub trait ViewClassifier: Send + Sync {
    async fn classify(&self, jpeg: &[u8]) -> Result<ViewCategory, ClassifierError>;
}

// ============================================================================
// HTTP BACKEND
// ============================================================================

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    request_id: String,
    image_base64: String,
    labels: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    category: String,
    #[serde(default)]
    confidence: Option<f32>,
}

pub struct HttpViewClassifier {
    http_client: reqwest::Client,
    server_url: String,
}

impl HttpViewClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build classifier HTTP client")?;

        Ok(Self {
            http_client,
            server_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ViewClassifier for HttpViewClassifier {
    async fn classify(&self, jpeg: &[u8]) -> Result<ViewCategory, ClassifierError> {
        let url = format!("{}/classify", self.server_url);
        let request = ClassifyRequest {
            request_id: uuid::Uuid::new_v4().to_string(),
            image_base64: base64::engine::general_purpose::STANDARD.encode(jpeg),
            labels: &LABELS,
        };

        let response = self.http_client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Status { status, body });
        }

        let parsed: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;
        let category = ViewCategory::from_label(&parsed.category);
        debug!(
            "🔍 Classifier {}: label={} -> {} (confidence={:?})",
            request.request_id, parsed.category, category, parsed.confidence
        );
        Ok(category)
    }
}

// ============================================================================
// SINGLE-FLIGHT GATE
// ============================================================================

/// What happened to one classification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Tagged(ViewCategory),
    /// Another classification held the slot.
    Contended,
    /// Backend error or timeout.
    Failed,
}

impl Classification {
    pub fn category(&self) -> ViewCategory {
        match self {
            Classification::Tagged(category) => *category,
            Classification::Contended | Classification::Failed => ViewCategory::Useless,
        }
    }
}

pub struct FrameClassifier {
    backend: Arc<dyn ViewClassifier>,
    in_flight: Semaphore,
    timeout: Duration,
}

impl FrameClassifier {
    pub fn new(backend: Arc<dyn ViewClassifier>, timeout: Duration) -> Self {
        Self {
            backend,
            in_flight: Semaphore::new(1),
            timeout,
        }
    }

    pub async fn classify(&self, jpeg: &[u8]) -> Classification {
        let Ok(_permit) = self.in_flight.try_acquire() else {
            warn!("🔍 Classifier busy, treating frame as useless");
            return Classification::Contended;
        };

        match tokio::time::timeout(self.timeout, self.backend.classify(jpeg)).await {
            Ok(Ok(category)) => Classification::Tagged(category),
            Ok(Err(e)) => {
                warn!("🔍 Classification failed, treating frame as useless: {}", e);
                Classification::Failed
            }
            Err(_) => {
                let e = ClassifierError::Timeout {
                    secs: self.timeout.as_secs(),
                };
                warn!("🔍 {}, treating frame as useless", e);
                Classification::Failed
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.available_permits() == 0
    }
}
