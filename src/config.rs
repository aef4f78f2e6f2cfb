use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let mut config: Config =
            serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Endpoint URLs may be injected from the environment so one config file
    /// can serve several deployments.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CAMERA_STREAM_URL") {
            self.camera.stream_url = url;
        }
        if let Ok(url) = std::env::var("CLASSIFIER_URL") {
            self.classifier.url = url;
        }
        if let Ok(url) = std::env::var("DETECTOR_URL") {
            self.detector.url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.hard_timeout_secs <= self.camera.process_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "camera.hard_timeout_secs ({}) must be greater than camera.process_timeout_secs ({})",
                self.camera.hard_timeout_secs, self.camera.process_timeout_secs
            )));
        }
        if self.buffer.max_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "buffer.max_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.buffer.display_window_secs < self.buffer.fresh_window_secs {
            return Err(ConfigError::Invalid(
                "buffer.display_window_secs must not be shorter than buffer.fresh_window_secs"
                    .to_string(),
            ));
        }
        if self.health.failure_threshold == 0 || self.health.stuck_threshold == 0 {
            return Err(ConfigError::Invalid(
                "health thresholds must be at least 1".to_string(),
            ));
        }
        if self.trend.sub_window < 2 || self.trend.sub_window > self.trend.window_size {
            return Err(ConfigError::Invalid(format!(
                "trend.sub_window ({}) must be between 2 and trend.window_size ({})",
                self.trend.sub_window, self.trend.window_size
            )));
        }
        if self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.tick_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
