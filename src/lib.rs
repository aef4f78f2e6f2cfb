// src/lib.rs

pub mod capture;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod frame_buffer;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod persistence;
pub mod quality;
pub mod scheduler;
pub mod selection;
pub mod trend;
pub mod types;

#[cfg(test)]
mod test_util;
