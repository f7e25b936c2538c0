//! Scan Simulation - optional external harness
//!
//! A harness rasterises the rendered artifact under degraded conditions and
//! tries to decode it. It may block, so [`ScanRunner`] runs it on a worker
//! thread bounded by a timeout. A missing harness is never an error for
//! the request; the processor turns it into an informational note.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::config::RenderingConfig;
use crate::render::RenderError;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("No scan harness available")]
    Unavailable,

    #[error("Scan simulation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Scan harness failed: {0}")]
    Harness(String),
}

/// One degraded capture condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanCondition {
    Rotation { degrees: f64 },
    Blur { radius: f64 },
    ContrastShift { factor: f64 },
    BrightnessShift { delta: f64 },
    Dpi { dpi: u32 },
}

pub fn default_battery() -> Vec<ScanCondition> {
    vec![
        ScanCondition::Rotation { degrees: 0.0 },
        ScanCondition::Rotation { degrees: 15.0 },
        ScanCondition::Rotation { degrees: 45.0 },
        ScanCondition::Blur { radius: 0.5 },
        ScanCondition::Blur { radius: 1.0 },
        ScanCondition::ContrastShift { factor: 0.7 },
        ScanCondition::BrightnessShift { delta: 0.2 },
        ScanCondition::BrightnessShift { delta: -0.2 },
        ScanCondition::Dpi { dpi: 72 },
        ScanCondition::Dpi { dpi: 150 },
        ScanCondition::Dpi { dpi: 300 },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionOutcome {
    pub condition: ScanCondition,
    pub decoded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub meets_threshold: bool,
    pub success_rate: f64,
    pub details: Vec<ConditionOutcome>,
}

impl ScanReport {
    pub fn from_outcomes(details: Vec<ConditionOutcome>, min_success_rate: f64) -> Self {
        let success_rate = if details.is_empty() {
            0.0
        } else {
            details.iter().filter(|d| d.decoded).count() as f64 / details.len() as f64
        };
        Self { meets_threshold: success_rate >= min_success_rate, success_rate, details }
    }
}

pub type RenderFn = dyn Fn(&RenderingConfig) -> Result<String, RenderError> + Send + Sync;

pub trait ScanHarness: Send + Sync {
    fn validate_threshold(
        &self,
        config: &RenderingConfig,
        min_success_rate: f64,
        payload: &str,
        render: &RenderFn,
    ) -> Result<ScanReport, ScanError>;

    fn conditions(&self) -> Vec<ScanCondition> {
        default_battery()
    }
}

pub struct ScanRunner {
    harness: Arc<dyn ScanHarness>,
    timeout: Duration,
}

impl ScanRunner {
    pub fn new(harness: Arc<dyn ScanHarness>, timeout: Duration) -> Self {
        Self { harness, timeout }
    }

    /// Run the harness on a worker thread. A harness still running at the
    /// deadline is abandoned, not interrupted.
    pub fn run(
        &self,
        config: RenderingConfig,
        min_success_rate: f64,
        payload: String,
        render: Box<RenderFn>,
    ) -> Result<ScanReport, ScanError> {
        let (tx, rx) = mpsc::channel();
        let harness = Arc::clone(&self.harness);
        thread::Builder::new()
            .name("qr-scan".to_string())
            .spawn(move || {
                let result = harness.validate_threshold(&config, min_success_rate, &payload, &*render);
                // Receiver is gone after a timeout.
                let _ = tx.send(result);
            })
            .map_err(|e| ScanError::Harness(e.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "scan simulation timed out");
                Err(ScanError::TimedOut(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(ScanError::Harness("scan worker exited without a result".to_string()))
            }
        }
    }
}
