//! Audit Records and Result Models
//!
//! Built fresh per request and never mutated once handed out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::intents::IntentCategory;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Accepted,
    Modified,
    Degraded,
    Rejected,
}

impl StepOutcome {
    pub fn confidence(self) -> f64 {
        match self {
            Self::Accepted => 1.0,
            Self::Modified => 0.8,
            Self::Degraded => 0.6,
            Self::Rejected => 0.0,
        }
    }
}

/// How one intent field was processed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformationStep {
    pub path: String,
    pub original_value: Value,
    pub transformed_value: Value,
    pub outcome: StepOutcome,
    pub reason: String,
    pub confidence: f64,
}

impl TransformationStep {
    pub fn new(
        path: impl Into<String>,
        original_value: Value,
        transformed_value: Value,
        outcome: StepOutcome,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            original_value,
            transformed_value,
            outcome,
            reason: reason.into(),
            confidence: outcome.confidence(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}

/// Stable warning codes.
pub mod codes {
    pub const UNSUPPORTED_INTENT: &str = "UNSUPPORTED_INTENT";
    pub const VALUE_CLAMPED: &str = "VALUE_CLAMPED";
    pub const INVALID_VALUE: &str = "INVALID_VALUE";
    pub const MISSING_DEPENDENCY: &str = "MISSING_DEPENDENCY";
    pub const COLOR_ALPHA_DROPPED: &str = "COLOR_ALPHA_DROPPED";
    pub const CONFIG_BUILD_FAILED: &str = "CONFIG_BUILD_FAILED";
    pub const DEGRADATION_APPLIED: &str = "DEGRADATION_APPLIED";
    pub const DEGRADATION_ADVISORY: &str = "DEGRADATION_ADVISORY";
    pub const SAFETY_ERROR: &str = "SAFETY_ERROR";
    pub const SAFETY_WARNING: &str = "SAFETY_WARNING";
    pub const SAFETY_FIX_APPLIED: &str = "SAFETY_FIX_APPLIED";
    pub const ERROR_CORRECTION_RAISED: &str = "ERROR_CORRECTION_RAISED";
    pub const SCAN_HARNESS_UNAVAILABLE: &str = "SCAN_HARNESS_UNAVAILABLE";
    pub const SCAN_THRESHOLD_NOT_MET: &str = "SCAN_THRESHOLD_NOT_MET";
    pub const SVG_SIZE_EXCEEDED: &str = "SVG_SIZE_EXCEEDED";
}

/// User-facing, machine-readable warning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarningInfo {
    pub code: String,
    pub path: String,
    pub detail: String,
    pub suggestion: Option<String>,
    pub severity: WarningSeverity,
}

impl WarningInfo {
    pub fn new(
        code: &str,
        path: impl Into<String>,
        detail: impl Into<String>,
        severity: WarningSeverity,
    ) -> Self {
        Self {
            code: code.to_string(),
            path: path.into(),
            detail: detail.into(),
            suggestion: None,
            severity,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Whether a requested feature is available, and what to use instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompatibilityInfo {
    pub feature: String,
    pub requested: Value,
    pub supported: bool,
    pub alternatives: Vec<String>,
}

/// One configuration change made for safety.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DegradationDetail {
    pub feature: String,
    pub rule: String,
    pub original_value: Value,
    pub degraded_value: Value,
    pub reason: String,
    pub applied: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryImpact {
    pub accepted: usize,
    pub modified: usize,
    pub degraded: usize,
    pub rejected: usize,
}

impl CategoryImpact {
    fn record(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Accepted => self.accepted += 1,
            StepOutcome::Modified => self.modified += 1,
            StepOutcome::Degraded => self.degraded += 1,
            StepOutcome::Rejected => self.rejected += 1,
        }
    }

    fn total(&self) -> usize {
        self.accepted + self.modified + self.degraded + self.rejected
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureImpact {
    pub categories: BTreeMap<IntentCategory, CategoryImpact>,
    /// Share of processed fields honoured as requested.
    pub honored_ratio: f64,
}

impl FeatureImpact {
    pub fn from_steps(steps: &[TransformationStep]) -> Self {
        let mut categories: BTreeMap<IntentCategory, CategoryImpact> = BTreeMap::new();
        for step in steps {
            if let Some(category) = IntentCategory::of_path(&step.path) {
                categories.entry(category).or_default().record(step.outcome);
            }
        }
        let total: usize = categories.values().map(CategoryImpact::total).sum();
        let accepted: usize = categories.values().map(|c| c.accepted).sum();
        let honored_ratio = if total == 0 { 1.0 } else { accepted as f64 / total as f64 };
        Self { categories, honored_ratio }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanabilityLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanabilityPrediction {
    pub score: f64,
    pub level: ScanabilityLevel,
    pub factors: Vec<String>,
}

impl ScanabilityPrediction {
    pub fn from_score(score: f64, factors: Vec<String>) -> Self {
        let score = score.clamp(0.0, 1.0);
        let level = if score >= 0.8 {
            ScanabilityLevel::High
        } else if score >= 0.5 {
            ScanabilityLevel::Medium
        } else {
            ScanabilityLevel::Low
        };
        Self { score, level, factors }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub translation_ms: f64,
    pub degradation_ms: f64,
    pub validation_ms: f64,
    pub render_ms: f64,
    pub total_ms: f64,
    pub svg_bytes: usize,
    pub symbol_size: usize,
    pub version: u8,
    pub error_level: String,
    pub module_count: usize,
    pub dark_modules: usize,
    pub degradations_applied: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranslationReport {
    pub steps: Vec<TransformationStep>,
    pub applied_hints: Vec<String>,
    pub compatibility: Vec<CompatibilityInfo>,
}

impl TranslationReport {
    pub fn steps_for(&self, path: &str) -> Vec<&TransformationStep> {
        self.steps.iter().filter(|s| s.path == path).collect()
    }
}

/// Final artifact of one `process` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderingResult {
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    pub engine_version: String,
    pub svg: String,
    pub svg_data_uri: String,
    pub warnings: Vec<WarningInfo>,
    pub metrics: PerformanceMetrics,
    pub used_options: Value,
    pub requested_options: Value,
    pub config_hash: String,
    pub translation_report: TranslationReport,
    pub degradation_details: Vec<DegradationDetail>,
    pub feature_impact: FeatureImpact,
    pub scanability: ScanabilityPrediction,
}

impl RenderingResult {
    pub fn warnings_with_code(&self, code: &str) -> Vec<&WarningInfo> {
        self.warnings.iter().filter(|w| w.code == code).collect()
    }
}
