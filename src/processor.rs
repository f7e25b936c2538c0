//! Intent Processor - Single Entry Point
//!
//! `process` walks one request through
//! `received -> translating -> configuring -> degrading -> validating ->
//! rendering -> reporting -> done`. All per-request state lives in a
//! [`RequestState`] built inside the call, so one processor can serve
//! concurrent requests. Only payload errors abort a request.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use crate::color::{contrast_between, WCAG_AA_CONTRAST};
use crate::config::RenderingConfig;
use crate::degradation::{diff_values, DegradationManager, DegradationResult};
use crate::encoder::{EncodeError, Encoder, Matrix, SyntheticEncoder};
use crate::hashing::compute_config_hash;
use crate::intents::{ErrorLevel, IntentRequest, PayloadError};
use crate::manifest::CapabilityManifest;
use crate::render::{RenderError, Renderer, SvgRenderer};
use crate::report::{
    codes, DegradationDetail, FeatureImpact, PerformanceMetrics, RenderingResult,
    ScanabilityPrediction, TranslationReport, WarningInfo, WarningSeverity,
};
use crate::safety::{reserve_fraction, EncodingParams, SafetyReport, SafetyValidator, ViolationSeverity};
use crate::scan::{ScanError, ScanHarness, ScanReport, ScanRunner};
use crate::translator::{IntentTranslator, RequestPolicy, TranslationOutput};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Invalid payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("Encoder failed: {0}")]
    Encode(EncodeError),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessorOptions {
    /// Apply every degradation fallback, not only critical ones.
    pub safe_mode: bool,
    pub min_contrast: f64,
    pub default_error_level: ErrorLevel,
    /// Raise error correction to H when a reserve area is enabled.
    pub auto_raise_error_level: bool,
    pub scan_timeout: Duration,
    pub min_scan_success_rate: f64,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            safe_mode: false,
            min_contrast: WCAG_AA_CONTRAST,
            default_error_level: ErrorLevel::M,
            auto_raise_error_level: true,
            scan_timeout: Duration::from_secs(30),
            min_scan_success_rate: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Received,
    Translating,
    Configuring,
    Degrading,
    Validating,
    Rendering,
    Reporting,
    Done,
}

/// Everything accumulated while handling one request.
struct RequestState {
    request_id: String,
    phase: Phase,
    warnings: Vec<WarningInfo>,
    details: Vec<DegradationDetail>,
    metrics: PerformanceMetrics,
}

impl RequestState {
    fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            phase: Phase::Received,
            warnings: vec![],
            details: vec![],
            metrics: PerformanceMetrics::default(),
        }
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(request_id = %self.request_id, from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    fn warn(&mut self, warning: WarningInfo) {
        self.warnings.push(warning);
    }
}

/// Effective switches for one request: processor options overlaid with
/// the request's validation and performance intents.
#[derive(Debug, Clone)]
struct EffectivePolicy {
    safe_mode: bool,
    min_contrast: f64,
    check_contrast: bool,
    simulate_scan: bool,
    min_success_rate: f64,
    max_svg_size_kb: Option<f64>,
    debug_timing: bool,
}

impl EffectivePolicy {
    fn resolve(options: &ProcessorOptions, policy: &RequestPolicy) -> Self {
        Self {
            safe_mode: options.safe_mode || policy.safe_mode.unwrap_or(false),
            min_contrast: policy.min_contrast.unwrap_or(options.min_contrast),
            check_contrast: policy.check_contrast.unwrap_or(true),
            simulate_scan: policy.simulate_scan.unwrap_or(false),
            min_success_rate: policy.min_success_rate.unwrap_or(options.min_scan_success_rate),
            max_svg_size_kb: policy.max_svg_size_kb,
            debug_timing: policy.debug_timing.unwrap_or(false),
        }
    }
}

/// Result of the translate/configure/degrade/encode/validate stages.
struct Compiled {
    content: String,
    translation: TranslationOutput,
    policy: EffectivePolicy,
    requested: RenderingConfig,
    config: RenderingConfig,
    matrix: Matrix,
    safety: SafetyReport,
}

/// Dry-run outcome: what degradation would do, nothing rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub translation_report: TranslationReport,
    pub requested_options: Value,
    pub degradation: DegradationResult,
    pub warnings: Vec<WarningInfo>,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// The intent processor - single entry point for rendering requests
pub struct IntentProcessor {
    manifest: Arc<CapabilityManifest>,
    encoder: Arc<dyn Encoder>,
    renderer: Arc<dyn Renderer>,
    harness: Option<Arc<dyn ScanHarness>>,
    options: ProcessorOptions,
}

impl IntentProcessor {
    pub fn new(manifest: Arc<CapabilityManifest>, options: ProcessorOptions) -> Self {
        Self {
            manifest,
            encoder: Arc::new(SyntheticEncoder),
            renderer: Arc::new(SvgRenderer),
            harness: None,
            options,
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_scan_harness(mut self, harness: Arc<dyn ScanHarness>) -> Self {
        self.harness = Some(harness);
        self
    }

    pub fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    pub fn translate(&self, request: &IntentRequest) -> TranslationOutput {
        IntentTranslator::new(&self.manifest).translate(&request.intents)
    }

    /// Translate, configure and run the degradation checks without
    /// applying any fallback or rendering.
    pub fn preview(&self, request: &IntentRequest) -> Preview {
        let mut state = RequestState::new();
        let translation = self.translate(request);
        let policy = EffectivePolicy::resolve(&self.options, &translation.policy);
        let requested = self.configure(&translation, &policy, &mut state);
        let degradation = DegradationManager::new(policy.min_contrast).check_only(&requested);

        let mut warnings = translation.warnings.clone();
        warnings.append(&mut state.warnings);
        for w in &degradation.warnings {
            let mut info = WarningInfo::new(codes::DEGRADATION_ADVISORY, &w.feature, &w.message, WarningSeverity::Info);
            if let Some(s) = &w.suggestion {
                info = info.with_suggestion(s);
            }
            warnings.push(info);
        }

        Preview {
            translation_report: TranslationReport {
                steps: translation.steps,
                applied_hints: translation.applied_hints,
                compatibility: translation.compatibility,
            },
            requested_options: requested.to_value(),
            degradation,
            warnings,
        }
    }

    /// Safety report for the configuration `process` would render.
    pub fn validate(&self, request: &IntentRequest) -> Result<SafetyReport, ProcessError> {
        let mut state = RequestState::new();
        Ok(self.compile(request, &mut state)?.safety)
    }

    /// Process one request end to end.
    pub fn process(&self, request: &IntentRequest) -> Result<RenderingResult, ProcessError> {
        let started = Instant::now();
        let mut state = RequestState::new();
        tracing::info!(request_id = %state.request_id, "processing request");

        let compiled = self.compile(request, &mut state)?;
        let scan = self.simulate_scan(&compiled, &mut state);

        state.enter(Phase::Rendering);
        let t = Instant::now();
        let svg = self.renderer.render(&compiled.matrix, &compiled.config)?;
        state.metrics.render_ms = elapsed_ms(t);

        state.enter(Phase::Reporting);
        if let Some(max_kb) = compiled.policy.max_svg_size_kb {
            let kb = svg.len() as f64 / 1024.0;
            if kb > max_kb {
                state.warn(
                    WarningInfo::new(
                        codes::SVG_SIZE_EXCEEDED,
                        "performance.max_svg_size_kb",
                        format!("Output is {kb:.1} KB, above the {max_kb} KB budget"),
                        WarningSeverity::Warning,
                    )
                    .with_suggestion("Use a simpler module shape or optimize_for 'size'"),
                );
            }
        }

        let matrix = &compiled.matrix;
        state.metrics.svg_bytes = svg.len();
        state.metrics.symbol_size = matrix.size;
        state.metrics.version = matrix.version;
        state.metrics.error_level = matrix.error_level.to_string();
        state.metrics.module_count = matrix.size * matrix.size;
        state.metrics.dark_modules = matrix.dark_count();
        state.metrics.degradations_applied = state.details.iter().filter(|d| d.applied).count();
        state.metrics.total_ms = elapsed_ms(started);
        if compiled.policy.debug_timing {
            tracing::info!(request_id = %state.request_id, metrics = ?state.metrics, "timing");
        }

        let scanability = predict_scanability(&compiled, scan.as_ref(), state.metrics.degradations_applied);
        let used_options = compiled.config.to_value();
        let config_hash = compute_config_hash(&used_options, ENGINE_VERSION)?;

        let mut warnings = compiled.translation.warnings;
        warnings.append(&mut state.warnings);

        state.enter(Phase::Done);
        tracing::info!(
            request_id = %state.request_id,
            warnings = warnings.len(),
            score = scanability.score,
            "request processed"
        );

        Ok(RenderingResult {
            request_id: state.request_id,
            created_at: Utc::now(),
            engine_version: ENGINE_VERSION.to_string(),
            svg_data_uri: format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg.as_bytes())),
            svg,
            warnings,
            metrics: state.metrics,
            used_options,
            requested_options: compiled.requested.to_value(),
            config_hash,
            feature_impact: FeatureImpact::from_steps(&compiled.translation.steps),
            translation_report: TranslationReport {
                steps: compiled.translation.steps,
                applied_hints: compiled.translation.applied_hints,
                compatibility: compiled.translation.compatibility,
            },
            degradation_details: state.details,
            scanability,
        })
    }

    fn compile(&self, request: &IntentRequest, state: &mut RequestState) -> Result<Compiled, ProcessError> {
        let content = request.payload.resolve_content()?;

        state.enter(Phase::Translating);
        let t = Instant::now();
        let translation = self.translate(request);
        state.metrics.translation_ms = elapsed_ms(t);
        let policy = EffectivePolicy::resolve(&self.options, &translation.policy);

        state.enter(Phase::Configuring);
        let requested = self.configure(&translation, &policy, state);

        state.enter(Phase::Degrading);
        let t = Instant::now();
        let (config, degradation) =
            DegradationManager::new(policy.min_contrast).apply_degradation(&requested, policy.safe_mode);
        record_degradation(&degradation, state);
        state.metrics.degradation_ms = elapsed_ms(t);

        let level = self.error_level(request, &config, state);
        let matrix = self.encode(&content, level, &translation, state)?;

        state.enter(Phase::Validating);
        let t = Instant::now();
        let (config, safety) = self.validate_safety(config, &matrix, &policy, state);
        state.metrics.validation_ms = elapsed_ms(t);

        Ok(Compiled { content, translation, policy, requested, config, matrix, safety })
    }

    /// Build the typed configuration. A failed build falls back to the
    /// defaults with a warning.
    fn configure(
        &self,
        translation: &TranslationOutput,
        policy: &EffectivePolicy,
        state: &mut RequestState,
    ) -> RenderingConfig {
        let mut config = match RenderingConfig::from_kwargs(&translation.kwargs) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(request_id = %state.request_id, error = %e, "configuration build failed");
                state.warn(
                    WarningInfo::new(codes::CONFIG_BUILD_FAILED, "config", e.to_string(), WarningSeverity::Warning)
                        .with_suggestion("Rendering continues with the default configuration"),
                );
                RenderingConfig::default()
            }
        };
        config.safe_mode = config.safe_mode || policy.safe_mode;
        config
    }

    fn error_level(&self, request: &IntentRequest, config: &RenderingConfig, state: &mut RequestState) -> ErrorLevel {
        if let Some(level) = request.payload.error_correction {
            return level;
        }
        let level = self.options.default_error_level;
        if config.centerpiece.enabled && self.options.auto_raise_error_level && level < ErrorLevel::H {
            state.warn(WarningInfo::new(
                codes::ERROR_CORRECTION_RAISED,
                "payload.error_correction",
                format!("Error correction raised from {level} to H for the reserve area"),
                WarningSeverity::Info,
            ));
            return ErrorLevel::H;
        }
        level
    }

    fn encode(
        &self,
        content: &str,
        level: ErrorLevel,
        translation: &TranslationOutput,
        state: &mut RequestState,
    ) -> Result<Matrix, ProcessError> {
        let hints = &translation.encoding;
        let to_process_error = |e: EncodeError| match e {
            EncodeError::DataTooLong { len, capacity, .. } => {
                ProcessError::Payload(PayloadError::ContentTooLong { len, max: capacity })
            }
            other => ProcessError::Encode(other),
        };
        let mut matrix = self.encoder.encode(content, level, hints).map_err(to_process_error)?;

        // Boost takes the highest level that fits the same version.
        if hints.boost_error {
            let base = matrix.error_level;
            for higher in [ErrorLevel::Q, ErrorLevel::H].into_iter().filter(|l| *l > base) {
                match self.encoder.encode(content, higher, hints) {
                    Ok(boosted) if boosted.version == matrix.version => matrix = boosted,
                    _ => break,
                }
            }
            if matrix.error_level > level {
                tracing::debug!(request_id = %state.request_id, level = %matrix.error_level, "error correction boosted");
            }
        }
        Ok(matrix)
    }

    /// Run safety validation. Errors with a deterministic fix are applied
    /// once and validation re-runs on the fixed configuration.
    fn validate_safety(
        &self,
        mut config: RenderingConfig,
        matrix: &Matrix,
        policy: &EffectivePolicy,
        state: &mut RequestState,
    ) -> (RenderingConfig, SafetyReport) {
        let validator = SafetyValidator::new(policy.min_contrast, policy.check_contrast);
        let params = EncodingParams::from(matrix);
        let mut report = validator.validate(&config, &params);

        let fixes: Vec<_> = report.errors().filter_map(|v| v.fix.map(|fix| (v.clone(), fix))).collect();
        if !fixes.is_empty() {
            for (violation, fix) in fixes {
                let next = fix.apply(&config);
                for (path, change) in diff_values(&config.to_value(), &next.to_value()) {
                    tracing::info!(request_id = %state.request_id, rule = %violation.rule, %path, "safety fix applied");
                    state.details.push(DegradationDetail {
                        feature: path.clone(),
                        rule: violation.rule.clone(),
                        original_value: change.before,
                        degraded_value: change.after,
                        reason: violation.message.clone(),
                        applied: true,
                    });
                    state.warn(WarningInfo::new(
                        codes::SAFETY_FIX_APPLIED,
                        path,
                        violation.message.clone(),
                        WarningSeverity::Warning,
                    ));
                }
                config = next;
            }
            report = validator.validate(&config, &params);
        }

        for v in &report.violations {
            let (code, severity) = match v.severity {
                ViolationSeverity::Error => (codes::SAFETY_ERROR, WarningSeverity::Error),
                ViolationSeverity::Warning => (codes::SAFETY_WARNING, WarningSeverity::Warning),
                ViolationSeverity::Info => (codes::SAFETY_WARNING, WarningSeverity::Info),
            };
            let mut info = WarningInfo::new(code, &v.rule, &v.message, severity);
            if let Some(step) = v.remediation.first() {
                info = info.with_suggestion(step);
            }
            state.warn(info);
        }
        (config, report)
    }

    fn simulate_scan(&self, compiled: &Compiled, state: &mut RequestState) -> Option<ScanReport> {
        if !compiled.policy.simulate_scan {
            return None;
        }
        let unavailable = |detail: String| {
            WarningInfo::new(codes::SCAN_HARNESS_UNAVAILABLE, "validation.simulate_scan", detail, WarningSeverity::Info)
        };
        let Some(harness) = &self.harness else {
            state.warn(unavailable("No scan harness configured; simulation skipped".to_string()));
            return None;
        };

        let renderer = Arc::clone(&self.renderer);
        let matrix = compiled.matrix.clone();
        let runner = ScanRunner::new(Arc::clone(harness), self.options.scan_timeout);
        let outcome = runner.run(
            compiled.config.clone(),
            compiled.policy.min_success_rate,
            compiled.content.clone(),
            Box::new(move |config: &RenderingConfig| renderer.render(&matrix, config)),
        );
        match outcome {
            Ok(report) => {
                if !report.meets_threshold {
                    state.warn(
                        WarningInfo::new(
                            codes::SCAN_THRESHOLD_NOT_MET,
                            "validation.min_success_rate",
                            format!(
                                "Simulated scan success {:.0}% is below {:.0}%",
                                report.success_rate * 100.0,
                                compiled.policy.min_success_rate * 100.0
                            ),
                            WarningSeverity::Warning,
                        )
                        .with_suggestion("Enable enforce_scanability or increase scale and contrast"),
                    );
                }
                Some(report)
            }
            Err(ScanError::Unavailable) => {
                state.warn(unavailable("Scan harness reported itself unavailable".to_string()));
                None
            }
            Err(e) => {
                tracing::warn!(request_id = %state.request_id, error = %e, "scan simulation skipped");
                state.warn(unavailable(format!("Scan simulation skipped: {e}")));
                None
            }
        }
    }
}

fn record_degradation(result: &DegradationResult, state: &mut RequestState) {
    for w in &result.warnings {
        state.details.push(DegradationDetail {
            feature: w.feature.clone(),
            rule: w.rule.clone(),
            original_value: w.original_value.clone(),
            degraded_value: w.degraded_value.clone(),
            reason: w.reason.clone(),
            applied: w.applied,
        });
        let (code, severity) = if w.applied {
            (codes::DEGRADATION_APPLIED, WarningSeverity::Warning)
        } else {
            (codes::DEGRADATION_ADVISORY, WarningSeverity::Info)
        };
        let mut info = WarningInfo::new(code, &w.feature, &w.message, severity);
        if let Some(s) = &w.suggestion {
            info = info.with_suggestion(s);
        }
        state.warn(info);
    }
}

fn predict_scanability(compiled: &Compiled, scan: Option<&ScanReport>, degradations: usize) -> ScanabilityPrediction {
    let config = &compiled.config;
    let safety = &compiled.safety;
    let mut score: f64 = 1.0;
    let mut factors = vec![];

    match contrast_between(&config.dark, &config.light) {
        Some(r) if r >= 7.0 => {}
        Some(r) if r >= WCAG_AA_CONTRAST => {
            score -= 0.05;
            factors.push(format!("moderate contrast {r:.1}:1"));
        }
        Some(r) => {
            score -= 0.3;
            factors.push(format!("low contrast {r:.1}:1"));
        }
        None => {
            score -= 0.3;
            factors.push("contrast could not be measured".to_string());
        }
    }

    if config.scale < 3 {
        score -= 0.3;
        factors.push(format!("very small modules ({}px)", config.scale));
    } else if config.scale < 5 {
        score -= 0.1;
        factors.push(format!("small modules ({}px)", config.scale));
    }

    if config.centerpiece.enabled && safety.max_reserve_fraction > 0.0 {
        let usage = reserve_fraction(config, compiled.matrix.size) / safety.max_reserve_fraction;
        if usage > 0.75 {
            score -= 0.15;
            factors.push(format!("reserve area uses {:.0}% of safe capacity", usage * 100.0));
        }
    }

    if config.geometry.shape.is_complex() {
        score -= 0.05;
        factors.push("complex module shape".to_string());
    }

    if degradations > 0 {
        score -= 0.05 * degradations as f64;
        factors.push(format!("{degradations} degradation(s) applied"));
    }

    let errors = safety.errors().count();
    if errors > 0 {
        score -= 0.2 * errors as f64;
        factors.push(format!("{errors} unresolved safety error(s)"));
    }

    if let Some(report) = scan {
        score = (score + report.success_rate) / 2.0;
        factors.push(format!("simulated scan success {:.0}%", report.success_rate * 100.0));
    }

    ScanabilityPrediction::from_score(score, factors)
}
