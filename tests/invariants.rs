//! Contract Invariant Tests
//!
//! These tests verify the guarantees callers rely on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use qrintent_core::{
    config::{Kwargs, ModuleShape, RenderingConfig},
    degradation::DegradationManager,
    encoder::{EncodingHints, Matrix, SyntheticEncoder},
    intents::IntentCategory,
    report::{codes, StepOutcome, WarningSeverity},
    scan::{ConditionOutcome, RenderFn, ScanReport},
    CapabilityManifest, EncodeError, Encoder, ErrorLevel, IntentProcessor, IntentRequest,
    IntentTranslator, IntentsConfig, PayloadError, ProcessError, ProcessorOptions, RenderError,
    Renderer, ScanError, ScanHarness, SvgRenderer,
};

fn create_processor() -> IntentProcessor {
    IntentProcessor::new(Arc::new(CapabilityManifest::builtin()), ProcessorOptions::default())
}

fn create_request(intents: Value) -> IntentRequest {
    serde_json::from_value(json!({
        "payload": {"text": "https://example.com"},
        "intents": intents,
    }))
    .unwrap()
}

fn translate(intents: Value) -> qrintent_core::TranslationOutput {
    let manifest = CapabilityManifest::builtin();
    let intents: IntentsConfig = serde_json::from_value(intents).unwrap();
    IntentTranslator::new(&manifest).translate(&intents)
}

fn risky_config() -> RenderingConfig {
    let mut kwargs = Kwargs::new();
    kwargs.insert("shape".into(), json!("star"));
    kwargs.insert("scale".into(), json!(4));
    kwargs.insert("corner_radius".into(), json!(0.8));
    kwargs.insert("merge".into(), json!("aggressive"));
    kwargs.insert("min_island_modules".into(), json!(1));
    kwargs.insert("frame_clip_mode".into(), json!("fade"));
    kwargs.insert("pattern_finder".into(), json!("#333333"));
    kwargs.insert("dark".into(), json!("#cccccc"));
    kwargs.insert("centerpiece_enabled".into(), json!(true));
    kwargs.insert("centerpiece_size".into(), json!(0.45));
    RenderingConfig::from_kwargs(&kwargs).unwrap()
}

/// Renders a fixed string and counts calls.
struct CountingRenderer {
    calls: AtomicUsize,
}

impl Renderer for CountingRenderer {
    fn render(&self, _matrix: &Matrix, _config: &RenderingConfig) -> Result<String, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("<svg/>".to_string())
    }
}

/// Refuses everything, like a real encoder given too much data.
struct FullEncoder;

impl Encoder for FullEncoder {
    fn encode(&self, content: &str, level: ErrorLevel, _hints: &EncodingHints) -> Result<Matrix, EncodeError> {
        Err(EncodeError::DataTooLong { len: content.len(), capacity: 0, level })
    }
}

/// Returns rows of unequal length, like a buggy external encoder.
struct RaggedEncoder;

impl Encoder for RaggedEncoder {
    fn encode(&self, _content: &str, level: ErrorLevel, _hints: &EncodingHints) -> Result<Matrix, EncodeError> {
        Matrix::new(1, level, vec![vec![true; 2], vec![false; 1]])
    }
}

struct StubHarness {
    success_rate: f64,
}

impl ScanHarness for StubHarness {
    fn validate_threshold(
        &self,
        config: &RenderingConfig,
        min_success_rate: f64,
        _payload: &str,
        render: &RenderFn,
    ) -> Result<ScanReport, ScanError> {
        render(config).map_err(|e| ScanError::Harness(e.to_string()))?;
        let conditions = self.conditions();
        let passing = (conditions.len() as f64 * self.success_rate).round() as usize;
        let details = conditions
            .into_iter()
            .enumerate()
            .map(|(i, condition)| ConditionOutcome { condition, decoded: i < passing })
            .collect();
        Ok(ScanReport::from_outcomes(details, min_success_rate))
    }
}

struct HangingHarness;

impl ScanHarness for HangingHarness {
    fn validate_threshold(
        &self,
        _config: &RenderingConfig,
        _min_success_rate: f64,
        _payload: &str,
        _render: &RenderFn,
    ) -> Result<ScanReport, ScanError> {
        std::thread::sleep(Duration::from_secs(2));
        Err(ScanError::Unavailable)
    }
}

// --- Translation ---

#[test]
fn invariant_unsupported_value_falls_back_to_default() {
    let out = translate(json!({"style": {"module_shape": "blob"}}));

    let steps: Vec<_> = out.steps.iter().filter(|s| s.path == "style.module_shape").collect();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].outcome, StepOutcome::Rejected);
    assert_eq!(steps[0].transformed_value, json!("square"));
    assert_eq!(out.kwargs["shape"], json!("square"));

    let warnings: Vec<_> = out.warnings.iter().filter(|w| w.code == codes::UNSUPPORTED_INTENT).collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(out.compatibility.len(), 1);
    assert!(out.compatibility[0].alternatives.len() <= 5);
    assert!(!out.compatibility[0].alternatives.is_empty());
}

#[test]
fn invariant_out_of_range_numbers_are_clamped() {
    let out = translate(json!({"style": {"corner_radius": 3.5}, "reserve": {"enabled": true, "size": -1}}));

    assert_eq!(out.kwargs["corner_radius"], json!(1.0));
    assert_eq!(out.kwargs["centerpiece_size"], json!(0.0));
    let clamped: Vec<_> = out.steps.iter().filter(|s| s.outcome == StepOutcome::Modified).collect();
    assert_eq!(clamped.len(), 2);
    let warning = out.warnings.iter().find(|w| w.path == "style.corner_radius").unwrap();
    assert_eq!(warning.code, codes::VALUE_CLAMPED);
    assert!(warning.detail.contains("3.5"));
}

#[test]
fn invariant_every_field_leaves_one_step() {
    let out = translate(json!({
        "style": {"module_shape": "circle", "scale": 12, "palette": {"fg": "navy", "bg": "white"}},
        "frame": {"shape": "circle"},
        "accessibility": {"enabled": true, "title": "Menu"},
    }));
    let mut paths: Vec<&str> = out.steps.iter().map(|s| s.path.as_str()).collect();
    let total = paths.len();
    paths.sort_unstable();
    paths.dedup();
    assert_eq!(paths.len(), total);
    assert_eq!(total, 7);
    assert!(out.steps.iter().all(|s| s.outcome == StepOutcome::Accepted));
}

#[test]
fn invariant_explicit_values_beat_hints() {
    let out = translate(json!({
        "style": {"merge": "aggressive"},
        "performance": {"optimize_for": "size"},
    }));
    assert_eq!(out.kwargs["merge"], json!("aggressive"));
    assert_eq!(out.kwargs["min_island_modules"], json!(2));
    assert!(!out.applied_hints.is_empty());
}

#[test]
fn invariant_unknown_categories_are_ignored() {
    let request: IntentRequest = serde_json::from_value(json!({
        "payload": {"text": "hello"},
        "intents": {"holograms": {"enabled": true}, "style": {"scale": 12}},
    }))
    .unwrap();
    let result = create_processor().process(&request).unwrap();
    assert_eq!(result.translation_report.steps.len(), 1);
    assert!(result.warnings.is_empty());
}

// --- Degradation ---

#[test]
fn invariant_check_only_never_changes_input() {
    let config = risky_config();
    let snapshot = config.clone();
    let manager = DegradationManager::default();

    let result = manager.check_only(&config);
    assert_eq!(config, snapshot);
    assert!(!result.degradation_applied);
    assert!(result.changes.is_empty());
    assert_eq!(result.warnings.len(), manager.rule_names().len());

    let (_degraded, _) = manager.apply_degradation(&config, true);
    assert_eq!(config, snapshot);
}

#[test]
fn invariant_safe_mode_applies_superset() {
    let config = risky_config();
    let manager = DegradationManager::default();

    let (_, normal) = manager.apply_degradation(&config, false);
    let (_, safe) = manager.apply_degradation(&config, true);

    assert!(normal.applied_rules.iter().all(|r| safe.applied_rules.contains(r)));
    assert!(safe.applied_rules.len() > normal.applied_rules.len());
    assert_eq!(normal.applied_rules, vec!["low_contrast", "reserve_area_too_large"]);
}

#[test]
fn invariant_safe_config_round_trips() {
    let config = RenderingConfig::default();
    let (out, result) = DegradationManager::default().apply_degradation(&config, true);
    assert_eq!(out, config);
    assert!(!result.degradation_applied);
    assert!(result.warnings.is_empty());
}

// --- End-to-end scenarios ---

#[test]
fn scenario_large_reserve_is_clamped() {
    let result = create_processor()
        .process(&create_request(json!({"reserve": {"enabled": true, "size": 0.4}})))
        .unwrap();

    assert_eq!(result.used_options["centerpiece"]["size"], json!(0.2));
    assert_eq!(result.requested_options["centerpiece"]["size"], json!(0.4));
    let detail = result.degradation_details.iter().find(|d| d.rule == "reserve_area_too_large").unwrap();
    assert!(detail.applied);
    assert_eq!(result.warnings_with_code(codes::DEGRADATION_APPLIED).len(), 1);
    assert_eq!(result.metrics.error_level, "H");
}

#[test]
fn scenario_wide_margin_is_shrunk_instead_of_erasing_reserve() {
    let request: IntentRequest = serde_json::from_value(json!({
        "payload": {"text": "hi", "error_correction": "L"},
        "intents": {"reserve": {"enabled": true, "size": 0.2, "margin": 5}},
    }))
    .unwrap();
    let result = create_processor().process(&request).unwrap();

    let used = &result.used_options["centerpiece"];
    assert!(used["size"].as_f64().unwrap() > 0.0);
    assert!(used["margin"].as_u64().unwrap() < 5);
    assert!(result.degradation_details.iter().any(|d| d.feature == "centerpiece.margin" && d.applied));
    assert!(result.warnings_with_code(codes::SAFETY_ERROR).iter().all(|w| w.path != "reserve_area"));
}

#[test]
fn scenario_low_contrast_forced_to_black_on_white() {
    let result = create_processor()
        .process(&create_request(json!({"style": {"palette": {"fg": "yellow", "bg": "white"}}})))
        .unwrap();

    assert_eq!(result.used_options["dark"], json!("black"));
    assert_eq!(result.used_options["light"], json!("white"));
    assert!(result.degradation_details.iter().any(|d| d.rule == "low_contrast" && d.applied));
}

#[test]
fn scenario_enforced_scanability_simplifies_small_complex_shapes() {
    let result = create_processor()
        .process(&create_request(json!({
            "style": {"module_shape": "hexagon", "scale": 4, "corner_radius": 0.6},
            "validation": {"enforce_scanability": true},
        })))
        .unwrap();

    assert_eq!(result.used_options["geometry"]["shape"], json!("square"));
    assert_eq!(result.used_options["geometry"]["corner_radius"], json!(0.0));
    assert_eq!(result.used_options["safe_mode"], json!(true));
}

#[test]
fn scenario_advisory_left_unapplied_without_safe_mode() {
    let result = create_processor()
        .process(&create_request(json!({"style": {"module_shape": "star", "scale": 6}})))
        .unwrap();

    assert_eq!(result.used_options["geometry"]["shape"], json!("star"));
    let advisory = result.warnings_with_code(codes::DEGRADATION_ADVISORY);
    assert_eq!(advisory.len(), 1);
    assert_eq!(advisory[0].severity, WarningSeverity::Info);
}

#[test]
fn scenario_empty_payload_is_fatal() {
    let request: IntentRequest =
        serde_json::from_value(json!({"payload": {"text": "   "}, "intents": {"style": {"scale": 12}}})).unwrap();
    let err = create_processor().process(&request).unwrap_err();
    assert!(matches!(err, ProcessError::Payload(PayloadError::NoContent)));
}

#[test]
fn scenario_oversized_payload_is_fatal() {
    let processor = create_processor().with_encoder(Arc::new(FullEncoder));
    let err = processor.process(&create_request(json!({}))).unwrap_err();
    assert!(matches!(err, ProcessError::Payload(PayloadError::ContentTooLong { .. })));
}

#[test]
fn scenario_malformed_encoder_output_is_an_error() {
    let processor = create_processor().with_encoder(Arc::new(RaggedEncoder));
    let err = processor.process(&create_request(json!({}))).unwrap_err();
    assert!(matches!(err, ProcessError::Encode(EncodeError::NotSquare { size: 2, row: 1, len: 1 })));
}

#[test]
fn scenario_config_build_failure_continues_with_defaults() {
    let result = create_processor()
        .process(&create_request(json!({"frame": {"shape": "custom"}})))
        .unwrap();
    assert_eq!(result.warnings_with_code(codes::CONFIG_BUILD_FAILED).len(), 1);
    assert_eq!(result.used_options["frame"]["shape"], json!("square"));
}

// --- Collaborators ---

#[test]
fn invariant_renderer_called_once_per_request() {
    let renderer = Arc::new(CountingRenderer { calls: AtomicUsize::new(0) });
    let processor = create_processor().with_renderer(renderer.clone());
    let result = processor.process(&create_request(json!({}))).unwrap();
    assert_eq!(result.svg, "<svg/>");
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn invariant_scan_threshold_reported() {
    let processor = create_processor().with_scan_harness(Arc::new(StubHarness { success_rate: 0.5 }));
    let result = processor
        .process(&create_request(json!({"validation": {"simulate_scan": true, "min_success_rate": 0.9}})))
        .unwrap();
    assert_eq!(result.warnings_with_code(codes::SCAN_THRESHOLD_NOT_MET).len(), 1);

    let processor = create_processor().with_scan_harness(Arc::new(StubHarness { success_rate: 1.0 }));
    let result = processor
        .process(&create_request(json!({"validation": {"simulate_scan": true}})))
        .unwrap();
    assert!(result.warnings.is_empty());
}

#[test]
fn invariant_scan_timeout_is_not_fatal() {
    let options = ProcessorOptions { scan_timeout: Duration::from_millis(50), ..ProcessorOptions::default() };
    let processor = IntentProcessor::new(Arc::new(CapabilityManifest::builtin()), options)
        .with_scan_harness(Arc::new(HangingHarness));
    let result = processor
        .process(&create_request(json!({"validation": {"simulate_scan": true}})))
        .unwrap();
    assert_eq!(result.warnings_with_code(codes::SCAN_HARNESS_UNAVAILABLE).len(), 1);
    assert!(result.svg.starts_with("<svg"));
}

#[test]
fn invariant_processor_is_reentrant() {
    let processor = create_processor();
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let processor = &processor;
                s.spawn(move || {
                    let shape = if i % 2 == 0 { "blob" } else { "circle" };
                    let result = processor.process(&create_request(json!({"style": {"module_shape": shape}}))).unwrap();
                    (i, result.warnings_with_code(codes::UNSUPPORTED_INTENT).len())
                })
            })
            .collect();
        for handle in handles {
            let (i, unsupported) = handle.join().unwrap();
            assert_eq!(unsupported, if i % 2 == 0 { 1 } else { 0 });
        }
    });
}

// --- Audit ---

#[test]
fn invariant_config_hash_stable() {
    let processor = create_processor();
    let request = create_request(json!({"style": {"module_shape": "circle", "scale": 12}}));
    let a = processor.process(&request).unwrap();
    let b = processor.process(&request).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_ne!(a.request_id, b.request_id);
    assert_eq!(a.svg, b.svg);
}

#[test]
fn invariant_feature_impact_matches_steps() {
    let result = create_processor()
        .process(&create_request(json!({"style": {"module_shape": "blob", "scale": 500}})))
        .unwrap();
    let style = &result.feature_impact.categories[&IntentCategory::Style];
    assert_eq!(style.rejected, 1);
    assert_eq!(style.modified, 1);
    assert_eq!(result.feature_impact.honored_ratio, 0.0);
}

#[test]
fn invariant_synthetic_encoder_matches_render_size() {
    let matrix = SyntheticEncoder.encode("size check", ErrorLevel::M, &EncodingHints::default()).unwrap();
    let mut config = RenderingConfig::default();
    config.geometry.shape = ModuleShape::Circle;
    let svg = SvgRenderer.render(&matrix, &config).unwrap();
    let px = (matrix.size + 2 * config.border as usize) * config.scale as usize;
    assert!(svg.contains(&format!(r#"width="{px}""#)));
}
