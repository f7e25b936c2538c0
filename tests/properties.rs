//! Property tests: translation bounds and degradation guarantees hold for
//! generated inputs, not just the fixtures in `invariants.rs`.

use proptest::prelude::*;
use serde_json::{json, Value};

use qrintent_core::{
    config::{ClipMode, MergeStrategy, ModuleShape, RenderingConfig, ReserveShape},
    report::StepOutcome,
    CapabilityManifest, DegradationManager, IntentTranslator, IntentsConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fractional intent fields; their bounds come from the builtin manifest.
const FLOAT_FIELDS: &[&str] = &[
    "style.corner_radius",
    "style.finder_inner_scale",
    "style.finder_stroke",
    "frame.corner_radius",
    "frame.fade_distance",
    "frame.scale_distance",
    "reserve.size",
    "validation.min_contrast",
    "validation.min_success_rate",
    "interactivity.hover_scale",
    "interactivity.hover_brightness",
    "animation.fade_duration",
    "animation.stagger_delay",
    "performance.max_svg_size_kb",
];

const COLOURS: &[&str] = &["black", "white", "navy", "yellow", "red", "#cccccc", "#333333", "#112233", "#fafafa"];

/// Translate a single `category.field = value` intent.
fn translate_one(path: &str, value: f64) -> (Value, StepOutcome) {
    let (category, field) = path.split_once('.').unwrap();
    let mut section = serde_json::Map::new();
    section.insert(field.to_string(), json!(value));
    let mut root = serde_json::Map::new();
    root.insert(category.to_string(), Value::Object(section));
    let intents: IntentsConfig = serde_json::from_value(Value::Object(root)).unwrap();
    let manifest = CapabilityManifest::builtin();
    let out = IntentTranslator::new(&manifest).translate(&intents);
    let steps: Vec<_> = out.steps.iter().filter(|s| s.path == path).collect();
    assert_eq!(steps.len(), 1, "one step for {path}");
    (steps[0].transformed_value.clone(), steps[0].outcome)
}

fn arb_shape() -> impl Strategy<Value = ModuleShape> {
    prop::sample::select(vec![
        ModuleShape::Square,
        ModuleShape::Circle,
        ModuleShape::Rounded,
        ModuleShape::Dot,
        ModuleShape::Diamond,
        ModuleShape::Star,
        ModuleShape::Hexagon,
        ModuleShape::Cross,
        ModuleShape::Squircle,
        ModuleShape::Triangle,
        ModuleShape::Leaf,
        ModuleShape::Connected,
        ModuleShape::ConnectedExtraRounded,
        ModuleShape::ConnectedClassy,
        ModuleShape::ConnectedClassyRounded,
    ])
}

fn arb_colour() -> impl Strategy<Value = String> {
    prop::sample::select(COLOURS.to_vec()).prop_map(str::to_string)
}

fn arb_merge() -> impl Strategy<Value = MergeStrategy> {
    prop_oneof![Just(MergeStrategy::None), Just(MergeStrategy::Soft), Just(MergeStrategy::Aggressive)]
}

fn arb_clip_mode() -> impl Strategy<Value = ClipMode> {
    prop_oneof![Just(ClipMode::Clip), Just(ClipMode::Fade), Just(ClipMode::Scale)]
}

fn arb_reserve_shape() -> impl Strategy<Value = ReserveShape> {
    prop_oneof![Just(ReserveShape::Rect), Just(ReserveShape::Circle), Just(ReserveShape::Squircle)]
}

/// Arbitrary rendering configuration touching every field a rule reads.
fn arb_config() -> impl Strategy<Value = RenderingConfig> {
    let geometry = (arb_shape(), 1u32..60, 0.0f64..=1.0, arb_merge(), 1u32..6, any::<bool>());
    let colours = (arb_colour(), arb_colour(), proptest::option::of(arb_colour()), any::<bool>());
    let frame = (arb_clip_mode(), any::<bool>(), 0.0f64..=0.5, arb_reserve_shape(), 0u32..4);
    (geometry, colours, frame).prop_map(
        |(
            (shape, scale, radius, merge, island, safe_mode),
            (dark, light, finder, patterns),
            (clip, reserve, size, reserve_shape, margin),
        )| {
            let mut c = RenderingConfig::default();
            c.geometry.shape = shape;
            c.scale = scale;
            c.geometry.corner_radius = radius;
            c.geometry.merge = merge;
            c.geometry.min_island_modules = island;
            c.safe_mode = safe_mode;
            c.dark = dark;
            c.light = light;
            c.patterns.enabled = patterns;
            c.patterns.finder = finder;
            c.frame.clip_mode = clip;
            c.centerpiece.enabled = reserve;
            c.centerpiece.size = size;
            c.centerpiece.shape = reserve_shape;
            c.centerpiece.margin = margin;
            c
        },
    )
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Values inside the declared bounds come through untouched.
    #[test]
    fn in_range_numbers_pass_through(
        path in prop::sample::select(FLOAT_FIELDS.to_vec()),
        t in 0.0f64..=1.0,
    ) {
        let bounds = CapabilityManifest::builtin().bounds(path).unwrap();
        let value = bounds.clamp(bounds.min + t * (bounds.max - bounds.min));
        let (applied, outcome) = translate_one(path, value);
        prop_assert_eq!(applied, json!(value));
        prop_assert_eq!(outcome, StepOutcome::Accepted);
    }

    /// Values outside the declared bounds land on the nearest bound.
    #[test]
    fn out_of_range_numbers_are_clamped(
        path in prop::sample::select(FLOAT_FIELDS.to_vec()),
        excess in 0.001f64..1000.0,
        above in any::<bool>(),
    ) {
        let bounds = CapabilityManifest::builtin().bounds(path).unwrap();
        let (value, edge) = if above { (bounds.max + excess, bounds.max) } else { (bounds.min - excess, bounds.min) };
        let (applied, outcome) = translate_one(path, value);
        prop_assert_eq!(applied, json!(edge));
        prop_assert_eq!(outcome, StepOutcome::Modified);
    }

    #[test]
    fn check_only_never_changes_input(config in arb_config()) {
        let snapshot = config.clone();
        let result = DegradationManager::default().check_only(&config);
        prop_assert_eq!(&config, &snapshot);
        prop_assert!(!result.degradation_applied);
        prop_assert!(result.changes.is_empty());
        prop_assert!(result.applied_rules.is_empty());
    }

    #[test]
    fn safe_mode_never_applies_fewer_rules(config in arb_config()) {
        let manager = DegradationManager::default();
        let (_, normal) = manager.apply_degradation(&config, false);
        let (_, safe) = manager.apply_degradation(&config, true);
        prop_assert!(safe.applied_rules.len() >= normal.applied_rules.len());
        for rule in &normal.applied_rules {
            prop_assert!(safe.applied_rules.contains(rule), "{} missing in safe mode", rule);
        }
    }

    /// A configuration no rule objects to survives degradation unchanged.
    /// Safe-mode output is used as the source of such configurations.
    #[test]
    fn safe_config_round_trips(config in arb_config(), safe_mode in any::<bool>()) {
        let manager = DegradationManager::default();
        let (safe, _) = manager.apply_degradation(&config, true);
        prop_assume!(manager.check_only(&safe).warnings.is_empty());
        let (degraded, result) = manager.apply_degradation(&safe, safe_mode);
        prop_assert_eq!(degraded, safe);
        prop_assert!(!result.degradation_applied);
        prop_assert!(result.changes.is_empty());
    }
}
