//! Graceful Degradation - Rule/Policy Separation
//!
//! Rules detect risky combinations and know their own fallback.
//! The manager decides whether a fallback is applied: always for critical
//! rules, otherwise only in safe mode.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::color::{contrast_between, WCAG_AA_CONTRAST};
use crate::config::{ClipMode, MergeStrategy, ModuleShape, RenderingConfig};

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static FALLBACK_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_fallback_call_count() -> u32 {
    FALLBACK_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_fallback_call_count() {
    FALLBACK_CALL_COUNT.store(0, Ordering::SeqCst);
}

/// Reserve size above which the area is always shrunk.
pub const MAX_RESERVE_SIZE: f64 = 0.3;
/// Size the reserve area is shrunk to.
pub const RESERVE_FALLBACK_SIZE: f64 = 0.2;
/// Complex shapes need at least this many pixels per module.
pub const COMPLEX_SHAPE_MIN_SCALE: u32 = 8;
/// Below this scale any decoration is risky.
pub const TINY_MODULE_SCALE: u32 = 5;
pub const TINY_MODULE_MAX_CORNER_RADIUS: f64 = 0.3;
pub const MIN_ISLAND_FOR_AGGRESSIVE_MERGE: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DegradationLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DegradationWarning {
    pub rule: String,
    pub level: DegradationLevel,
    pub feature: String,
    pub message: String,
    pub original_value: Value,
    pub degraded_value: Value,
    pub reason: String,
    pub suggestion: Option<String>,
    /// Set by the manager when the fallback ran.
    #[serde(default)]
    pub applied: bool,
}

/// A single before/after change at a dotted configuration path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Change {
    pub before: Value,
    pub after: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DegradationResult {
    pub warnings: Vec<DegradationWarning>,
    pub changes: BTreeMap<String, Change>,
    pub degradation_applied: bool,
    /// Rules whose fallback ran, in application order.
    pub applied_rules: Vec<String>,
}

impl DegradationResult {
    pub fn has_critical(&self) -> bool {
        self.warnings.iter().any(|w| w.level == DegradationLevel::Critical)
    }

    /// Fold a diff into the change map, keeping the earliest `before`.
    fn merge_changes(&mut self, diff: BTreeMap<String, Change>) {
        for (path, change) in diff {
            match self.changes.get_mut(&path) {
                Some(existing) => existing.after = change.after,
                None => {
                    self.changes.insert(path, change);
                }
            }
        }
        self.changes.retain(|_, c| c.before != c.after);
    }
}

/// Degradation rule - detects a risky combination and knows the fallback
pub trait DegradationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, config: &RenderingConfig) -> Option<DegradationWarning>;
    /// Pure: returns a new configuration, the input is untouched.
    fn apply_fallback(&self, config: &RenderingConfig) -> RenderingConfig;
}

// --- Concrete Rules ---

pub struct ComplexShapeRule;

impl DegradationRule for ComplexShapeRule {
    fn name(&self) -> &'static str { "complex_shape_small_scale" }

    fn check(&self, config: &RenderingConfig) -> Option<DegradationWarning> {
        let shape = config.geometry.shape;
        if !shape.is_complex() || config.scale >= COMPLEX_SHAPE_MIN_SCALE || config.safe_mode {
            return None;
        }
        Some(DegradationWarning {
            rule: self.name().to_string(),
            level: DegradationLevel::Warning,
            feature: "geometry.shape".to_string(),
            message: format!(
                "Complex shape '{}' at scale {} may not scan reliably",
                shape_name(shape),
                config.scale
            ),
            original_value: Value::from(shape_name(shape)),
            degraded_value: Value::from("square"),
            reason: format!("complex shapes need a module scale of at least {COMPLEX_SHAPE_MIN_SCALE}"),
            applied: false,
            suggestion: Some(format!("Increase scale to {COMPLEX_SHAPE_MIN_SCALE} or use a simpler shape")),
        })
    }

    fn apply_fallback(&self, config: &RenderingConfig) -> RenderingConfig {
        let mut next = config.clone();
        next.geometry.shape = ModuleShape::Square;
        next
    }
}

pub struct LowContrastRule {
    pub min_ratio: f64,
}

impl Default for LowContrastRule {
    fn default() -> Self {
        Self { min_ratio: WCAG_AA_CONTRAST }
    }
}

impl DegradationRule for LowContrastRule {
    fn name(&self) -> &'static str { "low_contrast" }

    fn check(&self, config: &RenderingConfig) -> Option<DegradationWarning> {
        let ratio = contrast_between(&config.dark, &config.light);
        if ratio.map_or(false, |r| r >= self.min_ratio) {
            return None;
        }
        let measured = ratio.map_or_else(|| "unmeasurable".to_string(), |r| format!("{r:.2}:1"));
        Some(DegradationWarning {
            rule: self.name().to_string(),
            level: DegradationLevel::Critical,
            feature: "colors".to_string(),
            message: format!(
                "Contrast between '{}' and '{}' is {measured}, below {:.1}:1",
                config.dark, config.light, self.min_ratio
            ),
            original_value: serde_json::json!({"dark": config.dark, "light": config.light}),
            degraded_value: serde_json::json!({"dark": "black", "light": "white"}),
            reason: "scanners need strong luminance contrast between modules and background".to_string(),
            applied: false,
            suggestion: Some("Use a dark foreground on a light background".to_string()),
        })
    }

    fn apply_fallback(&self, config: &RenderingConfig) -> RenderingConfig {
        let mut next = config.clone();
        next.dark = "black".to_string();
        next.light = "white".to_string();
        next
    }
}

pub struct TinyModulesRule;

impl DegradationRule for TinyModulesRule {
    fn name(&self) -> &'static str { "tiny_modules_with_complexity" }

    fn check(&self, config: &RenderingConfig) -> Option<DegradationWarning> {
        if config.scale >= TINY_MODULE_SCALE {
            return None;
        }
        let mut causes = vec![];
        if config.geometry.corner_radius > TINY_MODULE_MAX_CORNER_RADIUS {
            causes.push(format!("corner radius {}", config.geometry.corner_radius));
        }
        if config.geometry.shape.is_complex() {
            causes.push(format!("complex shape '{}'", shape_name(config.geometry.shape)));
        }
        if config.patterns.enabled {
            causes.push("pattern-specific styling".to_string());
        }
        if causes.is_empty() {
            return None;
        }
        Some(DegradationWarning {
            rule: self.name().to_string(),
            level: DegradationLevel::Warning,
            feature: "geometry".to_string(),
            message: format!("Small scale {} combined with {}", config.scale, causes.join(" and ")),
            original_value: serde_json::json!({
                "shape": shape_name(config.geometry.shape),
                "corner_radius": config.geometry.corner_radius,
                "patterns": config.patterns.enabled,
            }),
            degraded_value: serde_json::json!({"shape": "square", "corner_radius": 0.0, "patterns": false}),
            reason: format!("modules below {TINY_MODULE_SCALE}px lose detail when styled"),
            applied: false,
            suggestion: Some(format!("Increase scale to at least {TINY_MODULE_SCALE}")),
        })
    }

    fn apply_fallback(&self, config: &RenderingConfig) -> RenderingConfig {
        let mut next = config.clone();
        next.geometry.corner_radius = 0.0;
        next.geometry.shape = ModuleShape::Square;
        next.patterns.enabled = false;
        next
    }
}

pub struct FadeFramePatternRule;

impl DegradationRule for FadeFramePatternRule {
    fn name(&self) -> &'static str { "fade_frame_with_patterns" }

    fn check(&self, config: &RenderingConfig) -> Option<DegradationWarning> {
        if config.frame.clip_mode != ClipMode::Fade || !(config.patterns.enabled && config.patterns.has_colors()) {
            return None;
        }
        Some(DegradationWarning {
            rule: self.name().to_string(),
            level: DegradationLevel::Warning,
            feature: "frame.clip_mode".to_string(),
            message: "Fade frame combined with pattern colours blurs function patterns".to_string(),
            original_value: Value::from("fade"),
            degraded_value: Value::from("clip"),
            reason: "faded edges reduce contrast of coloured finder and timing patterns".to_string(),
            applied: false,
            suggestion: Some("Use clip_mode 'clip' or drop pattern colours".to_string()),
        })
    }

    fn apply_fallback(&self, config: &RenderingConfig) -> RenderingConfig {
        let mut next = config.clone();
        next.frame.clip_mode = ClipMode::Clip;
        next
    }
}

pub struct ExcessiveMergeRule;

impl DegradationRule for ExcessiveMergeRule {
    fn name(&self) -> &'static str { "excessive_merging" }

    fn check(&self, config: &RenderingConfig) -> Option<DegradationWarning> {
        let g = &config.geometry;
        if g.merge != MergeStrategy::Aggressive || g.min_island_modules >= MIN_ISLAND_FOR_AGGRESSIVE_MERGE {
            return None;
        }
        Some(DegradationWarning {
            rule: self.name().to_string(),
            level: DegradationLevel::Warning,
            feature: "geometry.merge".to_string(),
            message: format!("Aggressive merging with min_island_modules {}", g.min_island_modules),
            original_value: serde_json::json!({"merge": "aggressive", "min_island_modules": g.min_island_modules}),
            degraded_value: serde_json::json!({"merge": "soft", "min_island_modules": MIN_ISLAND_FOR_AGGRESSIVE_MERGE}),
            reason: "tiny islands merged aggressively distort module boundaries".to_string(),
            applied: false,
            suggestion: Some(format!(
                "Use merge 'soft' or min_island_modules >= {MIN_ISLAND_FOR_AGGRESSIVE_MERGE}"
            )),
        })
    }

    fn apply_fallback(&self, config: &RenderingConfig) -> RenderingConfig {
        let mut next = config.clone();
        next.geometry.merge = MergeStrategy::Soft;
        next.geometry.min_island_modules = MIN_ISLAND_FOR_AGGRESSIVE_MERGE;
        next
    }
}

pub struct ReserveTooLargeRule;

impl DegradationRule for ReserveTooLargeRule {
    fn name(&self) -> &'static str { "reserve_area_too_large" }

    fn check(&self, config: &RenderingConfig) -> Option<DegradationWarning> {
        let c = &config.centerpiece;
        if !c.enabled || c.size <= MAX_RESERVE_SIZE {
            return None;
        }
        Some(DegradationWarning {
            rule: self.name().to_string(),
            level: DegradationLevel::Critical,
            feature: "centerpiece.size".to_string(),
            message: format!("Reserve area size {} exceeds {MAX_RESERVE_SIZE}", c.size),
            original_value: Value::from(c.size),
            degraded_value: Value::from(RESERVE_FALLBACK_SIZE),
            reason: "a large blank area destroys more data than error correction can recover".to_string(),
            applied: false,
            suggestion: Some(format!("Keep the reserve area at or below {RESERVE_FALLBACK_SIZE}")),
        })
    }

    fn apply_fallback(&self, config: &RenderingConfig) -> RenderingConfig {
        let mut next = config.clone();
        next.centerpiece.size = RESERVE_FALLBACK_SIZE;
        next
    }
}

fn shape_name(shape: ModuleShape) -> String {
    serde_json::to_value(shape)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Recursive diff of two JSON values keyed by dotted path.
pub fn diff_values(before: &Value, after: &Value) -> BTreeMap<String, Change> {
    let mut out = BTreeMap::new();
    diff_into(&mut out, "", before, after);
    out
}

fn diff_into(out: &mut BTreeMap<String, Change>, prefix: &str, before: &Value, after: &Value) {
    match (before, after) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: std::collections::BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                let null = Value::Null;
                diff_into(out, &path, a.get(key).unwrap_or(&null), b.get(key).unwrap_or(&null));
            }
        }
        _ if before != after => {
            out.insert(prefix.to_string(), Change { before: before.clone(), after: after.clone() });
        }
        _ => {}
    }
}

/// Degradation manager - evaluates rules in declared order
pub struct DegradationManager {
    rules: Vec<Box<dyn DegradationRule>>,
}

impl DegradationManager {
    /// Built-in rules. Advisory rules come first and critical rules last,
    /// so an enforced fix always has the final word on a shared path.
    pub fn new(min_contrast: f64) -> Self {
        Self::with_rules(vec![
            Box::new(ComplexShapeRule),
            Box::new(TinyModulesRule),
            Box::new(FadeFramePatternRule),
            Box::new(ExcessiveMergeRule),
            Box::new(LowContrastRule { min_ratio: min_contrast }),
            Box::new(ReserveTooLargeRule),
        ])
    }

    pub fn with_rules(rules: Vec<Box<dyn DegradationRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Evaluate every rule against a working copy and apply fallbacks that
    /// policy allows. The input configuration is never modified.
    pub fn apply_degradation(
        &self,
        config: &RenderingConfig,
        safe_mode: bool,
    ) -> (RenderingConfig, DegradationResult) {
        let mut working = config.clone();
        let mut result = DegradationResult::default();

        for rule in &self.rules {
            let Some(mut warning) = rule.check(&working) else { continue };
            let enforce = warning.level == DegradationLevel::Critical || safe_mode;
            warning.applied = enforce;
            result.warnings.push(warning);
            if !enforce {
                continue;
            }

            #[cfg(feature = "test-hooks")]
            FALLBACK_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

            let next = rule.apply_fallback(&working);
            let diff = diff_values(&working.to_value(), &next.to_value());
            tracing::info!(rule = rule.name(), changes = diff.len(), "degradation applied");
            result.merge_changes(diff);
            result.applied_rules.push(rule.name().to_string());
            result.degradation_applied = true;
            working = next;
        }

        (working, result)
    }

    /// Same evaluation, never applying a fallback.
    pub fn check_only(&self, config: &RenderingConfig) -> DegradationResult {
        DegradationResult {
            warnings: self.rules.iter().filter_map(|r| r.check(config)).collect(),
            ..DegradationResult::default()
        }
    }
}

impl Default for DegradationManager {
    fn default() -> Self {
        Self::new(WCAG_AA_CONTRAST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> RenderingConfig {
        RenderingConfig::default()
    }

    #[test]
    fn test_safe_config_untouched() {
        let manager = DegradationManager::default();
        let original = config();
        let (next, result) = manager.apply_degradation(&original, true);
        assert!(!result.degradation_applied);
        assert!(result.warnings.is_empty());
        assert_eq!(serde_json::to_string(&next).unwrap(), serde_json::to_string(&original).unwrap());
    }

    #[test]
    fn test_advisory_rule_only_applied_in_safe_mode() {
        let mut c = config();
        c.geometry.merge = MergeStrategy::Aggressive;
        c.geometry.min_island_modules = 1;
        let manager = DegradationManager::default();

        let (unchanged, result) = manager.apply_degradation(&c, false);
        assert_eq!(result.warnings.len(), 1);
        assert!(!result.degradation_applied);
        assert_eq!(unchanged.geometry.merge, MergeStrategy::Aggressive);

        let (fixed, result) = manager.apply_degradation(&c, true);
        assert!(result.degradation_applied);
        assert_eq!(fixed.geometry.merge, MergeStrategy::Soft);
        assert_eq!(fixed.geometry.min_island_modules, 3);
        assert_eq!(result.changes["geometry.merge"].before, json!("aggressive"));
        assert_eq!(result.changes["geometry.min_island_modules"].after, json!(3));
    }

    #[test]
    fn test_critical_rule_always_applied() {
        let mut c = config();
        c.dark = "yellow".into();
        let (fixed, result) = DegradationManager::default().apply_degradation(&c, false);
        assert!(result.has_critical());
        assert_eq!(fixed.dark, "black");
        assert_eq!(fixed.light, "white");
        assert_eq!(c.dark, "yellow");
    }

    #[test]
    fn test_unparseable_colour_treated_as_low_contrast() {
        let mut c = config();
        c.light = "sparkly".into();
        let result = DegradationManager::default().check_only(&c);
        assert_eq!(result.warnings[0].level, DegradationLevel::Critical);
    }

    #[test]
    fn test_later_rules_see_earlier_fixes() {
        let mut c = config();
        c.scale = 4;
        c.geometry.shape = ModuleShape::Star;
        c.geometry.corner_radius = 0.5;
        let (fixed, result) = DegradationManager::default().apply_degradation(&c, true);
        // Complex-shape fix runs first; tiny-modules still fires on the radius.
        assert_eq!(result.applied_rules, vec!["complex_shape_small_scale", "tiny_modules_with_complexity"]);
        assert_eq!(fixed.geometry.shape, ModuleShape::Square);
        assert_eq!(fixed.geometry.corner_radius, 0.0);
        assert_eq!(result.changes["geometry.shape"].before, json!("star"));
    }

    #[test]
    fn test_small_hexagon_warns_on_scale_and_shape() {
        let mut c = config();
        c.scale = 4;
        c.geometry.shape = ModuleShape::Hexagon;
        let manager = DegradationManager::default();

        let (kept, result) = manager.apply_degradation(&c, false);
        let warning = result.warnings.iter().find(|w| w.rule == "tiny_modules_with_complexity").unwrap();
        assert!(warning.message.contains("Small scale 4"));
        assert!(warning.message.contains("complex shape 'hexagon'"));
        assert!(!warning.applied);
        assert!(!result.applied_rules.iter().any(|r| r == "tiny_modules_with_complexity"));
        assert_eq!(kept.geometry.shape, ModuleShape::Hexagon);

        let (fixed, _) = manager.apply_degradation(&c, true);
        assert_eq!(fixed.geometry.shape, ModuleShape::Square);
        assert_eq!(fixed.geometry.corner_radius, 0.0);
    }

    #[test]
    fn test_fade_frame_with_patterns() {
        let mut c = config();
        c.frame.clip_mode = ClipMode::Fade;
        c.patterns.enabled = true;
        c.patterns.finder = Some("red".into());
        let (fixed, _) = DegradationManager::default().apply_degradation(&c, true);
        assert_eq!(fixed.frame.clip_mode, ClipMode::Clip);
    }

    #[test]
    fn test_diff_values_nested() {
        let diff = diff_values(&json!({"a": {"b": 1, "c": 2}, "d": 3}), &json!({"a": {"b": 1, "c": 5}, "e": 1}));
        assert_eq!(diff.len(), 3);
        assert_eq!(diff["a.c"], Change { before: json!(2), after: json!(5) });
        assert_eq!(diff["d"].after, Value::Null);
        assert_eq!(diff["e"].before, Value::Null);
    }

    #[test]
    fn test_rule_order_is_declared() {
        let names = DegradationManager::default().rule_names();
        assert_eq!(names.last(), Some(&"reserve_area_too_large"));
        assert_eq!(names[4], "low_contrast");
    }
}
