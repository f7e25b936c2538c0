//! Intent Translation - intents to flat configuration keys
//!
//! Every processed field yields exactly one [`TransformationStep`]. Values the
//! manifest does not support fall back to documented defaults; numbers are
//! clamped to manifest bounds. Hint fields (`performance.optimize_for`,
//! branding colours) are staged and only fill keys the caller left unset.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::color::{parse_color, to_hex};
use crate::config::Kwargs;
use crate::encoder::EncodingHints;
use crate::intents::{
    AccessibilityIntents, AdvancedIntents, AnimationIntents, BrandingIntents, FrameIntents,
    IntentsConfig, InteractivityIntents, PerformanceIntents, ReserveIntents, StyleIntents,
    ValidationIntents,
};
use crate::manifest::CapabilityManifest;
use crate::report::{
    codes, CompatibilityInfo, StepOutcome, TransformationStep, WarningInfo, WarningSeverity,
};

pub const DEFAULT_SHAPE: &str = "square";
pub const DEFAULT_MERGE: &str = "none";
pub const DEFAULT_CONNECTIVITY: &str = "4-way";
pub const DEFAULT_FINDER_SHAPE: &str = "square";
pub const DEFAULT_FRAME_SHAPE: &str = "square";
pub const DEFAULT_CLIP_MODE: &str = "clip";
pub const DEFAULT_RESERVE_SHAPE: &str = "rect";
pub const DEFAULT_RESERVE_MODE: &str = "knockout";
pub const DEFAULT_PLACEMENT: &str = "center";
pub const DEFAULT_CURSOR: &str = "default";
pub const DEFAULT_TIMING: &str = "ease";
pub const DEFAULT_OPTIMIZE_FOR: &str = "balanced";
pub const DEFAULT_CHARSET: &str = "utf-8";
pub const DEFAULT_DARK: &str = "black";
pub const DEFAULT_LIGHT: &str = "white";
pub const DEFAULT_ID_PREFIX: &str = "qr";

/// Alternatives listed in an unsupported-value warning.
const MAX_ALTERNATIVES: usize = 5;

/// Per-request processing switches requested through intents. `None`
/// leaves the processor's configured default in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestPolicy {
    pub safe_mode: Option<bool>,
    pub min_contrast: Option<f64>,
    pub check_contrast: Option<bool>,
    pub simulate_scan: Option<bool>,
    pub min_success_rate: Option<f64>,
    pub max_svg_size_kb: Option<f64>,
    pub debug_timing: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct TranslationOutput {
    pub kwargs: Kwargs,
    pub policy: RequestPolicy,
    pub encoding: EncodingHints,
    pub steps: Vec<TransformationStep>,
    pub warnings: Vec<WarningInfo>,
    pub compatibility: Vec<CompatibilityInfo>,
    pub applied_hints: Vec<String>,
}

pub struct IntentTranslator<'m> {
    manifest: &'m CapabilityManifest,
}

impl<'m> IntentTranslator<'m> {
    pub fn new(manifest: &'m CapabilityManifest) -> Self {
        Self { manifest }
    }

    pub fn translate(&self, intents: &IntentsConfig) -> TranslationOutput {
        let mut t = Translation::new(self.manifest);

        if let Some(style) = &intents.style {
            t.style(style);
        }
        if let Some(frame) = &intents.frame {
            t.frame(frame);
        }
        if let Some(reserve) = &intents.reserve {
            t.reserve(reserve);
        }
        if let Some(accessibility) = &intents.accessibility {
            t.accessibility(accessibility);
        }
        if let Some(validation) = &intents.validation {
            t.validation(validation);
        }
        if let Some(interactivity) = &intents.interactivity {
            t.interactivity(interactivity);
        }
        if let Some(animation) = &intents.animation {
            t.animation(animation);
        }
        if let Some(performance) = &intents.performance {
            t.performance(performance);
        }
        if let Some(branding) = &intents.branding {
            t.branding(branding);
        }
        if let Some(advanced) = &intents.advanced {
            t.advanced(advanced);
        }

        t.apply_hints();
        tracing::debug!(
            steps = t.out.steps.len(),
            warnings = t.out.warnings.len(),
            "intent translation finished"
        );
        t.out
    }
}

/// Accumulator for one translation run.
struct Translation<'m> {
    manifest: &'m CapabilityManifest,
    out: TranslationOutput,
    /// key -> (value, originating intent path); first stage wins.
    hints: BTreeMap<String, (Value, String)>,
}

fn number(value: f64, integer: bool) -> Value {
    if integer {
        json!(value as i64)
    } else {
        json!(value)
    }
}

impl<'m> Translation<'m> {
    fn new(manifest: &'m CapabilityManifest) -> Self {
        Self { manifest, out: TranslationOutput::default(), hints: BTreeMap::new() }
    }

    fn step(&mut self, path: &str, original: Value, applied: Value, outcome: StepOutcome, reason: impl Into<String>) {
        self.out.steps.push(TransformationStep::new(path, original, applied, outcome, reason));
    }

    fn warn(&mut self, warning: WarningInfo) {
        self.out.warnings.push(warning);
    }

    fn set(&mut self, key: &str, value: Value) {
        self.out.kwargs.insert(key.to_string(), value);
    }

    fn stage_hint(&mut self, key: &str, value: Value, source: &str) {
        self.hints.entry(key.to_string()).or_insert((value, source.to_string()));
    }

    fn unsupported(&mut self, path: &str, requested: Value, feature: &str, substitute: Value) {
        let alternatives: Vec<String> =
            self.manifest.supported_values(feature).into_iter().take(MAX_ALTERNATIVES).collect();
        let detail = format!("{path}={requested} is not supported; using {substitute}");
        let suggestion = if alternatives.is_empty() {
            "No alternatives are available for this feature".to_string()
        } else {
            format!("Supported alternatives: {}", alternatives.join(", "))
        };
        tracing::debug!(path, %requested, "unsupported intent value");
        self.warn(
            WarningInfo::new(codes::UNSUPPORTED_INTENT, path, detail, WarningSeverity::Warning)
                .with_suggestion(suggestion),
        );
        self.out.compatibility.push(CompatibilityInfo {
            feature: path.to_string(),
            requested,
            supported: false,
            alternatives,
        });
    }

    /// Enumerated field checked against `feature` in the manifest.
    fn enumerated(&mut self, path: &str, value: &str, feature: &str, default: &str) -> String {
        if self.manifest.supports(feature, value) {
            self.step(path, json!(value), json!(value), StepOutcome::Accepted, "supported value");
            value.to_string()
        } else {
            self.step(
                path,
                json!(value),
                json!(default),
                StepOutcome::Rejected,
                format!("'{value}' is not a supported {feature}; using default '{default}'"),
            );
            self.unsupported(path, json!(value), feature, json!(default));
            default.to_string()
        }
    }

    /// Numeric field clamped to the manifest bounds stored under `path`.
    fn numeric(&mut self, path: &str, value: f64, integer: bool) -> f64 {
        let Some(bounds) = self.manifest.bounds(path) else {
            self.step(path, json!(value), number(value, integer), StepOutcome::Accepted, "no declared bounds");
            return value;
        };
        if bounds.contains(value) {
            let applied = if integer { value.round() } else { value };
            if applied != value {
                self.step(path, json!(value), number(applied, true), StepOutcome::Modified, "rounded to an integer");
            } else {
                self.step(path, json!(value), number(applied, integer), StepOutcome::Accepted, "within bounds");
            }
            return applied;
        }
        let mut applied = bounds.clamp(value);
        if integer {
            applied = applied.round();
        }
        self.step(
            path,
            json!(value),
            number(applied, integer),
            StepOutcome::Modified,
            format!("outside [{}, {}]; clamped", bounds.min, bounds.max),
        );
        self.warn(
            WarningInfo::new(
                codes::VALUE_CLAMPED,
                path,
                format!("attempted {value}, applied {applied}"),
                WarningSeverity::Warning,
            )
            .with_suggestion(format!("Use a value between {} and {}", bounds.min, bounds.max)),
        );
        applied
    }

    /// Boolean feature toggle checked against `<category>.features`.
    /// Switching a feature off is always honoured.
    fn toggle(&mut self, category: &str, field: &str, value: bool) -> bool {
        let path = format!("{category}.{field}");
        let feature = format!("{category}.features");
        if !value || self.manifest.supports(&feature, field) {
            self.step(&path, json!(value), json!(value), StepOutcome::Accepted, "supported feature");
            return value;
        }
        self.step(
            &path,
            json!(value),
            json!(false),
            StepOutcome::Rejected,
            format!("feature '{field}' is not supported"),
        );
        self.unsupported(&path, json!(value), &feature, json!(false));
        false
    }

    fn flag(&mut self, path: &str, value: bool) -> bool {
        self.step(path, json!(value), json!(value), StepOutcome::Accepted, "accepted");
        value
    }

    fn text(&mut self, path: &str, value: &str) -> String {
        self.step(path, json!(value), json!(value), StepOutcome::Accepted, "accepted");
        value.to_string()
    }

    /// Colour field. Translucent colours are flattened. Unparseable ones are
    /// replaced by `default`, or dropped when there is none.
    fn color(&mut self, path: &str, value: &str, default: Option<&str>) -> Option<String> {
        match parse_color(value) {
            Some(parsed) if parsed.is_opaque() => {
                self.step(path, json!(value), json!(value), StepOutcome::Accepted, "valid colour");
                Some(value.to_string())
            }
            Some(parsed) => {
                let flat = to_hex(parsed.rgb);
                self.step(path, json!(value), json!(flat), StepOutcome::Degraded, "alpha channel dropped");
                self.warn(
                    WarningInfo::new(
                        codes::COLOR_ALPHA_DROPPED,
                        path,
                        format!("{value} rendered as opaque {flat}"),
                        WarningSeverity::Info,
                    )
                    .with_suggestion("Use an opaque colour for predictable contrast"),
                );
                Some(flat)
            }
            None => {
                let reason = match default {
                    Some(d) => format!("unrecognised colour; using '{d}'"),
                    None => "unrecognised colour; ignored".to_string(),
                };
                self.step(path, json!(value), json!(default), StepOutcome::Rejected, reason);
                self.warn(
                    WarningInfo::new(
                        codes::INVALID_VALUE,
                        path,
                        format!("'{value}' is not a recognised colour"),
                        WarningSeverity::Warning,
                    )
                    .with_suggestion("Use a named colour, #rrggbb or rgb(r, g, b)"),
                );
                default.map(str::to_string)
            }
        }
    }

    fn missing_dependency(&mut self, path: &str, requires: &str) {
        self.warn(
            WarningInfo::new(
                codes::MISSING_DEPENDENCY,
                path,
                format!("{path} has no effect unless {requires}"),
                WarningSeverity::Info,
            )
            .with_suggestion(format!("Set {requires}")),
        );
    }

    fn style(&mut self, s: &StyleIntents) {
        if let Some(v) = &s.module_shape {
            let applied = self.enumerated("style.module_shape", v, "shape", DEFAULT_SHAPE);
            self.set("shape", json!(applied));
        }
        let mut merge_active = false;
        if let Some(v) = &s.merge {
            let applied = self.enumerated("style.merge", v, "merge", DEFAULT_MERGE);
            merge_active = applied != DEFAULT_MERGE;
            self.set("merge", json!(applied));
        }
        if let Some(v) = &s.connectivity {
            let applied = self.enumerated("style.connectivity", v, "connectivity", DEFAULT_CONNECTIVITY);
            self.set("connectivity", json!(applied));
        }
        if let Some(v) = s.corner_radius {
            let applied = self.numeric("style.corner_radius", v, false);
            self.set("corner_radius", json!(applied));
        }
        if let Some(v) = s.min_island_modules {
            let applied = self.numeric("style.min_island_modules", v, true);
            self.set("min_island_modules", number(applied, true));
            if !merge_active {
                self.missing_dependency("style.min_island_modules", "style.merge is soft or aggressive");
            }
        }
        if let Some(v) = s.scale {
            let applied = self.numeric("style.scale", v, true);
            self.set("scale", number(applied, true));
        }
        if let Some(v) = &s.finder_shape {
            let applied = self.enumerated("style.finder_shape", v, "finder_shape", DEFAULT_FINDER_SHAPE);
            self.set("finder_shape", json!(applied));
        }
        if let Some(v) = s.finder_inner_scale {
            let applied = self.numeric("style.finder_inner_scale", v, false);
            self.set("finder_inner_scale", json!(applied));
        }
        if let Some(v) = s.finder_stroke {
            let applied = self.numeric("style.finder_stroke", v, false);
            self.set("finder_stroke", json!(applied));
        }
        if let Some(palette) = &s.palette {
            if let Some(fg) = &palette.fg {
                if let Some(applied) = self.color("style.palette.fg", fg, Some(DEFAULT_DARK)) {
                    self.set("dark", json!(applied));
                }
            }
            if let Some(bg) = &palette.bg {
                if let Some(applied) = self.color("style.palette.bg", bg, Some(DEFAULT_LIGHT)) {
                    self.set("light", json!(applied));
                }
            }
        }
        if let Some(patterns) = &s.patterns {
            for (target, color) in patterns {
                let path = format!("style.patterns.{target}");
                if !self.manifest.supports("pattern_targets", target) {
                    self.step(
                        &path,
                        json!(color),
                        Value::Null,
                        StepOutcome::Rejected,
                        format!("'{target}' is not a stylable pattern"),
                    );
                    self.unsupported(&path, json!(target), "pattern_targets", Value::Null);
                    continue;
                }
                // An unparseable pattern colour is dropped rather than painted black.
                if let Some(applied) = self.color(&path, color, None) {
                    self.set(&format!("pattern_{target}"), json!(applied));
                }
            }
        }
    }

    fn frame(&mut self, f: &FrameIntents) {
        let mut shape = DEFAULT_FRAME_SHAPE.to_string();
        if let Some(v) = &f.shape {
            shape = self.enumerated("frame.shape", v, "frame_shape", DEFAULT_FRAME_SHAPE);
            self.set("frame_shape", json!(shape));
        }
        if let Some(v) = f.corner_radius {
            let applied = self.numeric("frame.corner_radius", v, false);
            self.set("frame_corner_radius", json!(applied));
        }
        let mut clip_mode = DEFAULT_CLIP_MODE.to_string();
        if let Some(v) = &f.clip_mode {
            clip_mode = self.enumerated("frame.clip_mode", v, "clip_mode", DEFAULT_CLIP_MODE);
            self.set("frame_clip_mode", json!(clip_mode));
        }
        if let Some(v) = f.fade_distance {
            let applied = self.numeric("frame.fade_distance", v, false);
            self.set("frame_fade_distance", json!(applied));
            if clip_mode != "fade" {
                self.missing_dependency("frame.fade_distance", "frame.clip_mode is 'fade'");
            }
        }
        if let Some(v) = f.scale_distance {
            let applied = self.numeric("frame.scale_distance", v, false);
            self.set("frame_scale_distance", json!(applied));
            if clip_mode != "scale" {
                self.missing_dependency("frame.scale_distance", "frame.clip_mode is 'scale'");
            }
        }
        if let Some(v) = &f.custom_path {
            let applied = self.text("frame.custom_path", v);
            self.set("frame_custom_path", json!(applied));
            if shape != "custom" {
                self.missing_dependency("frame.custom_path", "frame.shape is 'custom'");
            }
        }
        if let Some(v) = f.quiet_zone {
            let applied = self.numeric("frame.quiet_zone", v, true);
            self.set("border", number(applied, true));
        }
    }

    fn reserve(&mut self, r: &ReserveIntents) {
        let enabled = match r.enabled {
            Some(v) => {
                let applied = self.flag("reserve.enabled", v);
                self.set("centerpiece_enabled", json!(applied));
                applied
            }
            None => false,
        };
        if let Some(v) = r.size {
            let applied = self.numeric("reserve.size", v, false);
            self.set("centerpiece_size", json!(applied));
        }
        if let Some(v) = &r.shape {
            let applied = self.enumerated("reserve.shape", v, "reserve_shape", DEFAULT_RESERVE_SHAPE);
            self.set("centerpiece_shape", json!(applied));
        }
        if let Some(v) = &r.mode {
            let applied = self.enumerated("reserve.mode", v, "reserve_mode", DEFAULT_RESERVE_MODE);
            self.set("centerpiece_mode", json!(applied));
        }
        let placement = match &r.placement {
            Some(v) => self.enumerated("reserve.placement", v, "placement", DEFAULT_PLACEMENT),
            None => DEFAULT_PLACEMENT.to_string(),
        };
        let centered = r.placement.is_some() && placement == "center";
        for (path, key, value) in
            [("reserve.offset_x", "centerpiece_offset_x", r.offset_x), ("reserve.offset_y", "centerpiece_offset_y", r.offset_y)]
        {
            let Some(v) = value else { continue };
            if centered && v != 0.0 {
                self.step(path, json!(v), json!(0.0), StepOutcome::Modified, "placement 'center' ignores offsets");
                self.set(key, json!(0.0));
            } else {
                let applied = self.numeric(path, v, false);
                self.set(key, json!(applied));
            }
        }
        if let Some(v) = r.margin {
            let applied = self.numeric("reserve.margin", v, true);
            self.set("centerpiece_margin", number(applied, true));
        }

        let other_fields = r.size.is_some()
            || r.shape.is_some()
            || r.offset_x.is_some()
            || r.offset_y.is_some()
            || r.margin.is_some()
            || r.mode.is_some()
            || r.placement.is_some();
        if !enabled && other_fields {
            self.missing_dependency("reserve.enabled", "reserve.enabled is true");
        }
    }

    fn accessibility(&mut self, a: &AccessibilityIntents) {
        let enabled = match a.enabled {
            Some(v) => {
                let applied = self.flag("accessibility.enabled", v);
                self.set("accessibility_enabled", json!(applied));
                applied
            }
            None => false,
        };
        if let Some(v) = &a.id_prefix {
            let valid = v.chars().next().map_or(false, |c| c.is_ascii_alphabetic())
                && v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if valid {
                let applied = self.text("accessibility.id_prefix", v);
                self.set("accessibility_id_prefix", json!(applied));
            } else {
                self.step(
                    "accessibility.id_prefix",
                    json!(v),
                    json!(DEFAULT_ID_PREFIX),
                    StepOutcome::Rejected,
                    "not a valid XML id prefix",
                );
                self.warn(
                    WarningInfo::new(
                        codes::INVALID_VALUE,
                        "accessibility.id_prefix",
                        format!("'{v}' is not a valid id prefix; using '{DEFAULT_ID_PREFIX}'"),
                        WarningSeverity::Warning,
                    )
                    .with_suggestion("Start with a letter; use letters, digits, '-' or '_'"),
                );
                self.set("accessibility_id_prefix", json!(DEFAULT_ID_PREFIX));
            }
        }
        let toggles = [
            ("use_stable_ids", "accessibility_use_stable_ids", a.use_stable_ids),
            ("include_coordinates", "accessibility_include_coordinates", a.include_coordinates),
            ("enable_aria", "accessibility_enable_aria", a.enable_aria),
            ("pattern_labels", "accessibility_include_pattern_labels", a.pattern_labels),
        ];
        let mut dependent = false;
        for (field, key, value) in toggles {
            if let Some(v) = value {
                let applied = self.toggle("accessibility", field, v);
                self.set(key, json!(applied));
                dependent = true;
            }
        }
        if let Some(v) = &a.title {
            let applied = self.text("accessibility.title", v);
            self.set("accessibility_root_label", json!(applied));
            dependent = true;
        }
        if let Some(v) = &a.description {
            let applied = self.text("accessibility.description", v);
            self.set("accessibility_description", json!(applied));
            dependent = true;
        }
        if dependent && !enabled {
            self.missing_dependency("accessibility.enabled", "accessibility.enabled is true");
        }
    }

    fn validation(&mut self, v: &ValidationIntents) {
        if let Some(value) = v.enforce_scanability {
            let applied = self.flag("validation.enforce_scanability", value);
            self.out.policy.safe_mode = Some(applied);
            self.set("safe_mode", json!(applied));
        }
        if let Some(value) = v.min_contrast {
            self.out.policy.min_contrast = Some(self.numeric("validation.min_contrast", value, false));
        }
        if let Some(value) = v.check_contrast {
            self.out.policy.check_contrast = Some(self.flag("validation.check_contrast", value));
        }
        if let Some(value) = v.simulate_scan {
            self.out.policy.simulate_scan = Some(self.flag("validation.simulate_scan", value));
        }
        if let Some(value) = v.min_success_rate {
            self.out.policy.min_success_rate = Some(self.numeric("validation.min_success_rate", value, false));
            if v.simulate_scan != Some(true) {
                self.missing_dependency("validation.min_success_rate", "validation.simulate_scan is true");
            }
        }
    }

    fn interactivity(&mut self, i: &InteractivityIntents) {
        let mut interactive = false;
        if let Some(v) = i.hover_effects {
            interactive |= self.toggle("interactivity", "hover_effects", v);
        }
        if let Some(v) = i.click_handlers {
            interactive |= self.toggle("interactivity", "click_handlers", v);
        }
        if i.hover_effects.is_some() || i.click_handlers.is_some() {
            self.set("style_interactive", json!(interactive));
        }
        if let Some(v) = i.tooltips {
            let applied = self.toggle("interactivity", "tooltips", v);
            self.set("style_tooltips", json!(applied));
        }
        let hover_on = i.hover_effects == Some(true);
        if let Some(v) = i.hover_scale {
            let applied = self.numeric("interactivity.hover_scale", v, false);
            self.set("style_hover_scale", json!(applied));
            if !hover_on {
                self.missing_dependency("interactivity.hover_scale", "interactivity.hover_effects is true");
            }
        }
        if let Some(v) = i.hover_brightness {
            let applied = self.numeric("interactivity.hover_brightness", v, false);
            self.set("style_hover_brightness", json!(applied));
            if !hover_on {
                self.missing_dependency("interactivity.hover_brightness", "interactivity.hover_effects is true");
            }
        }
        if let Some(v) = &i.cursor_style {
            let applied = self.enumerated("interactivity.cursor_style", v, "cursor", DEFAULT_CURSOR);
            self.set("style_cursor", json!(applied));
        }
    }

    fn animation(&mut self, a: &AnimationIntents) {
        if let Some(v) = a.fade_in {
            let applied = self.toggle("animation", "fade_in", v);
            self.set("animation_fade_in", json!(applied));
        }
        if let Some(v) = a.fade_duration {
            let applied = self.numeric("animation.fade_duration", v, false);
            self.set("animation_fade_duration", json!(applied));
            if a.fade_in != Some(true) {
                self.missing_dependency("animation.fade_duration", "animation.fade_in is true");
            }
        }
        if let Some(v) = a.stagger_animation {
            let applied = self.toggle("animation", "stagger_animation", v);
            self.set("animation_stagger", json!(applied));
        }
        if let Some(v) = a.stagger_delay {
            let applied = self.numeric("animation.stagger_delay", v, false);
            self.set("animation_stagger_delay", json!(applied));
            if a.stagger_animation != Some(true) {
                self.missing_dependency("animation.stagger_delay", "animation.stagger_animation is true");
            }
        }
        if let Some(v) = a.pulse_effect {
            self.toggle("animation", "pulse_effect", v);
        }
        if let Some(v) = &a.transition_timing {
            let applied = self.enumerated("animation.transition_timing", v, "timing", DEFAULT_TIMING);
            self.set("animation_timing", json!(applied));
        }
    }

    fn performance(&mut self, p: &PerformanceIntents) {
        if let Some(v) = &p.optimize_for {
            let applied = self.enumerated("performance.optimize_for", v, "optimize_for", DEFAULT_OPTIMIZE_FOR);
            let source = "performance.optimize_for";
            match applied.as_str() {
                "size" => {
                    self.stage_hint("merge", json!("soft"), source);
                    self.stage_hint("min_island_modules", json!(2), source);
                    self.stage_hint("accessibility_use_stable_ids", json!(false), source);
                }
                "quality" => {
                    self.stage_hint("connectivity", json!("8-way"), source);
                    self.stage_hint("merge", json!("soft"), source);
                }
                _ => {}
            }
        }
        if let Some(v) = p.max_svg_size_kb {
            self.out.policy.max_svg_size_kb = Some(self.numeric("performance.max_svg_size_kb", v, false));
        }
        if let Some(v) = p.debug_timing {
            self.out.policy.debug_timing = Some(self.flag("performance.debug_timing", v));
        }
    }

    fn branding(&mut self, b: &BrandingIntents) {
        if let Some(v) = &b.primary_color {
            if let Some(applied) = self.color("branding.primary_color", v, None) {
                self.stage_hint("dark", json!(applied), "branding.primary_color");
            }
        }
        if let Some(v) = &b.accent_color {
            if let Some(applied) = self.color("branding.accent_color", v, None) {
                self.stage_hint("pattern_finder", json!(applied), "branding.accent_color");
            }
        }
        if let Some(v) = &b.logo_url {
            let path = "branding.logo_url";
            if self.manifest.supports("branding.features", "logo") {
                self.text(path, v);
                self.stage_hint("centerpiece_enabled", json!(true), path);
                self.stage_hint("centerpiece_size", json!(0.15), path);
            } else {
                self.step(path, json!(v), Value::Null, StepOutcome::Rejected, "logo embedding is not supported");
                self.unsupported(path, json!(v), "branding.features", Value::Null);
                if let Some(w) = self.out.warnings.last_mut() {
                    w.suggestion = Some(
                        "Enable reserve.enabled and overlay the logo on the rendered output".to_string(),
                    );
                }
            }
        }
    }

    fn advanced(&mut self, a: &AdvancedIntents) {
        if let Some(v) = a.mask_pattern {
            let applied = self.numeric("advanced.mask_pattern", v, true);
            self.out.encoding.mask_pattern = Some(applied as u8);
        }
        if let Some(v) = a.min_version {
            let applied = self.numeric("advanced.min_version", v, true);
            self.out.encoding.min_version = Some(applied as u8);
        }
        if let Some(v) = a.boost_error {
            self.out.encoding.boost_error = self.toggle("advanced", "boost_error", v);
        }
        if let Some(v) = &a.charset {
            let applied = self.enumerated("advanced.charset", v, "charset", DEFAULT_CHARSET);
            self.out.encoding.charset = Some(applied);
        }
        if let Some(v) = a.structured_append {
            self.toggle("advanced", "structured_append", v);
        }
        if let Some(v) = a.micro_qr {
            self.toggle("advanced", "micro_qr", v);
        }
    }

    /// Fill keys the caller did not set explicitly from staged hints.
    fn apply_hints(&mut self) {
        let hints = std::mem::take(&mut self.hints);
        for (key, (value, source)) in hints {
            if self.out.kwargs.contains_key(&key) {
                continue;
            }
            self.out.applied_hints.push(format!("{key}={value} (from {source})"));
            self.out.kwargs.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intents::{Palette, StyleIntents};
    use crate::manifest::Bounds;

    fn translate(intents: IntentsConfig) -> TranslationOutput {
        let manifest = CapabilityManifest::builtin();
        IntentTranslator::new(&manifest).translate(&intents)
    }

    #[test]
    fn test_every_field_gets_one_step() {
        let out = translate(IntentsConfig {
            style: Some(StyleIntents {
                module_shape: Some("circle".into()),
                corner_radius: Some(0.2),
                scale: Some(12.0),
                ..StyleIntents::default()
            }),
            ..IntentsConfig::default()
        });
        assert_eq!(out.steps.len(), 3);
        assert!(out.steps.iter().all(|s| s.outcome == StepOutcome::Accepted));
        assert!(out.warnings.is_empty());
        assert_eq!(out.kwargs["shape"], json!("circle"));
        assert_eq!(out.kwargs["scale"], json!(12));
    }

    #[test]
    fn test_unsupported_shape_rejected_to_default() {
        let out = translate(IntentsConfig {
            style: Some(StyleIntents { module_shape: Some("blob".into()), ..StyleIntents::default() }),
            ..IntentsConfig::default()
        });
        assert_eq!(out.kwargs["shape"], json!(DEFAULT_SHAPE));
        assert_eq!(out.steps[0].outcome, StepOutcome::Rejected);
        let warning = &out.warnings[0];
        assert_eq!(warning.code, codes::UNSUPPORTED_INTENT);
        let listed = warning.suggestion.as_deref().unwrap().split(", ").count();
        assert_eq!(listed, MAX_ALTERNATIVES);
    }

    #[test]
    fn test_out_of_range_clamped() {
        let out = translate(IntentsConfig {
            style: Some(StyleIntents { corner_radius: Some(2.5), ..StyleIntents::default() }),
            ..IntentsConfig::default()
        });
        assert_eq!(out.kwargs["corner_radius"], json!(1.0));
        assert_eq!(out.steps[0].outcome, StepOutcome::Modified);
        assert_eq!(out.warnings[0].code, codes::VALUE_CLAMPED);
        assert!(out.warnings[0].detail.contains("2.5"));
    }

    #[test]
    fn test_reserve_fields_rekeyed_and_dependency_flagged() {
        let out = translate(IntentsConfig {
            reserve: Some(ReserveIntents { size: Some(0.1), ..ReserveIntents::default() }),
            ..IntentsConfig::default()
        });
        assert_eq!(out.kwargs["centerpiece_size"], json!(0.1));
        assert!(out.warnings.iter().any(|w| w.code == codes::MISSING_DEPENDENCY && w.path == "reserve.enabled"));
    }

    #[test]
    fn test_center_placement_zeroes_offsets() {
        let out = translate(IntentsConfig {
            reserve: Some(ReserveIntents {
                enabled: Some(true),
                placement: Some("center".into()),
                offset_x: Some(0.2),
                ..ReserveIntents::default()
            }),
            ..IntentsConfig::default()
        });
        assert_eq!(out.kwargs["centerpiece_offset_x"], json!(0.0));
    }

    #[test]
    fn test_hints_never_override_explicit_values() {
        let out = translate(IntentsConfig {
            style: Some(StyleIntents {
                merge: Some("none".into()),
                palette: Some(Palette { fg: Some("navy".into()), bg: None }),
                ..StyleIntents::default()
            }),
            performance: Some(PerformanceIntents { optimize_for: Some("size".into()), ..PerformanceIntents::default() }),
            branding: Some(BrandingIntents { primary_color: Some("#112233".into()), ..BrandingIntents::default() }),
            ..IntentsConfig::default()
        });
        assert_eq!(out.kwargs["merge"], json!("none"));
        assert_eq!(out.kwargs["dark"], json!("navy"));
        assert_eq!(out.kwargs["min_island_modules"], json!(2));
        assert!(out.applied_hints.iter().any(|h| h.starts_with("min_island_modules")));
        assert!(!out.applied_hints.iter().any(|h| h.starts_with("dark")));
    }

    #[test]
    fn test_unsupported_toggle_is_rejected() {
        let out = translate(IntentsConfig {
            interactivity: Some(InteractivityIntents { click_handlers: Some(true), ..InteractivityIntents::default() }),
            ..IntentsConfig::default()
        });
        assert_eq!(out.steps[0].outcome, StepOutcome::Rejected);
        assert_eq!(out.kwargs["style_interactive"], json!(false));
        assert_eq!(out.compatibility.len(), 1);
    }

    #[test]
    fn test_translucent_colour_degraded() {
        let out = translate(IntentsConfig {
            style: Some(StyleIntents {
                palette: Some(Palette { fg: Some("#11223380".into()), bg: None }),
                ..StyleIntents::default()
            }),
            ..IntentsConfig::default()
        });
        assert_eq!(out.steps[0].outcome, StepOutcome::Degraded);
        assert_eq!(out.kwargs["dark"], json!("#112233"));
    }

    #[test]
    fn test_unparseable_pattern_colour_recorded_as_dropped() {
        let out = translate(IntentsConfig {
            style: Some(StyleIntents {
                patterns: Some([("finder".to_string(), "not-a-colour".to_string())].into_iter().collect()),
                ..StyleIntents::default()
            }),
            ..IntentsConfig::default()
        });
        let step = &out.steps[0];
        assert_eq!(step.path, "style.patterns.finder");
        assert_eq!(step.outcome, StepOutcome::Rejected);
        assert_eq!(step.transformed_value, Value::Null);
        assert!(!out.kwargs.contains_key("pattern_finder"));
        assert_eq!(out.warnings[0].code, codes::INVALID_VALUE);
    }

    #[test]
    fn test_inverted_manifest_bounds_treated_as_unbounded() {
        let mut manifest = CapabilityManifest::builtin();
        manifest.bounds.insert("style.scale".to_string(), Bounds::new(100.0, 1.0));
        let out = IntentTranslator::new(&manifest).translate(&IntentsConfig {
            style: Some(StyleIntents { scale: Some(500.0), ..StyleIntents::default() }),
            ..IntentsConfig::default()
        });
        assert_eq!(out.kwargs["scale"], json!(500));
        assert_eq!(out.steps[0].outcome, StepOutcome::Accepted);
    }

    #[test]
    fn test_missing_manifest_feature_rejects_everything() {
        let mut manifest = CapabilityManifest::builtin();
        manifest.features.remove("merge");
        let out = IntentTranslator::new(&manifest).translate(&IntentsConfig {
            style: Some(StyleIntents { merge: Some("soft".into()), ..StyleIntents::default() }),
            ..IntentsConfig::default()
        });
        assert_eq!(out.kwargs["merge"], json!(DEFAULT_MERGE));
        assert!(out.warnings[0].suggestion.as_deref().unwrap().contains("No alternatives"));
    }

    #[test]
    fn test_validation_intents_feed_policy() {
        let out = translate(IntentsConfig {
            validation: Some(ValidationIntents {
                enforce_scanability: Some(true),
                min_contrast: Some(30.0),
                ..ValidationIntents::default()
            }),
            ..IntentsConfig::default()
        });
        assert_eq!(out.policy.safe_mode, Some(true));
        assert_eq!(out.policy.min_contrast, Some(21.0));
        assert_eq!(out.kwargs["safe_mode"], json!(true));
    }
}
