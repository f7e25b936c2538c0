//! Safety Validation - geometry and contrast limits
//!
//! Checks produce structured violations. Errors must be fixed, warnings
//! are advice. Some errors carry a deterministic [`SafetyFix`].

use serde::{Deserialize, Serialize};

use crate::color::contrast_between;
use crate::config::{FrameShape, MergeStrategy, ModuleShape, RenderingConfig, ReserveShape};
use crate::encoder::{region_at, Matrix, ModuleRegion};
use crate::intents::ErrorLevel;

/// Share of nominal recovery capacity the reserve area may consume.
pub const SAFETY_MARGIN: f64 = 0.8;
/// Exponent of the superellipse used for squircle shapes.
pub const SQUIRCLE_EXPONENT: f64 = 4.0;
pub const VERY_SMALL_MODULE_PX: u32 = 3;
pub const ALIASING_BAND_PX: std::ops::RangeInclusive<u32> = 3..=4;
pub const LARGE_MODULE_PX: u32 = 50;
pub const STANDARD_QUIET_ZONE: u32 = 4;
pub const SHAPED_FRAME_QUIET_ZONE: u32 = 6;
pub const CIRCLE_FRAME_MAX_RESERVE: f64 = 0.2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

/// Deterministic correction for an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SafetyFix {
    ClampReserve { size: f64, margin: u32 },
    RecenterReserve,
}

impl SafetyFix {
    pub fn apply(&self, config: &RenderingConfig) -> RenderingConfig {
        let mut next = config.clone();
        match *self {
            Self::ClampReserve { size, margin } => {
                next.centerpiece.size = size;
                next.centerpiece.margin = margin;
            }
            Self::RecenterReserve => {
                next.centerpiece.offset_x = 0.0;
                next.centerpiece.offset_y = 0.0;
            }
        }
        next
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub remediation: Vec<String>,
    pub fix: Option<SafetyFix>,
}

impl SafetyViolation {
    fn new(rule: &str, severity: ViolationSeverity, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            severity,
            message: message.into(),
            expected: None,
            actual: None,
            remediation: vec![],
            fix: None,
        }
    }

    fn expected(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    fn remediate(mut self, steps: &[&str]) -> Self {
        self.remediation = steps.iter().map(|s| s.to_string()).collect();
        self
    }

    fn with_fix(mut self, fix: SafetyFix) -> Self {
        self.fix = Some(fix);
        self
    }
}

/// What the validator needs to know about the encoded symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EncodingParams {
    pub version: u8,
    pub error_level: ErrorLevel,
    /// Modules per side.
    pub size: usize,
}

impl From<&Matrix> for EncodingParams {
    fn from(matrix: &Matrix) -> Self {
        Self { version: matrix.version, error_level: matrix.error_level, size: matrix.size }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyReport {
    pub valid: bool,
    pub violations: Vec<SafetyViolation>,
    pub recommendations: Vec<String>,
    pub contrast_ratio: Option<f64>,
    pub reserve_fraction: f64,
    pub max_reserve_fraction: f64,
    pub max_safe_reserve_size: f64,
}

impl SafetyReport {
    pub fn errors(&self) -> impl Iterator<Item = &SafetyViolation> {
        self.violations.iter().filter(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &SafetyViolation> {
        self.violations.iter().filter(|v| v.severity == ViolationSeverity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}

// --- Geometry ---

/// Ceiling on the share of the symbol a reserve area may cover.
pub fn safe_reserve_ceiling(level: ErrorLevel) -> f64 {
    level.recovery_capacity() * SAFETY_MARGIN
}

/// Share of the bounding square covered by `|x|^n + |y|^n <= 1`.
pub fn superellipse_fill(n: f64) -> f64 {
    const STEPS: usize = 2000;
    let dx = 1.0 / STEPS as f64;
    (0..STEPS)
        .map(|i| {
            let x = (i as f64 + 0.5) * dx;
            (1.0 - x.powf(n)).max(0.0).powf(1.0 / n) * dx
        })
        .sum()
}

pub fn shape_fill(shape: ReserveShape) -> f64 {
    match shape {
        ReserveShape::Rect => 1.0,
        ReserveShape::Circle => std::f64::consts::FRAC_PI_4,
        ReserveShape::Squircle => superellipse_fill(SQUIRCLE_EXPONENT),
    }
}

/// Whether a point at offset (`dx`, `dy`) from the centre lies inside a
/// shape of half-extent `half`.
pub fn shape_contains(shape: ReserveShape, dx: f64, dy: f64, half: f64) -> bool {
    if half <= 0.0 {
        return false;
    }
    match shape {
        ReserveShape::Rect => dx.abs() <= half && dy.abs() <= half,
        ReserveShape::Circle => dx * dx + dy * dy <= half * half,
        ReserveShape::Squircle => {
            (dx / half).abs().powf(SQUIRCLE_EXPONENT) + (dy / half).abs().powf(SQUIRCLE_EXPONENT) <= 1.0
        }
    }
}

/// Side of the cleared area in modules, margin included.
fn reserve_side_modules(config: &RenderingConfig, size: usize) -> f64 {
    config.centerpiece.size * size as f64 + 2.0 * f64::from(config.centerpiece.margin)
}

/// Whether module (`x`, `y`) of a symbol with `size` modules per side is
/// cleared by the reserve area.
pub fn module_in_reserve(config: &RenderingConfig, size: usize, x: usize, y: usize) -> bool {
    let c = &config.centerpiece;
    if !c.enabled || c.size <= 0.0 {
        return false;
    }
    let n = size as f64;
    let cx = n / 2.0 + c.offset_x * n;
    let cy = n / 2.0 + c.offset_y * n;
    let half = reserve_side_modules(config, size) / 2.0;
    shape_contains(c.shape, x as f64 + 0.5 - cx, y as f64 + 0.5 - cy, half)
}

/// Share of the symbol covered by the reserve area, margin included.
/// Zero whenever [`module_in_reserve`] clears nothing.
pub fn reserve_fraction(config: &RenderingConfig, size: usize) -> f64 {
    if !config.centerpiece.enabled || config.centerpiece.size <= 0.0 || size == 0 {
        return 0.0;
    }
    let side = reserve_side_modules(config, size) / size as f64;
    side * side * shape_fill(config.centerpiece.shape)
}

/// Largest reserve (size, margin) that stays under the ceiling.
///
/// The margin keeps its value while it leaves room for the area itself,
/// otherwise it shrinks so that it takes at most half of the allowed side.
pub fn max_safe_reserve(config: &RenderingConfig, params: &EncodingParams) -> (f64, u32) {
    let n = params.size.max(1) as f64;
    let ceiling = safe_reserve_ceiling(params.error_level);
    let side = (ceiling / shape_fill(config.centerpiece.shape)).sqrt();
    let margin_cap = (side * n / 4.0).floor() as u32;
    let margin = config.centerpiece.margin.min(margin_cap);
    let size = side - 2.0 * f64::from(margin) / n;
    ((size.max(0.0) * 1000.0).floor() / 1000.0, margin)
}

/// Largest `centerpiece.size` that stays under the ceiling.
pub fn max_safe_reserve_size(config: &RenderingConfig, params: &EncodingParams) -> f64 {
    max_safe_reserve(config, params).0
}

// --- Checks ---

/// Safety check - produces violations
pub trait SafetyCheck: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, config: &RenderingConfig, params: &EncodingParams) -> Vec<SafetyViolation>;
}

pub struct ContrastCheck {
    pub min_ratio: f64,
}

impl SafetyCheck for ContrastCheck {
    fn name(&self) -> &'static str { "contrast" }

    fn validate(&self, config: &RenderingConfig, _params: &EncodingParams) -> Vec<SafetyViolation> {
        let ratio = contrast_between(&config.dark, &config.light);
        match ratio {
            Some(r) if r >= self.min_ratio => vec![],
            _ => {
                let actual = ratio.map_or_else(|| "unmeasurable".to_string(), |r| format!("{r:.2}:1"));
                vec![SafetyViolation::new(self.name(), ViolationSeverity::Error, "Contrast ratio too low")
                    .expected(format!("{:.1}:1 minimum", self.min_ratio), actual)
                    .remediate(&[
                        "Darken the foreground colour",
                        "Lighten the background colour",
                        "Use black on white for maximum contrast",
                    ])]
            }
        }
    }
}

pub struct ModuleSizeCheck;

impl SafetyCheck for ModuleSizeCheck {
    fn name(&self) -> &'static str { "module_size" }

    fn validate(&self, config: &RenderingConfig, _params: &EncodingParams) -> Vec<SafetyViolation> {
        let px = config.scale;
        let actual = format!("{px}px");
        if px < VERY_SMALL_MODULE_PX {
            vec![SafetyViolation::new(self.name(), ViolationSeverity::Warning, "Modules too small to scan reliably")
                .expected(format!("{VERY_SMALL_MODULE_PX}px minimum"), actual)
                .remediate(&["Increase scale"])]
        } else if ALIASING_BAND_PX.contains(&px) {
            vec![SafetyViolation::new(
                self.name(),
                ViolationSeverity::Warning,
                "Module size prone to aliasing on low-DPI displays",
            )
            .expected(format!("more than {}px", ALIASING_BAND_PX.end()), actual)
            .remediate(&["Increase scale to 5 or more", "Render at an integer device pixel ratio"])]
        } else if px > LARGE_MODULE_PX {
            vec![SafetyViolation::new(self.name(), ViolationSeverity::Warning, "Very large modules inflate output size")
                .expected(format!("{LARGE_MODULE_PX}px maximum"), actual)
                .remediate(&["Reduce scale and let the client scale the SVG"])]
        } else {
            vec![]
        }
    }
}

pub struct QuietZoneCheck;

impl SafetyCheck for QuietZoneCheck {
    fn name(&self) -> &'static str { "quiet_zone" }

    fn validate(&self, config: &RenderingConfig, _params: &EncodingParams) -> Vec<SafetyViolation> {
        let border = config.border;
        let shaped = config.frame.shape != FrameShape::Square;
        let required = if shaped { SHAPED_FRAME_QUIET_ZONE } else { STANDARD_QUIET_ZONE };
        if border >= required {
            return vec![];
        }
        let message = if shaped {
            "Non-square frames need a larger quiet zone"
        } else {
            "Quiet zone below the standard four modules"
        };
        vec![SafetyViolation::new(self.name(), ViolationSeverity::Warning, message)
            .expected(format!("{required} modules"), format!("{border} modules"))
            .remediate(&["Increase frame.quiet_zone"])]
    }
}

pub struct ReserveAreaCheck;

impl SafetyCheck for ReserveAreaCheck {
    fn name(&self) -> &'static str { "reserve_area" }

    fn validate(&self, config: &RenderingConfig, params: &EncodingParams) -> Vec<SafetyViolation> {
        let c = &config.centerpiece;
        if !c.enabled {
            return vec![];
        }
        let mut violations = vec![];

        let fraction = reserve_fraction(config, params.size);
        let ceiling = safe_reserve_ceiling(params.error_level);
        if fraction > ceiling {
            let (size, margin) = max_safe_reserve(config, params);
            violations.push(
                SafetyViolation::new(
                    self.name(),
                    ViolationSeverity::Error,
                    format!("Reserve area exceeds error correction capacity at level {}", params.error_level),
                )
                .expected(format!("{:.1}% of symbol", ceiling * 100.0), format!("{:.1}%", fraction * 100.0))
                .remediate(&["Reduce reserve.size", "Use error correction level H", "Reduce reserve.margin"])
                .with_fix(SafetyFix::ClampReserve { size, margin }),
            );
        }

        let half = c.size / 2.0;
        if c.offset_x.abs() + half > 0.5 || c.offset_y.abs() + half > 0.5 {
            violations.push(
                SafetyViolation::new(self.name(), ViolationSeverity::Error, "Reserve area extends past the symbol")
                    .expected("|offset| + size/2 <= 0.5", format!("offset ({}, {}), size {}", c.offset_x, c.offset_y, c.size))
                    .remediate(&["Move the reserve area towards the centre", "Reduce reserve.size"])
                    .with_fix(SafetyFix::RecenterReserve),
            );
        }

        let n = params.size;
        let overlaps_finder = (0..n).any(|y| {
            (0..n).any(|x| {
                region_at(n, x, y) == ModuleRegion::Finder
                    && module_in_reserve(config, n, x, y)
            })
        });
        if overlaps_finder {
            let mut violation =
                SafetyViolation::new(self.name(), ViolationSeverity::Error, "Reserve area covers a finder pattern")
                    .remediate(&["Centre the reserve area", "Reduce reserve.size"]);
            if c.offset_x != 0.0 || c.offset_y != 0.0 {
                violation = violation.with_fix(SafetyFix::RecenterReserve);
            }
            violations.push(violation);
        }
        violations
    }
}

pub struct CombinationCheck;

impl CombinationCheck {
    fn active_features(config: &RenderingConfig) -> Vec<&'static str> {
        let mut active = vec![];
        if config.geometry.shape != ModuleShape::Square {
            active.push("custom module shape");
        }
        if config.geometry.merge != MergeStrategy::None {
            active.push("module merging");
        }
        if config.frame.shape != FrameShape::Square {
            active.push("shaped frame");
        }
        if config.centerpiece.enabled {
            active.push("reserve area");
        }
        if config.patterns.enabled {
            active.push("pattern colours");
        }
        active
    }
}

impl SafetyCheck for CombinationCheck {
    fn name(&self) -> &'static str { "feature_combination" }

    fn validate(&self, config: &RenderingConfig, params: &EncodingParams) -> Vec<SafetyViolation> {
        let mut violations = vec![];
        let c = &config.centerpiece;
        if config.frame.shape == FrameShape::Circle && c.enabled && c.size > CIRCLE_FRAME_MAX_RESERVE {
            violations.push(
                SafetyViolation::new(
                    self.name(),
                    ViolationSeverity::Warning,
                    "Circular frame with a large reserve area leaves little data",
                )
                .expected(format!("reserve size <= {CIRCLE_FRAME_MAX_RESERVE}"), format!("{}", c.size))
                .remediate(&["Use a square frame", "Reduce reserve.size"]),
            );
        }
        if config.geometry.merge == MergeStrategy::Aggressive && c.enabled {
            violations.push(
                SafetyViolation::new(
                    self.name(),
                    ViolationSeverity::Warning,
                    "Aggressive merging around a reserve area blurs its edge",
                )
                .remediate(&["Use merge 'soft'"]),
            );
        }
        let active = Self::active_features(config);
        if params.error_level == ErrorLevel::L && active.len() >= 2 {
            violations.push(
                SafetyViolation::new(
                    self.name(),
                    ViolationSeverity::Warning,
                    format!("Error correction L with {}", active.join(", ")),
                )
                .expected("error correction M or higher", "L")
                .remediate(&["Raise error correction", "Drop some styling features"]),
            );
        }
        violations
    }
}

/// Safety validator - runs every check and gathers recommendations
pub struct SafetyValidator {
    checks: Vec<Box<dyn SafetyCheck>>,
}

impl SafetyValidator {
    /// `check_contrast` false skips the contrast check.
    pub fn new(min_contrast: f64, check_contrast: bool) -> Self {
        let mut checks: Vec<Box<dyn SafetyCheck>> = vec![];
        if check_contrast {
            checks.push(Box::new(ContrastCheck { min_ratio: min_contrast }));
        }
        checks.push(Box::new(ModuleSizeCheck));
        checks.push(Box::new(QuietZoneCheck));
        checks.push(Box::new(ReserveAreaCheck));
        checks.push(Box::new(CombinationCheck));
        Self { checks }
    }

    pub fn validate(&self, config: &RenderingConfig, params: &EncodingParams) -> SafetyReport {
        let violations: Vec<SafetyViolation> =
            self.checks.iter().flat_map(|check| check.validate(config, params)).collect();

        let mut recommendations: Vec<String> = vec![];
        for v in &violations {
            for step in &v.remediation {
                if !recommendations.contains(step) {
                    recommendations.push(step.clone());
                }
            }
        }
        if config.centerpiece.enabled && params.error_level < ErrorLevel::H {
            recommendations.push("Use error correction level H with a reserve area".to_string());
        }

        let valid = !violations.iter().any(|v| v.severity == ViolationSeverity::Error);
        if !valid {
            tracing::warn!(
                errors = violations.iter().filter(|v| v.severity == ViolationSeverity::Error).count(),
                "safety validation failed"
            );
        }
        SafetyReport {
            valid,
            violations,
            recommendations,
            contrast_ratio: contrast_between(&config.dark, &config.light),
            reserve_fraction: reserve_fraction(config, params.size),
            max_reserve_fraction: safe_reserve_ceiling(params.error_level),
            max_safe_reserve_size: max_safe_reserve_size(config, params),
        }
    }
}

impl Default for SafetyValidator {
    fn default() -> Self {
        Self::new(crate::color::WCAG_AA_CONTRAST, true)
    }
}
