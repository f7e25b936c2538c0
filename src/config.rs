//! Rendering Configuration - the concrete settings handed to the renderer
//!
//! Built from flat configuration keys produced by the translator. Sections
//! are addressed by prefix (`centerpiece_size` → `centerpiece.size`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Flat configuration keys, as produced by intent translation.
pub type Kwargs = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] serde_json::Error),

    #[error("Frame shape 'custom' requires frame.custom_path")]
    CustomFrameWithoutPath,

    #[error("Non-finite number for {key}")]
    NonFinite { key: String },

    #[error("Configuration key {key} conflicts with an existing non-object value")]
    InvalidKey { key: String },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleShape {
    #[default]
    Square,
    Circle,
    Rounded,
    Dot,
    Diamond,
    Star,
    Hexagon,
    Cross,
    Squircle,
    Triangle,
    Leaf,
    Connected,
    ConnectedExtraRounded,
    ConnectedClassy,
    ConnectedClassyRounded,
}

impl ModuleShape {
    /// Shapes whose silhouette deviates enough from a square to hurt
    /// decoding at small module sizes.
    pub fn is_complex(self) -> bool {
        matches!(
            self,
            Self::ConnectedClassy | Self::ConnectedClassyRounded | Self::Star | Self::Hexagon
        )
    }

    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::Connected
                | Self::ConnectedExtraRounded
                | Self::ConnectedClassy
                | Self::ConnectedClassyRounded
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    #[default]
    None,
    Soft,
    Aggressive,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Connectivity {
    #[default]
    #[serde(rename = "4-way")]
    FourWay,
    #[serde(rename = "8-way")]
    EightWay,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinderShape {
    #[default]
    Square,
    Rounded,
    Circle,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FrameShape {
    #[default]
    Square,
    Circle,
    RoundedRect,
    Squircle,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClipMode {
    #[default]
    Clip,
    Fade,
    Scale,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReserveShape {
    #[default]
    Rect,
    Circle,
    Squircle,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReserveMode {
    #[default]
    Knockout,
    Imprint,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CursorStyle {
    #[default]
    Default,
    Pointer,
    Crosshair,
    Help,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TimingFunction {
    #[default]
    Ease,
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl TimingFunction {
    pub fn as_css(self) -> &'static str {
        match self {
            Self::Ease => "ease",
            Self::Linear => "linear",
            Self::EaseIn => "ease-in",
            Self::EaseOut => "ease-out",
            Self::EaseInOut => "ease-in-out",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GeometryConfig {
    pub shape: ModuleShape,
    pub corner_radius: f64,
    pub connectivity: Connectivity,
    pub merge: MergeStrategy,
    pub min_island_modules: u32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            shape: ModuleShape::Square,
            corner_radius: 0.0,
            connectivity: Connectivity::FourWay,
            merge: MergeStrategy::None,
            min_island_modules: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FinderConfig {
    pub shape: FinderShape,
    pub inner_scale: f64,
    pub stroke: f64,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self { shape: FinderShape::Square, inner_scale: 0.6, stroke: 0.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FrameConfig {
    pub shape: FrameShape,
    pub corner_radius: f64,
    pub clip_mode: ClipMode,
    pub custom_path: Option<String>,
    pub fade_distance: f64,
    pub scale_distance: f64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            shape: FrameShape::Square,
            corner_radius: 0.0,
            clip_mode: ClipMode::Clip,
            custom_path: None,
            fade_distance: 10.0,
            scale_distance: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CenterpieceConfig {
    pub enabled: bool,
    pub shape: ReserveShape,
    /// Side length (or diameter) as a fraction of the symbol width.
    pub size: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    /// Extra modules cleared around the area.
    pub margin: u32,
    pub mode: ReserveMode,
}

impl Default for CenterpieceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            shape: ReserveShape::Rect,
            size: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
            margin: 2,
            mode: ReserveMode::Knockout,
        }
    }
}

/// Per-pattern colours. Any colour set implies `enabled`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PatternStyleConfig {
    pub enabled: bool,
    pub finder: Option<String>,
    pub finder_inner: Option<String>,
    pub timing: Option<String>,
    pub alignment: Option<String>,
    pub format: Option<String>,
    pub data: Option<String>,
}

impl PatternStyleConfig {
    pub fn has_colors(&self) -> bool {
        [&self.finder, &self.finder_inner, &self.timing, &self.alignment, &self.format, &self.data]
            .iter()
            .any(|c| c.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AccessibilityConfig {
    pub enabled: bool,
    pub id_prefix: String,
    pub use_stable_ids: bool,
    pub include_coordinates: bool,
    pub enable_aria: bool,
    pub root_label: Option<String>,
    pub description: Option<String>,
    pub include_pattern_labels: bool,
}

impl Default for AccessibilityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            id_prefix: "qr".to_string(),
            use_stable_ids: true,
            include_coordinates: false,
            enable_aria: true,
            root_label: None,
            description: None,
            include_pattern_labels: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InteractionConfig {
    pub interactive: bool,
    pub tooltips: bool,
    pub hover_scale: f64,
    pub hover_brightness: f64,
    pub cursor: CursorStyle,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            interactive: false,
            tooltips: false,
            hover_scale: 1.1,
            hover_brightness: 1.2,
            cursor: CursorStyle::Default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnimationConfig {
    pub fade_in: bool,
    pub fade_duration: f64,
    pub stagger: bool,
    pub stagger_delay: f64,
    pub timing: TimingFunction,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            fade_in: false,
            fade_duration: 0.5,
            stagger: false,
            stagger_delay: 0.02,
            timing: TimingFunction::Ease,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RenderingConfig {
    /// Module size in pixels.
    pub scale: u32,
    /// Quiet zone in modules.
    pub border: u32,
    pub dark: String,
    pub light: String,
    pub safe_mode: bool,
    pub geometry: GeometryConfig,
    pub finder: FinderConfig,
    pub frame: FrameConfig,
    pub centerpiece: CenterpieceConfig,
    pub patterns: PatternStyleConfig,
    pub accessibility: AccessibilityConfig,
    pub style: InteractionConfig,
    pub animation: AnimationConfig,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            scale: 10,
            border: 4,
            dark: "black".to_string(),
            light: "white".to_string(),
            safe_mode: false,
            geometry: GeometryConfig::default(),
            finder: FinderConfig::default(),
            frame: FrameConfig::default(),
            centerpiece: CenterpieceConfig::default(),
            patterns: PatternStyleConfig::default(),
            accessibility: AccessibilityConfig::default(),
            style: InteractionConfig::default(),
            animation: AnimationConfig::default(),
        }
    }
}

/// Section prefixes on flat keys. Longest prefixes first so that
/// `finder_` never captures a key meant for another section.
const SECTION_PREFIXES: &[(&str, &str)] = &[
    ("accessibility_", "accessibility"),
    ("centerpiece_", "centerpiece"),
    ("animation_", "animation"),
    ("pattern_", "patterns"),
    ("finder_", "finder"),
    ("frame_", "frame"),
    ("style_", "style"),
];

/// Bare keys that live in the geometry section.
const GEOMETRY_KEYS: &[&str] = &["shape", "corner_radius", "connectivity", "merge", "min_island_modules"];

/// Rewrite one flat key into a dotted configuration path.
///
/// Keys that already carry a dot are taken as-is.
pub fn rekey(key: &str) -> String {
    if key.contains('.') {
        return key.to_string();
    }
    for (prefix, section) in SECTION_PREFIXES {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{section}.{rest}");
        }
    }
    if GEOMETRY_KEYS.contains(&key) {
        return format!("geometry.{key}");
    }
    key.to_string()
}

/// Apply [`rekey`] to every entry of a flat key map.
pub fn rekey_all(kwargs: &Kwargs) -> BTreeMap<String, Value> {
    kwargs.iter().map(|(k, v)| (rekey(k), v.clone())).collect()
}

/// Set `value` at a dotted `path` inside a JSON object, creating
/// intermediate objects on the way.
pub fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), ConfigError> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop().unwrap_or(path);
    let mut cursor = root;
    for seg in segments {
        let obj = cursor
            .as_object_mut()
            .ok_or_else(|| ConfigError::InvalidKey { key: path.to_string() })?;
        cursor = obj.entry(seg.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
    let obj = cursor
        .as_object_mut()
        .ok_or_else(|| ConfigError::InvalidKey { key: path.to_string() })?;
    obj.insert(last.to_string(), value);
    Ok(())
}

/// Read the value at a dotted path, if any.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |cur, seg| cur.get(seg))
}

impl RenderingConfig {
    /// Build a configuration from flat keys layered over the defaults.
    pub fn from_kwargs(kwargs: &Kwargs) -> Result<Self, ConfigError> {
        let mut root = serde_json::to_value(Self::default())?;
        for (path, value) in rekey_all(kwargs) {
            if let Some(n) = value.as_f64() {
                if !n.is_finite() {
                    return Err(ConfigError::NonFinite { key: path });
                }
            }
            set_path(&mut root, &path, value)?;
        }
        let mut config: Self = serde_json::from_value(root)?;
        if config.patterns.has_colors() {
            config.patterns.enabled = true;
        }
        config.validate()?;
        Ok(config)
    }

    /// Cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame.shape == FrameShape::Custom
            && self.frame.custom_path.as_deref().map_or(true, |p| p.trim().is_empty())
        {
            return Err(ConfigError::CustomFrameWithoutPath);
        }
        let numbers = [
            ("geometry.corner_radius", self.geometry.corner_radius),
            ("finder.inner_scale", self.finder.inner_scale),
            ("finder.stroke", self.finder.stroke),
            ("frame.corner_radius", self.frame.corner_radius),
            ("centerpiece.size", self.centerpiece.size),
            ("centerpiece.offset_x", self.centerpiece.offset_x),
            ("centerpiece.offset_y", self.centerpiece.offset_y),
        ];
        if let Some((key, _)) = numbers.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::NonFinite { key: key.to_string() });
        }
        Ok(())
    }

    /// JSON view used for diffing and reporting.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
