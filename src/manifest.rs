//! Capability Manifest - what the engine supports
//!
//! Read-only during a request. A feature with no entry supports nothing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub type ManifestId = String;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Manifest {0} requires engine >= {1}, current is {2}")]
    EngineVersionMismatch(String, String, String),

    #[error("Invalid version string: {0}")]
    InvalidVersion(String),

    #[error("No compatible manifest found")]
    NoneCompatible,
}

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Finite with `min <= max`.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    /// Never panics, even on an inverted range (the upper bound wins).
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityManifest {
    pub id: ManifestId,
    pub manifest_version: String,
    pub engine_min_version: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub features: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub bounds: BTreeMap<String, Bounds>,
}

fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl CapabilityManifest {
    /// The manifest compiled into the engine.
    pub fn builtin() -> Self {
        let features: BTreeMap<String, BTreeSet<String>> = [
            (
                "shape",
                set(&[
                    "square",
                    "circle",
                    "rounded",
                    "dot",
                    "diamond",
                    "star",
                    "hexagon",
                    "cross",
                    "squircle",
                    "triangle",
                    "leaf",
                    "connected",
                    "connected-extra-rounded",
                    "connected-classy",
                    "connected-classy-rounded",
                ]),
            ),
            ("merge", set(&["none", "soft", "aggressive"])),
            ("connectivity", set(&["4-way", "8-way"])),
            ("finder_shape", set(&["square", "rounded", "circle"])),
            ("frame_shape", set(&["square", "circle", "rounded-rect", "squircle", "custom"])),
            ("clip_mode", set(&["clip", "fade", "scale"])),
            ("reserve_shape", set(&["rect", "circle", "squircle"])),
            ("reserve_mode", set(&["knockout", "imprint"])),
            ("placement", set(&["center", "arbitrary"])),
            ("cursor", set(&["default", "pointer", "crosshair", "help"])),
            ("timing", set(&["ease", "linear", "ease-in", "ease-out", "ease-in-out"])),
            ("optimize_for", set(&["size", "quality", "balanced"])),
            ("charset", set(&["utf-8", "iso-8859-1", "shift_jis"])),
            (
                "pattern_targets",
                set(&["finder", "finder_inner", "timing", "alignment", "format", "data"]),
            ),
            ("interactivity.features", set(&["hover_effects", "tooltips"])),
            ("animation.features", set(&["fade_in", "stagger_animation"])),
            (
                "accessibility.features",
                set(&["use_stable_ids", "include_coordinates", "enable_aria", "pattern_labels"]),
            ),
            ("branding.features", set(&[])),
            ("advanced.features", set(&["boost_error"])),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let bounds: BTreeMap<String, Bounds> = [
            ("style.corner_radius", Bounds::new(0.0, 1.0)),
            ("style.min_island_modules", Bounds::new(1.0, 10.0)),
            ("style.scale", Bounds::new(1.0, 100.0)),
            ("style.finder_inner_scale", Bounds::new(0.1, 1.0)),
            ("style.finder_stroke", Bounds::new(0.0, 5.0)),
            ("frame.corner_radius", Bounds::new(0.0, 1.0)),
            ("frame.fade_distance", Bounds::new(0.0, 50.0)),
            ("frame.scale_distance", Bounds::new(0.0, 50.0)),
            ("frame.quiet_zone", Bounds::new(0.0, 20.0)),
            ("reserve.size", Bounds::new(0.0, 0.5)),
            ("reserve.offset_x", Bounds::new(-0.5, 0.5)),
            ("reserve.offset_y", Bounds::new(-0.5, 0.5)),
            ("reserve.margin", Bounds::new(0.0, 10.0)),
            ("validation.min_contrast", Bounds::new(1.0, 21.0)),
            ("validation.min_success_rate", Bounds::new(0.0, 1.0)),
            ("interactivity.hover_scale", Bounds::new(1.0, 2.0)),
            ("interactivity.hover_brightness", Bounds::new(0.5, 2.0)),
            ("animation.fade_duration", Bounds::new(0.0, 10.0)),
            ("animation.stagger_delay", Bounds::new(0.0, 1.0)),
            ("performance.max_svg_size_kb", Bounds::new(1.0, 10000.0)),
            ("advanced.mask_pattern", Bounds::new(0.0, 7.0)),
            ("advanced.min_version", Bounds::new(1.0, 40.0)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            id: "builtin".to_string(),
            manifest_version: "1.0.0".to_string(),
            engine_min_version: "1.0.0".to_string(),
            deprecated: false,
            features,
            bounds,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path)?;
        let mut manifest: Self = serde_json::from_str(&content)?;
        manifest.check_engine_version()?;
        manifest.drop_invalid_bounds();
        Ok(manifest)
    }

    /// Remove inverted or non-finite bounds; those fields become unbounded.
    pub fn drop_invalid_bounds(&mut self) -> Vec<String> {
        let invalid: Vec<String> =
            self.bounds.iter().filter(|(_, b)| !b.is_valid()).map(|(field, _)| field.clone()).collect();
        for field in &invalid {
            tracing::warn!(manifest = %self.id, %field, "dropping invalid bounds");
            self.bounds.remove(field);
        }
        invalid
    }

    /// Supported values for a feature; empty when the feature is unknown.
    pub fn supported_values(&self, feature: &str) -> BTreeSet<String> {
        self.features.get(feature).cloned().unwrap_or_default()
    }

    pub fn supports(&self, feature: &str, value: &str) -> bool {
        self.features.get(feature).map_or(false, |values| values.contains(value))
    }

    /// Declared bounds for a field. Invalid bounds count as undeclared.
    pub fn bounds(&self, field: &str) -> Option<Bounds> {
        self.bounds.get(field).copied().filter(Bounds::is_valid)
    }

    /// Reject manifests written for a newer engine.
    pub fn check_engine_version(&self) -> Result<(), ManifestError> {
        let engine = semver::Version::parse(crate::ENGINE_VERSION)
            .map_err(|_| ManifestError::InvalidVersion(crate::ENGINE_VERSION.to_string()))?;
        let min = semver::Version::parse(&self.engine_min_version)
            .map_err(|_| ManifestError::InvalidVersion(self.engine_min_version.clone()))?;
        if engine < min {
            return Err(ManifestError::EngineVersionMismatch(
                self.id.clone(),
                self.engine_min_version.clone(),
                crate::ENGINE_VERSION.to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CapabilityManifest {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Manifest registry - loads every manifest in a directory
pub struct ManifestRegistry {
    manifests: HashMap<ManifestId, CapabilityManifest>,
}

impl ManifestRegistry {
    pub fn new() -> Self {
        Self { manifests: HashMap::new() }
    }

    /// Load `*.json` manifests; unreadable or incompatible files are skipped.
    pub fn load_from_dir(dir: &Path) -> Result<Self, std::io::Error> {
        let mut registry = Self::new();
        if dir.exists() {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().map_or(false, |e| e == "json") {
                    match CapabilityManifest::from_file(&path) {
                        Ok(manifest) => registry.register(manifest),
                        Err(e) => tracing::warn!(path = %path.display(), "skipping manifest: {e}"),
                    }
                }
            }
        }
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&CapabilityManifest> {
        self.manifests.get(id)
    }

    pub fn list(&self) -> Vec<&CapabilityManifest> {
        self.manifests.values().collect()
    }

    pub fn register(&mut self, manifest: CapabilityManifest) {
        self.manifests.insert(manifest.id.clone(), manifest);
    }

    /// Highest `manifest_version` among non-deprecated manifests.
    pub fn newest(&self) -> Result<&CapabilityManifest, ManifestError> {
        self.manifests
            .values()
            .filter(|m| !m.deprecated)
            .filter_map(|m| semver::Version::parse(&m.manifest_version).ok().map(|v| (v, m)))
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, m)| m)
            .ok_or(ManifestError::NoneCompatible)
    }
}

impl Default for ManifestRegistry {
    fn default() -> Self {
        Self::new()
    }
}
