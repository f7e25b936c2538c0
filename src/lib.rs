//! QR Intent Core - Styling Intent Compiler
//!
//! # Rules of the Engine
//! 1. Intents Are Requests, Not Commands
//! 2. Every Field Leaves a Trace
//! 3. Aesthetic Risk Is Advisory, Scan Risk Is Enforced
//! 4. A Best-Effort Artifact Beats No Artifact
//! 5. The Manifest Is Read-Only

pub mod color;
pub mod config;
pub mod degradation;
pub mod encoder;
pub mod hashing;
pub mod intents;
pub mod manifest;
pub mod processor;
pub mod render;
pub mod report;
pub mod safety;
pub mod scan;
pub mod translator;

pub use config::{ConfigError, RenderingConfig};
pub use degradation::{DegradationManager, DegradationResult, DegradationRule, DegradationWarning};
pub use encoder::{Encoder, EncodeError, Matrix, SyntheticEncoder};
pub use hashing::{canonical_json, compute_config_hash};
pub use intents::{ErrorLevel, IntentRequest, IntentsConfig, Payload, PayloadError};
pub use manifest::{CapabilityManifest, ManifestError, ManifestRegistry};
pub use processor::{IntentProcessor, Preview, ProcessError, ProcessorOptions};
pub use render::{RenderError, Renderer, SvgRenderer};
pub use report::{RenderingResult, StepOutcome, TransformationStep, WarningInfo};
pub use safety::{SafetyReport, SafetyValidator, SafetyViolation, ViolationSeverity};
pub use scan::{ScanError, ScanHarness, ScanReport};
pub use translator::{IntentTranslator, TranslationOutput};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
