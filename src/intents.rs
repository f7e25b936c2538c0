//! Intent Models - what the caller asked for
//!
//! Every field is optional: absence means "no opinion". Known categories are
//! parsed strictly; unknown top-level categories are ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("No content specified: provide text, url, data, email, phone, sms or wifi_ssid")]
    NoContent,

    #[error("Content too long: {len} bytes exceeds capacity of {max} bytes")]
    ContentTooLong { len: usize, max: usize },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorLevel {
    L,
    #[default]
    M,
    Q,
    H,
}

impl ErrorLevel {
    /// Nominal share of codewords the level can recover.
    pub fn recovery_capacity(self) -> f64 {
        match self {
            Self::L => 0.07,
            Self::M => 0.15,
            Self::Q => 0.25,
            Self::H => 0.30,
        }
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::L => "L",
            Self::M => "M",
            Self::Q => "Q",
            Self::H => "H",
        };
        f.write_str(s)
    }
}

/// Content to encode plus encoding hints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Payload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_subject: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub sms: Option<String>,
    #[serde(default)]
    pub sms_message: Option<String>,
    #[serde(default)]
    pub wifi_ssid: Option<String>,
    #[serde(default)]
    pub wifi_password: Option<String>,
    #[serde(default)]
    pub wifi_security: Option<String>,
    #[serde(default)]
    pub error_correction: Option<ErrorLevel>,
    #[serde(default)]
    pub charset: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Payload {
    pub fn text(content: impl Into<String>) -> Self {
        Self { text: Some(content.into()), ..Self::default() }
    }

    /// Resolve the single string to encode.
    ///
    /// Priority: text, url, data, email, phone, sms, wifi.
    pub fn resolve_content(&self) -> Result<String, PayloadError> {
        if let Some(s) = present(&self.text).or(present(&self.url)).or(present(&self.data)) {
            return Ok(s.to_string());
        }
        if let Some(email) = present(&self.email) {
            return Ok(match present(&self.email_subject) {
                Some(subject) => format!("mailto:{email}?subject={subject}"),
                None => format!("mailto:{email}"),
            });
        }
        if let Some(phone) = present(&self.phone) {
            return Ok(format!("tel:{phone}"));
        }
        if let Some(number) = present(&self.sms) {
            return Ok(format!("SMSTO:{number}:{}", present(&self.sms_message).unwrap_or("")));
        }
        if let Some(ssid) = present(&self.wifi_ssid) {
            let security = present(&self.wifi_security).unwrap_or("WPA");
            let password = present(&self.wifi_password).unwrap_or("");
            return Ok(format!("WIFI:T:{security};S:{ssid};P:{password};;"));
        }
        Err(PayloadError::NoContent)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Palette {
    #[serde(default)]
    pub fg: Option<String>,
    #[serde(default)]
    pub bg: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StyleIntents {
    pub module_shape: Option<String>,
    pub merge: Option<String>,
    pub connectivity: Option<String>,
    pub corner_radius: Option<f64>,
    pub min_island_modules: Option<f64>,
    pub scale: Option<f64>,
    pub finder_shape: Option<String>,
    pub finder_inner_scale: Option<f64>,
    pub finder_stroke: Option<f64>,
    pub palette: Option<Palette>,
    /// Pattern target (finder, timing, ...) to colour.
    pub patterns: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FrameIntents {
    pub shape: Option<String>,
    pub corner_radius: Option<f64>,
    pub clip_mode: Option<String>,
    pub fade_distance: Option<f64>,
    pub scale_distance: Option<f64>,
    pub custom_path: Option<String>,
    pub quiet_zone: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ReserveIntents {
    pub enabled: Option<bool>,
    pub size: Option<f64>,
    pub shape: Option<String>,
    pub offset_x: Option<f64>,
    pub offset_y: Option<f64>,
    pub margin: Option<f64>,
    pub mode: Option<String>,
    pub placement: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AccessibilityIntents {
    pub enabled: Option<bool>,
    pub id_prefix: Option<String>,
    pub use_stable_ids: Option<bool>,
    pub include_coordinates: Option<bool>,
    pub enable_aria: Option<bool>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub pattern_labels: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationIntents {
    pub enforce_scanability: Option<bool>,
    pub min_contrast: Option<f64>,
    pub check_contrast: Option<bool>,
    pub simulate_scan: Option<bool>,
    pub min_success_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InteractivityIntents {
    pub hover_effects: Option<bool>,
    pub tooltips: Option<bool>,
    pub click_handlers: Option<bool>,
    pub hover_scale: Option<f64>,
    pub hover_brightness: Option<f64>,
    pub cursor_style: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnimationIntents {
    pub fade_in: Option<bool>,
    pub fade_duration: Option<f64>,
    pub stagger_animation: Option<bool>,
    pub stagger_delay: Option<f64>,
    pub pulse_effect: Option<bool>,
    pub transition_timing: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PerformanceIntents {
    pub optimize_for: Option<String>,
    pub max_svg_size_kb: Option<f64>,
    pub debug_timing: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BrandingIntents {
    pub primary_color: Option<String>,
    pub accent_color: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AdvancedIntents {
    pub mask_pattern: Option<f64>,
    pub min_version: Option<f64>,
    pub boost_error: Option<bool>,
    pub charset: Option<String>,
    pub structured_append: Option<bool>,
    pub micro_qr: Option<bool>,
}

/// All intent categories. Unknown top-level keys are dropped by serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntentsConfig {
    pub style: Option<StyleIntents>,
    pub frame: Option<FrameIntents>,
    pub reserve: Option<ReserveIntents>,
    pub accessibility: Option<AccessibilityIntents>,
    pub validation: Option<ValidationIntents>,
    pub interactivity: Option<InteractivityIntents>,
    pub animation: Option<AnimationIntents>,
    pub performance: Option<PerformanceIntents>,
    pub branding: Option<BrandingIntents>,
    pub advanced: Option<AdvancedIntents>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentCategory {
    Style,
    Frame,
    Reserve,
    Accessibility,
    Validation,
    Interactivity,
    Animation,
    Performance,
    Branding,
    Advanced,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 10] = [
        Self::Style,
        Self::Frame,
        Self::Reserve,
        Self::Accessibility,
        Self::Validation,
        Self::Interactivity,
        Self::Animation,
        Self::Performance,
        Self::Branding,
        Self::Advanced,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Frame => "frame",
            Self::Reserve => "reserve",
            Self::Accessibility => "accessibility",
            Self::Validation => "validation",
            Self::Interactivity => "interactivity",
            Self::Animation => "animation",
            Self::Performance => "performance",
            Self::Branding => "branding",
            Self::Advanced => "advanced",
        }
    }

    /// Category of an intent path such as `style.module_shape`.
    pub fn of_path(path: &str) -> Option<Self> {
        let head = path.split('.').next()?;
        Self::ALL.into_iter().find(|c| c.as_str() == head)
    }
}

/// Wire-level request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IntentRequest {
    pub payload: Payload,
    #[serde(default)]
    pub intents: IntentsConfig,
}

impl IntentRequest {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_payload_is_error() {
        assert_eq!(Payload::default().resolve_content(), Err(PayloadError::NoContent));
        let blank = Payload { text: Some("   ".into()), ..Payload::default() };
        assert_eq!(blank.resolve_content(), Err(PayloadError::NoContent));
    }

    #[test]
    fn test_payload_priority_and_formats() {
        let p = Payload {
            url: Some("https://example.com".into()),
            phone: Some("+1555".into()),
            ..Payload::default()
        };
        assert_eq!(p.resolve_content().unwrap(), "https://example.com");

        let wifi = Payload { wifi_ssid: Some("home".into()), wifi_password: Some("pw".into()), ..Payload::default() };
        assert_eq!(wifi.resolve_content().unwrap(), "WIFI:T:WPA;S:home;P:pw;;");

        let sms = Payload { sms: Some("123".into()), sms_message: Some("hi".into()), ..Payload::default() };
        assert_eq!(sms.resolve_content().unwrap(), "SMSTO:123:hi");
    }

    #[test]
    fn test_unknown_category_ignored_known_strict() {
        let ok = IntentRequest::from_json(
            r#"{"payload":{"text":"x"},"intents":{"sparkle":{"level":9},"style":{"module_shape":"dot"}}}"#,
        )
        .unwrap();
        assert_eq!(ok.intents.style.unwrap().module_shape.as_deref(), Some("dot"));

        let strict = serde_json::from_value::<IntentRequest>(json!({
            "payload": {"text": "x"},
            "intents": {"style": {"glitter": true}}
        }));
        assert!(strict.is_err());
    }

    #[test]
    fn test_category_of_path() {
        assert_eq!(IntentCategory::of_path("reserve.size"), Some(IntentCategory::Reserve));
        assert_eq!(IntentCategory::of_path("nothing.here"), None);
    }
}
