//! Colour parsing and WCAG contrast.

use serde::{Deserialize, Serialize};

/// WCAG 2.x AA threshold for normal text, used as the default minimum.
pub const WCAG_AA_CONTRAST: f64 = 4.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Result of parsing a colour string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedColor {
    pub rgb: Rgb,
    /// Alpha in [0, 1]; renderers only honour opaque colours.
    pub alpha: f64,
}

impl ParsedColor {
    pub fn is_opaque(&self) -> bool {
        self.alpha >= 1.0
    }
}

const NAMED: &[(&str, (u8, u8, u8))] = &[
    ("black", (0, 0, 0)),
    ("white", (255, 255, 255)),
    ("red", (255, 0, 0)),
    ("green", (0, 128, 0)),
    ("lime", (0, 255, 0)),
    ("blue", (0, 0, 255)),
    ("yellow", (255, 255, 0)),
    ("cyan", (0, 255, 255)),
    ("aqua", (0, 255, 255)),
    ("magenta", (255, 0, 255)),
    ("fuchsia", (255, 0, 255)),
    ("gray", (128, 128, 128)),
    ("grey", (128, 128, 128)),
    ("silver", (192, 192, 192)),
    ("maroon", (128, 0, 0)),
    ("olive", (128, 128, 0)),
    ("navy", (0, 0, 128)),
    ("purple", (128, 0, 128)),
    ("teal", (0, 128, 128)),
    ("orange", (255, 165, 0)),
    ("brown", (165, 42, 42)),
    ("pink", (255, 192, 203)),
    ("darkblue", (0, 0, 139)),
    ("darkgreen", (0, 100, 0)),
    ("darkred", (139, 0, 0)),
    ("lightgray", (211, 211, 211)),
    ("lightgrey", (211, 211, 211)),
];

/// Parse a CSS-style colour: a basic named colour, `#rgb`, `#rrggbb`,
/// `#rrggbbaa` or `rgb(r, g, b)`.
pub fn parse_color(input: &str) -> Option<ParsedColor> {
    let s = input.trim().to_ascii_lowercase();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(body) = s.strip_prefix("rgb(").and_then(|rest| rest.strip_suffix(')')) {
        let parts: Vec<_> = body.split(',').map(|p| p.trim().parse::<u8>()).collect();
        if let [Ok(r), Ok(g), Ok(b)] = parts.as_slice() {
            return Some(ParsedColor { rgb: Rgb { r: *r, g: *g, b: *b }, alpha: 1.0 });
        }
        return None;
    }
    NAMED
        .iter()
        .find(|(name, _)| *name == s)
        .map(|(_, (r, g, b))| ParsedColor { rgb: Rgb { r: *r, g: *g, b: *b }, alpha: 1.0 })
}

fn parse_hex(hex: &str) -> Option<ParsedColor> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => {
            let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
            Some(ParsedColor {
                rgb: Rgb { r: nibble(0)?, g: nibble(1)?, b: nibble(2)? },
                alpha: 1.0,
            })
        }
        6 => Some(ParsedColor { rgb: Rgb { r: byte(0)?, g: byte(2)?, b: byte(4)? }, alpha: 1.0 }),
        8 => Some(ParsedColor {
            rgb: Rgb { r: byte(0)?, g: byte(2)?, b: byte(4)? },
            alpha: f64::from(byte(6)?) / 255.0,
        }),
        _ => None,
    }
}

/// Hex form without alpha, used when a translucent colour is flattened.
pub fn to_hex(rgb: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb.r, rgb.g, rgb.b)
}

fn channel(c: u8) -> f64 {
    let c = f64::from(c) / 255.0;
    if c <= 0.03928 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn relative_luminance(rgb: Rgb) -> f64 {
    0.2126 * channel(rgb.r) + 0.7152 * channel(rgb.g) + 0.0722 * channel(rgb.b)
}

pub fn contrast_ratio(a: Rgb, b: Rgb) -> f64 {
    let (la, lb) = (relative_luminance(a), relative_luminance(b));
    let (hi, lo) = if la >= lb { (la, lb) } else { (lb, la) };
    (hi + 0.05) / (lo + 0.05)
}

/// Contrast between two colour strings, `None` when either fails to parse.
pub fn contrast_between(fg: &str, bg: &str) -> Option<f64> {
    Some(contrast_ratio(parse_color(fg)?.rgb, parse_color(bg)?.rgb))
}
