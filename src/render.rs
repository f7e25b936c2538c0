//! SVG Rendering - external collaborator contract
//!
//! [`SvgRenderer`] is the reference renderer: one primitive per dark
//! module, no path merging.

use std::fmt::Write as _;
use thiserror::Error;

use crate::config::{
    ClipMode, FinderShape, FrameShape, ModuleShape, RenderingConfig, ReserveMode,
};
use crate::encoder::{region_at, Matrix, ModuleRegion};
use crate::safety::module_in_reserve;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Cannot render an empty matrix")]
    EmptyMatrix,

    #[error("Rendering error: {0}")]
    Format(#[from] std::fmt::Error),
}

pub trait Renderer: Send + Sync {
    fn render(&self, matrix: &Matrix, config: &RenderingConfig) -> Result<String, RenderError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SvgRenderer;

pub fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn region_class(region: ModuleRegion) -> &'static str {
    match region {
        ModuleRegion::Finder => "finder",
        ModuleRegion::Separator => "separator",
        ModuleRegion::Timing => "timing",
        ModuleRegion::Data => "data",
    }
}

fn region_label(region: ModuleRegion) -> &'static str {
    match region {
        ModuleRegion::Finder => "Finder pattern",
        ModuleRegion::Separator => "Separator",
        ModuleRegion::Timing => "Timing pattern",
        ModuleRegion::Data => "Data modules",
    }
}

/// Module inside the 3x3 core of a finder pattern.
fn in_finder_core(n: usize, x: usize, y: usize) -> bool {
    let local = |v: usize| if v < 7 { v } else { v + 7 - n };
    (2..=4).contains(&local(x)) && (2..=4).contains(&local(y))
}

fn polygon(points: &[(f64, f64)], x: f64, y: f64, s: f64) -> String {
    let pts: Vec<String> =
        points.iter().map(|(px, py)| format!("{:.2},{:.2}", x + px * s, y + py * s)).collect();
    format!(r#"<polygon points="{}""#, pts.join(" "))
}

fn star_points() -> Vec<(f64, f64)> {
    (0..10)
        .map(|i| {
            let angle = std::f64::consts::PI / 5.0 * i as f64 - std::f64::consts::FRAC_PI_2;
            let r = if i % 2 == 0 { 0.5 } else { 0.22 };
            (0.5 + r * angle.cos(), 0.5 + r * angle.sin())
        })
        .collect()
}

/// Opening tag (without closing `/>`) of the primitive for one module.
fn module_primitive(shape: ModuleShape, corner_radius: f64, x: f64, y: f64, s: f64) -> String {
    let rect = |rx: f64| {
        format!(r#"<rect x="{x:.2}" y="{y:.2}" width="{s:.2}" height="{s:.2}" rx="{:.2}""#, rx * s)
    };
    let circle = |r: f64| format!(r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}""#, x + s / 2.0, y + s / 2.0, r * s);
    match shape {
        ModuleShape::Square => rect(0.0),
        ModuleShape::Circle => circle(0.5),
        ModuleShape::Dot => circle(0.35),
        ModuleShape::Rounded => rect(corner_radius.max(0.25) / 2.0),
        ModuleShape::Squircle => rect(0.35),
        ModuleShape::Connected
        | ModuleShape::ConnectedExtraRounded
        | ModuleShape::ConnectedClassy
        | ModuleShape::ConnectedClassyRounded => rect(corner_radius / 2.0),
        ModuleShape::Diamond => polygon(&[(0.5, 0.0), (1.0, 0.5), (0.5, 1.0), (0.0, 0.5)], x, y, s),
        ModuleShape::Triangle => polygon(&[(0.5, 0.05), (0.95, 0.95), (0.05, 0.95)], x, y, s),
        ModuleShape::Hexagon => polygon(
            &[(0.25, 0.07), (0.75, 0.07), (1.0, 0.5), (0.75, 0.93), (0.25, 0.93), (0.0, 0.5)],
            x,
            y,
            s,
        ),
        ModuleShape::Star => polygon(&star_points(), x, y, s),
        ModuleShape::Cross => polygon(
            &[
                (0.33, 0.0), (0.67, 0.0), (0.67, 0.33), (1.0, 0.33), (1.0, 0.67), (0.67, 0.67),
                (0.67, 1.0), (0.33, 1.0), (0.33, 0.67), (0.0, 0.67), (0.0, 0.33), (0.33, 0.33),
            ],
            x,
            y,
            s,
        ),
        ModuleShape::Leaf => {
            let (mx, my, rx, by) = (x + s / 2.0, y + s / 2.0, x + s, y + s);
            format!(
                r#"<path d="M{x:.2},{my:.2} Q{x:.2},{y:.2} {mx:.2},{y:.2} L{rx:.2},{y:.2} L{rx:.2},{my:.2} Q{rx:.2},{by:.2} {mx:.2},{by:.2} L{x:.2},{by:.2} Z""#
            )
        }
    }
}

fn finder_primitive(shape: FinderShape, x: f64, y: f64, s: f64) -> String {
    match shape {
        FinderShape::Square => module_primitive(ModuleShape::Square, 0.0, x, y, s),
        FinderShape::Rounded => module_primitive(ModuleShape::Rounded, 0.5, x, y, s),
        FinderShape::Circle => module_primitive(ModuleShape::Circle, 0.0, x, y, s),
    }
}

impl SvgRenderer {
    fn fill_for(&self, config: &RenderingConfig, n: usize, x: usize, y: usize, region: ModuleRegion) -> String {
        let p = &config.patterns;
        if !p.enabled {
            return config.dark.clone();
        }
        let chosen = match region {
            ModuleRegion::Finder if in_finder_core(n, x, y) => p.finder_inner.as_ref().or(p.finder.as_ref()),
            ModuleRegion::Finder => p.finder.as_ref(),
            ModuleRegion::Timing => p.timing.as_ref(),
            ModuleRegion::Data => p.data.as_ref(),
            ModuleRegion::Separator => None,
        };
        chosen.cloned().unwrap_or_else(|| config.dark.clone())
    }

    fn write_style(&self, out: &mut String, config: &RenderingConfig) -> Result<(), RenderError> {
        let style = &config.style;
        let anim = &config.animation;
        if !style.interactive && !anim.fade_in && !anim.stagger {
            return Ok(());
        }
        out.push_str("<style>");
        if style.interactive {
            let cursor = serde_json::to_value(style.cursor)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "default".to_string());
            write!(
                out,
                ".qr-module{{transition:transform .15s;transform-box:fill-box;transform-origin:center;cursor:{cursor}}}\
                 .qr-module:hover{{transform:scale({:.2});filter:brightness({:.2})}}",
                style.hover_scale, style.hover_brightness
            )?;
        }
        if anim.fade_in {
            write!(
                out,
                "@keyframes qr-fade{{from{{opacity:0}}to{{opacity:1}}}}\
                 .qr-modules{{animation:qr-fade {:.2}s {} both}}",
                anim.fade_duration,
                anim.timing.as_css()
            )?;
        }
        if anim.stagger {
            write!(
                out,
                "@keyframes qr-pop{{from{{opacity:0}}to{{opacity:1}}}}\
                 .qr-module{{animation:qr-pop .3s {} both;animation-delay:calc(var(--i) * {:.3}s)}}",
                anim.timing.as_css(),
                anim.stagger_delay
            )?;
        }
        out.push_str("</style>");
        Ok(())
    }

    /// Writes `<defs>` and returns the attribute to put on the module group.
    fn write_frame(&self, out: &mut String, config: &RenderingConfig, total: f64) -> Result<String, RenderError> {
        let frame = &config.frame;
        let half = total / 2.0;
        let shape = match frame.shape {
            FrameShape::Square => return Ok(String::new()),
            FrameShape::Circle => format!(r#"<circle cx="{half:.2}" cy="{half:.2}" r="{half:.2}"/>"#),
            FrameShape::RoundedRect => format!(
                r#"<rect width="{total:.2}" height="{total:.2}" rx="{:.2}"/>"#,
                frame.corner_radius.max(0.1) * half
            ),
            FrameShape::Squircle => format!(r#"<rect width="{total:.2}" height="{total:.2}" rx="{:.2}"/>"#, 0.35 * total),
            FrameShape::Custom => format!(
                r#"<path d="{}"/>"#,
                escape_xml(frame.custom_path.as_deref().unwrap_or_default())
            ),
        };
        match frame.clip_mode {
            ClipMode::Clip | ClipMode::Scale => {
                write!(out, r#"<defs><clipPath id="qr-frame">{shape}</clipPath></defs>"#)?;
                Ok(r#" clip-path="url(#qr-frame)""#.to_string())
            }
            ClipMode::Fade => {
                let inner = (1.0 - frame.fade_distance / 100.0).clamp(0.0, 1.0);
                write!(
                    out,
                    r#"<defs><radialGradient id="qr-fade-gradient"><stop offset="{inner:.2}" stop-color="white"/><stop offset="1" stop-color="black"/></radialGradient><mask id="qr-frame"><rect width="{total:.2}" height="{total:.2}" fill="url(#qr-fade-gradient)"/></mask></defs>"#
                )?;
                Ok(r#" mask="url(#qr-frame)""#.to_string())
            }
        }
    }
}

impl Renderer for SvgRenderer {
    fn render(&self, matrix: &Matrix, config: &RenderingConfig) -> Result<String, RenderError> {
        let n = matrix.size;
        if n == 0 {
            return Err(RenderError::EmptyMatrix);
        }
        let s = f64::from(config.scale.max(1));
        let border = config.border as usize;
        let total = (n + 2 * border) as f64 * s;
        let a11y = &config.accessibility;
        let prefix = escape_xml(&a11y.id_prefix);

        let mut out = String::with_capacity(n * n * 48);
        write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{total:.0}" height="{total:.0}" viewBox="0 0 {total:.0} {total:.0}" id="{prefix}""#
        )?;
        if a11y.enabled && a11y.enable_aria {
            let label = a11y.root_label.as_deref().unwrap_or("QR code");
            write!(out, r#" role="img" aria-label="{}""#, escape_xml(label))?;
        }
        out.push('>');
        if a11y.enabled {
            if let Some(title) = &a11y.root_label {
                write!(out, "<title>{}</title>", escape_xml(title))?;
            }
            if let Some(desc) = &a11y.description {
                write!(out, "<desc>{}</desc>", escape_xml(desc))?;
            }
        }
        self.write_style(&mut out, config)?;
        let group_attr = self.write_frame(&mut out, config, total)?;

        write!(out, r#"<rect width="{total:.0}" height="{total:.0}" fill="{}"/>"#, escape_xml(&config.light))?;
        write!(out, r#"<g class="qr-modules"{group_attr}>"#)?;

        let knockout = config.centerpiece.enabled && config.centerpiece.mode == ReserveMode::Knockout;
        let mut index = 0usize;
        for region in [ModuleRegion::Finder, ModuleRegion::Timing, ModuleRegion::Data] {
            let class = region_class(region);
            write!(out, r#"<g class="qr-{class}""#)?;
            if a11y.enabled && a11y.include_pattern_labels {
                write!(out, r#" aria-label="{}""#, region_label(region))?;
            }
            out.push('>');
            if config.style.tooltips {
                write!(out, "<title>{}</title>", region_label(region))?;
            }
            for y in 0..n {
                for x in 0..n {
                    if region_at(n, x, y) != region || !matrix.is_dark(x, y) {
                        continue;
                    }
                    if knockout && module_in_reserve(config, n, x, y) {
                        continue;
                    }
                    let px = (x + border) as f64 * s;
                    let py = (y + border) as f64 * s;
                    // Safe mode keeps function patterns plain.
                    let primitive = match region {
                        ModuleRegion::Finder if config.safe_mode => finder_primitive(FinderShape::Square, px, py, s),
                        ModuleRegion::Finder => finder_primitive(config.finder.shape, px, py, s),
                        ModuleRegion::Timing if config.safe_mode => module_primitive(ModuleShape::Square, 0.0, px, py, s),
                        _ => module_primitive(config.geometry.shape, config.geometry.corner_radius, px, py, s),
                    };
                    out.push_str(&primitive);
                    let id = if a11y.use_stable_ids { format!("{prefix}-m-{x}-{y}") } else { format!("{prefix}-m{index}") };
                    write!(
                        out,
                        r#" id="{id}" class="qr-module" fill="{}""#,
                        escape_xml(&self.fill_for(config, n, x, y, region))
                    )?;
                    if a11y.enabled && a11y.include_coordinates {
                        write!(out, r#" data-x="{x}" data-y="{y}""#)?;
                    }
                    if config.animation.stagger {
                        write!(out, r#" style="--i:{index}""#)?;
                    }
                    out.push_str("/>");
                    index += 1;
                }
            }
            out.push_str("</g>");
        }
        out.push_str("</g></svg>");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EncodingHints, Encoder, SyntheticEncoder};
    use crate::intents::ErrorLevel;

    fn matrix() -> Matrix {
        SyntheticEncoder.encode("render me", ErrorLevel::H, &EncodingHints::default()).unwrap()
    }

    #[test]
    fn test_renders_svg_with_colours() {
        let mut config = RenderingConfig::default();
        config.dark = "#112233".into();
        let svg = SvgRenderer.render(&matrix(), &config).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains(r##"fill="#112233""##));
    }

    #[test]
    fn test_knockout_removes_modules() {
        let m = matrix();
        let plain = SvgRenderer.render(&m, &RenderingConfig::default()).unwrap();
        let mut config = RenderingConfig::default();
        config.centerpiece.enabled = true;
        config.centerpiece.size = 0.3;
        let knocked = SvgRenderer.render(&m, &config).unwrap();
        assert!(knocked.matches("qr-module\"").count() < plain.matches("qr-module\"").count());
    }

    #[test]
    fn test_accessibility_attributes_escaped() {
        let mut config = RenderingConfig::default();
        config.accessibility.enabled = true;
        config.accessibility.root_label = Some("Scan <me>".into());
        let svg = SvgRenderer.render(&matrix(), &config).unwrap();
        assert!(svg.contains(r#"aria-label="Scan &lt;me&gt;""#));
        assert!(svg.contains("<title>Scan &lt;me&gt;</title>"));
    }

    #[test]
    fn test_circle_frame_clips() {
        let mut config = RenderingConfig::default();
        config.frame.shape = FrameShape::Circle;
        let svg = SvgRenderer.render(&matrix(), &config).unwrap();
        assert!(svg.contains("clipPath"));
        assert!(svg.contains(r#"clip-path="url(#qr-frame)""#));
    }

    #[test]
    fn test_empty_matrix_is_error() {
        let empty = Matrix::new(1, ErrorLevel::M, vec![]).unwrap();
        assert!(matches!(SvgRenderer.render(&empty, &RenderingConfig::default()), Err(RenderError::EmptyMatrix)));
    }
}
