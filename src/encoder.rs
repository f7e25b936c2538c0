//! Symbol Encoding - external collaborator contract
//!
//! The engine only needs version, error level and size from an encoder.
//! [`SyntheticEncoder`] is a deterministic stand-in used by the CLI and
//! tests; it is not a standards-conformant QR encoder.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::intents::ErrorLevel;

pub const MIN_VERSION: u8 = 1;
pub const MAX_VERSION: u8 = 40;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Data too long: {len} bytes, capacity {capacity} bytes at level {level}")]
    DataTooLong { len: usize, capacity: usize, level: ErrorLevel },

    #[error("Malformed matrix: row {row} has {len} modules, expected {size}")]
    NotSquare { size: usize, row: usize, len: usize },
}

/// Encoder options requested through advanced intents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EncodingHints {
    pub mask_pattern: Option<u8>,
    pub min_version: Option<u8>,
    pub boost_error: bool,
    pub charset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleRegion {
    Finder,
    Separator,
    Timing,
    Data,
}

/// Square boolean grid plus version metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    pub version: u8,
    pub error_level: ErrorLevel,
    pub size: usize,
    modules: Vec<bool>,
}

impl Matrix {
    /// Rows must all be `modules.len()` long.
    pub fn new(version: u8, error_level: ErrorLevel, modules: Vec<Vec<bool>>) -> Result<Self, EncodeError> {
        let size = modules.len();
        if let Some((row, r)) = modules.iter().enumerate().find(|(_, r)| r.len() != size) {
            return Err(EncodeError::NotSquare { size, row, len: r.len() });
        }
        Ok(Self { version, error_level, size, modules: modules.into_iter().flatten().collect() })
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.size && y < self.size && self.modules.get(y * self.size + x).copied().unwrap_or(false)
    }

    pub fn dark_count(&self) -> usize {
        self.modules.iter().filter(|m| **m).count()
    }

    /// Classify a module position by function pattern.
    pub fn region(&self, x: usize, y: usize) -> ModuleRegion {
        region_at(self.size, x, y)
    }
}

/// Function-pattern class of module (`x`, `y`) in a symbol of side `n`.
pub fn region_at(n: usize, x: usize, y: usize) -> ModuleRegion {
    // Top-left, top-right and bottom-left squares of side `lim`.
    let in_corner = |lim: usize| {
        let (left, top) = (x < lim, y < lim);
        let (right, bottom) = (x + lim >= n, y + lim >= n);
        (left && top) || (right && top) || (left && bottom)
    };
    if in_corner(7) {
        ModuleRegion::Finder
    } else if in_corner(8) {
        ModuleRegion::Separator
    } else if x == 6 || y == 6 {
        ModuleRegion::Timing
    } else {
        ModuleRegion::Data
    }
}

pub fn version_size(version: u8) -> usize {
    17 + 4 * usize::from(version)
}

/// Data modules available in a version (function patterns excluded).
fn raw_data_modules(version: u8) -> usize {
    let v = usize::from(version);
    let mut result = (16 * v + 128) * v + 64;
    if v >= 2 {
        let align = v / 7 + 2;
        result -= (25 * align - 10) * align - 55;
        if v >= 7 {
            result -= 36;
        }
    }
    result
}

/// Approximate byte-mode capacity. Error-correction share per level is
/// averaged over all versions.
pub fn byte_capacity(version: u8, level: ErrorLevel) -> usize {
    let codewords = raw_data_modules(version) / 8;
    let ec_share = match level {
        ErrorLevel::L => 0.20,
        ErrorLevel::M => 0.37,
        ErrorLevel::Q => 0.55,
        ErrorLevel::H => 0.65,
    };
    let data = codewords - (codewords as f64 * ec_share).round() as usize;
    let header = if version < 10 { 2 } else { 3 };
    data.saturating_sub(header)
}

pub trait Encoder: Send + Sync {
    fn encode(&self, content: &str, level: ErrorLevel, hints: &EncodingHints) -> Result<Matrix, EncodeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticEncoder;

impl SyntheticEncoder {
    fn pick_version(&self, len: usize, level: ErrorLevel, min: u8) -> Result<u8, EncodeError> {
        (min.clamp(MIN_VERSION, MAX_VERSION)..=MAX_VERSION)
            .find(|v| byte_capacity(*v, level) >= len)
            .ok_or(EncodeError::DataTooLong { len, capacity: byte_capacity(MAX_VERSION, level), level })
    }
}

impl Encoder for SyntheticEncoder {
    fn encode(&self, content: &str, level: ErrorLevel, hints: &EncodingHints) -> Result<Matrix, EncodeError> {
        let version = self.pick_version(content.len(), level, hints.min_version.unwrap_or(MIN_VERSION))?;
        let size = version_size(version);
        let mut grid = vec![vec![false; size]; size];

        let far = size - 7;
        for (ox, oy) in [(0, 0), (far, 0), (0, far)] {
            for dy in 0..7 {
                for dx in 0..7 {
                    let ring = dx == 0 || dx == 6 || dy == 0 || dy == 6;
                    let core = (2..=4).contains(&dx) && (2..=4).contains(&dy);
                    grid[oy + dy][ox + dx] = ring || core;
                }
            }
        }

        let mask = hints.mask_pattern.unwrap_or(0);
        let mut stream = DataStream::new(content, level, mask);
        for y in 0..size {
            for x in 0..size {
                match region_at(size, x, y) {
                    ModuleRegion::Timing => grid[y][x] = (x + y) % 2 == 0,
                    ModuleRegion::Data => grid[y][x] = stream.next_bit(),
                    ModuleRegion::Finder | ModuleRegion::Separator => {}
                }
            }
        }
        Matrix::new(version, level, grid)
    }
}

/// SHA-256 counter-mode bit stream seeded from the content.
struct DataStream {
    seed: Vec<u8>,
    counter: u64,
    block: Vec<u8>,
    bit: usize,
}

impl DataStream {
    fn new(content: &str, level: ErrorLevel, mask: u8) -> Self {
        let seed = format!("{level}:{mask}:{content}").into_bytes();
        Self { seed, counter: 0, block: Vec::new(), bit: 0 }
    }

    fn next_bit(&mut self) -> bool {
        if self.bit >= self.block.len() * 8 {
            let mut hasher = Sha256::new();
            hasher.update(&self.seed);
            hasher.update(self.counter.to_be_bytes());
            self.block = hasher.finalize().to_vec();
            self.counter += 1;
            self.bit = 0;
        }
        let byte = self.block[self.bit / 8];
        let value = (byte >> (7 - self.bit % 8)) & 1 == 1;
        self.bit += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_grows_with_version_and_shrinks_with_level() {
        assert!(byte_capacity(2, ErrorLevel::M) > byte_capacity(1, ErrorLevel::M));
        assert!(byte_capacity(10, ErrorLevel::L) > byte_capacity(10, ErrorLevel::H));
        assert!(byte_capacity(40, ErrorLevel::L) > 2500);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let hints = EncodingHints::default();
        let a = SyntheticEncoder.encode("hello", ErrorLevel::M, &hints).unwrap();
        let b = SyntheticEncoder.encode("hello", ErrorLevel::M, &hints).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.version, 1);
        assert_eq!(a.size, 21);
    }

    #[test]
    fn test_min_version_respected() {
        let hints = EncodingHints { min_version: Some(5), ..EncodingHints::default() };
        let m = SyntheticEncoder.encode("hi", ErrorLevel::L, &hints).unwrap();
        assert_eq!(m.version, 5);
        assert_eq!(m.size, version_size(5));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let rows = vec![vec![true, false], vec![true]];
        let err = Matrix::new(1, ErrorLevel::M, rows).unwrap_err();
        assert!(matches!(err, EncodeError::NotSquare { size: 2, row: 1, len: 1 }));
        assert!(Matrix::new(1, ErrorLevel::M, vec![vec![true; 3]; 3]).is_ok());
    }

    #[test]
    fn test_finder_patterns_present() {
        let m = SyntheticEncoder.encode("abc", ErrorLevel::H, &EncodingHints::default()).unwrap();
        assert!(m.is_dark(0, 0));
        assert!(m.is_dark(m.size - 1, 0));
        assert!(m.is_dark(0, m.size - 1));
        assert!(!m.is_dark(1, 1));
        assert!(m.is_dark(3, 3));
        assert_eq!(m.region(3, 3), ModuleRegion::Finder);
        assert_eq!(m.region(7, 0), ModuleRegion::Separator);
        assert_eq!(m.region(10, 6), ModuleRegion::Timing);
    }

    #[test]
    fn test_too_long_is_error() {
        let content = "x".repeat(5000);
        let err = SyntheticEncoder.encode(&content, ErrorLevel::H, &EncodingHints::default());
        assert!(matches!(err, Err(EncodeError::DataTooLong { .. })));
    }
}
