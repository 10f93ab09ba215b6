//! Tariff code normalization.
//!
//! The catalogue prints codes as dot-separated digit groups
//! (`0603.11.00.00.00`); the imports table stores them as a plain integer
//! with the leading zero gone (`60311000000`). [`CanonicalCode`] bridges the
//! two and carries the chapter / heading / subheading prefixes.

use serde::Serialize;
use std::fmt;

/// Width of a fully padded canonical code (`0603.11.00.00.00` has 12 digits).
pub const CODE_WIDTH: usize = 12;

/// Divisor that turns a canonical code into its chapter number.
pub const CHAPTER_DIVISOR: i64 = 10_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CanonicalCode {
    pub value: i64,
    pub chapter: u32,
    pub heading: u32,
    pub subheading: u32,
}

impl CanonicalCode {
    /// Normalize a code string. Dots and spaces are separators; anything else
    /// that is not a digit makes the code invalid.
    ///
    /// Every code is brought to exactly [`CODE_WIDTH`] digits before the
    /// prefixes are sliced, so the prefixes always agree with
    /// [`chapter_of`] on the resulting value:
    ///
    /// - dotted: the first group is left-padded to four digits, the groups are
    ///   concatenated and missing trailing groups count as zeros;
    /// - plain: taken as an already-canonical integer and left-padded.
    ///
    /// Anything wider than [`CODE_WIDTH`] is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let groups: Vec<&str> = raw
            .split(['.', ' '])
            .filter(|g| !g.is_empty())
            .collect();

        if groups.is_empty() || !groups.iter().all(|g| g.bytes().all(|b| b.is_ascii_digit())) {
            return None;
        }

        let digits: String = if groups.len() == 1 {
            format!("{:0>width$}", groups[0], width = CODE_WIDTH)
        } else {
            let mut s = format!("{:0>4}", groups[0]);
            for g in &groups[1..] {
                s.push_str(g);
            }
            format!("{s:0<width$}", width = CODE_WIDTH)
        };

        if digits.len() != CODE_WIDTH {
            return None;
        }

        Some(Self {
            value: digits.parse().ok()?,
            chapter: digits[..2].parse().ok()?,
            heading: digits[..4].parse().ok()?,
            subheading: digits[..6].parse().ok()?,
        })
    }

    /// Rebuild the prefixes from an integer as stored in the imports table.
    pub fn from_value(value: i64) -> Option<Self> {
        if value < 0 {
            return None;
        }
        Self::parse(&value.to_string())
    }
}

impl fmt::Display for CanonicalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Chapter of a stored integer code, the same arithmetic SQL uses. Agrees
/// with [`CanonicalCode::parse`] for every value it accepts.
pub fn chapter_of(value: i64) -> u32 {
    (value / CHAPTER_DIVISOR) as u32
}
