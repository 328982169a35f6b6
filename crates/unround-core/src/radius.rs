#![forbid(unsafe_code)]

//! CSS length helpers for corner radii.
//!
//! Hosts report resolved styles as strings (`"12px"`, `"12px 4px"`, `"50%"`,
//! `"auto"`). The engine only ever needs the leading number of such a value,
//! and only ever writes plain pixel lengths.
//!
//! # Invariants
//!
//! 1. [`RadiusValue`] is always finite and never negative zero.
//! 2. [`RadiusValue::to_css`] uses the shortest decimal that round-trips, so
//!    integral radii are written without a fractional part (`"8px"`).
//! 3. [`leading_number`] accepts the same prefixes a lenient CSS number parser
//!    does and ignores any trailing unit or extra components.

use std::fmt;

/// A pixel radius the engine may write to an element.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RadiusValue(f64);

impl RadiusValue {
    /// Zero radius.
    pub const ZERO: Self = Self(0.0);

    /// Build a pixel radius. Non-finite input collapses to zero.
    #[must_use]
    pub fn px(value: f64) -> Self {
        if !value.is_finite() || value == 0.0 {
            return Self::ZERO;
        }
        Self(value)
    }

    /// Raw pixel value.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// CSS text for this radius, e.g. `"8px"` or `"2.5px"`.
    #[must_use]
    pub fn to_css(self) -> String {
        format!("{}px", self.0)
    }
}

impl fmt::Display for RadiusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}px", self.0)
    }
}

/// Parse the leading number of a CSS value.
///
/// Returns `None` when the value does not start with a number (after leading
/// whitespace). Exponents are accepted only when followed by digits.
#[must_use]
pub fn leading_number(value: &str) -> Option<f64> {
    let s = value.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;

    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        } else if digits > 0 {
            // "12." still parses as 12.
            end = frac_start;
        }
    }
    if digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Leading number of a CSS length, or `0.0` when there is none.
#[must_use]
pub fn length_or_zero(value: &str) -> f64 {
    leading_number(value).unwrap_or(0.0)
}

/// Whether a resolved `border-radius` value describes any rounding at all.
///
/// Empty values and values whose every component is zero (`"0px"`,
/// `"0px 0px"`, `"0"`) count as unrounded.
#[must_use]
pub fn has_rounding(border_radius: &str) -> bool {
    border_radius
        .split(|c: char| c.is_ascii_whitespace() || c == '/')
        .filter(|part| !part.is_empty())
        .any(|part| leading_number(part).is_some_and(|v| v != 0.0))
}
