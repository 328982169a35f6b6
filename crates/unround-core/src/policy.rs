#![forbid(unsafe_code)]

//! Radius policy evaluation.
//!
//! [`evaluate`] is a pure function of an element's resolved style, its box,
//! and the active [`Settings`]. It never touches the tree; the correction pass
//! decides what to do with the result.
//!
//! # Geometry
//!
//! Each dimension prefers the live box and falls back to the declared style
//! value when the box reports zero (or is missing). Unparsable declarations
//! count as zero.
//!
//! # Modes
//!
//! | Mode | Result |
//! |------|--------|
//! | absolute | `round_amount`, always |
//! | ratio | `shortest_side * ratio_amount`, clamped; deferred until laid out |
//! | clamp | current radius pulled into bounds; no change when inside (bounds inclusive) |

use crate::host::{BoxSize, ComputedStyle};
use crate::radius::{RadiusValue, length_or_zero};
use crate::settings::{Mode, Settings};

/// Outcome of evaluating one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// The element should carry this radius.
    Write(RadiusValue),
    /// Nothing to change.
    NoChange,
    /// Geometry is not resolved yet; re-evaluate after a resize or
    /// visibility change.
    Defer,
}

impl Evaluation {
    /// The radius to write, if any.
    #[must_use]
    pub const fn desired(self) -> Option<RadiusValue> {
        match self {
            Self::Write(value) => Some(value),
            Self::NoChange | Self::Defer => None,
        }
    }
}

/// Effective box for policy purposes.
#[must_use]
pub fn resolve_size(style: &ComputedStyle, bounding_box: Option<BoxSize>) -> BoxSize {
    let live = bounding_box.unwrap_or_default();
    let pick = |live: f64, declared: &str| {
        if live.is_finite() && live != 0.0 {
            live
        } else {
            length_or_zero(declared)
        }
    };
    BoxSize::new(pick(live.width, &style.width), pick(live.height, &style.height))
}

/// Compute the radius an element should have under `settings`.
#[must_use]
pub fn evaluate(
    style: &ComputedStyle,
    bounding_box: Option<BoxSize>,
    settings: &Settings,
) -> Evaluation {
    let shortest_side = resolve_size(style, bounding_box).shortest_side();

    match settings.mode {
        Mode::Absolute => Evaluation::Write(RadiusValue::px(settings.round_amount)),
        Mode::Ratio => {
            if shortest_side == 0.0 || !style.is_rendered() {
                return Evaluation::Defer;
            }
            match settings.ratio_amount {
                Some(ratio) if shortest_side > 0.0 => {
                    let raw = shortest_side * ratio;
                    Evaluation::Write(RadiusValue::px(settings.clamp_radius(raw)))
                }
                _ => Evaluation::NoChange,
            }
        }
        Mode::Clamp => {
            let current = length_or_zero(&style.border_radius);
            let clamped = settings.clamp_radius(current);
            if clamped == current {
                Evaluation::NoChange
            } else {
                Evaluation::Write(RadiusValue::px(clamped))
            }
        }
    }
}
