#![forbid(unsafe_code)]

//! User settings and the snapshot store passes read them through.
//!
//! Settings are supplied by an external provider as a JSON record with
//! camelCase keys and are replaced wholesale on every change. Decoding is
//! lenient about the shape of individual fields: a record that
//! is missing a list, carries `null` for a number, or still uses the legacy
//! numeric mode codes still decodes. Only a mode string that names no known
//! mode, or input that is not JSON at all, is rejected.
//!
//! # Invariants
//!
//! 1. Numeric parameters are finite and non-negative after decoding.
//! 2. `max_rounding == 0.0` means "no upper bound", never "clamp to zero".
//! 3. [`SettingsStore::load`] returns one complete record; a concurrent
//!    [`SettingsStore::store`] is observed either entirely or not at all.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::host::ElementIdentity;

/// Errors produced while decoding a settings record.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rounding policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Write a fixed pixel radius on every candidate.
    #[default]
    #[serde(alias = "1")]
    Absolute,
    /// Derive the radius from the element's shortest side.
    #[serde(alias = "2")]
    Ratio,
    /// Keep the existing radius, pulled into `[min, max]`.
    #[serde(alias = "3")]
    Clamp,
}

impl Mode {
    /// Stable lowercase name, used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::Ratio => "ratio",
            Self::Clamp => "clamp",
        }
    }
}

/// Process-wide rounding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Active policy.
    #[serde(default, deserialize_with = "lenient_mode")]
    pub mode: Mode,
    /// Pixel radius written in [`Mode::Absolute`].
    #[serde(default, deserialize_with = "lenient_amount")]
    pub round_amount: f64,
    /// Fraction of the shortest side used in [`Mode::Ratio`]. `None` when
    /// the provider left it unset.
    #[serde(default, deserialize_with = "lenient_ratio")]
    pub ratio_amount: Option<f64>,
    /// Lower bound for ratio and clamp modes.
    #[serde(default, deserialize_with = "lenient_amount")]
    pub min_rounding: f64,
    /// Upper bound for ratio and clamp modes; `0` disables the bound.
    #[serde(default, deserialize_with = "lenient_amount")]
    pub max_rounding: f64,
    /// Treat elements without any rounding as candidates too.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub edit_all: bool,
    /// Elements carrying any of these classes are never touched.
    #[serde(default, deserialize_with = "lenient_list")]
    pub exclude_classes: Vec<String>,
    /// Elements whose identifier is listed here are never touched.
    #[serde(default, deserialize_with = "lenient_list")]
    pub exclude_ids: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Absolute,
            round_amount: 0.0,
            ratio_amount: None,
            min_rounding: 0.0,
            max_rounding: 0.0,
            edit_all: false,
            exclude_classes: Vec::new(),
            exclude_ids: Vec::new(),
        }
    }
}

impl Settings {
    /// Decode a settings record from JSON text. `null` yields defaults.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Decode a settings record from an already-parsed JSON value.
    ///
    /// A `null` value (the provider had nothing stored) yields defaults.
    pub fn from_value(value: Value) -> Result<Self, SettingsError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Upper clamp bound, or `None` when the zero sentinel disables it.
    #[must_use]
    pub fn upper_bound(&self) -> Option<f64> {
        (self.max_rounding != 0.0).then_some(self.max_rounding)
    }

    /// Pull `value` into `[min_rounding, upper_bound]`.
    ///
    /// The lower bound is checked first, so a `min_rounding` above
    /// `max_rounding` wins for values below it.
    #[must_use]
    pub fn clamp_radius(&self, value: f64) -> f64 {
        if value < self.min_rounding {
            self.min_rounding
        } else if let Some(max) = self.upper_bound()
            && value > max
        {
            max
        } else {
            value
        }
    }

    /// Whether the exclusion lists name this element.
    #[must_use]
    pub fn excludes(&self, identity: &ElementIdentity) -> bool {
        let by_class = self
            .exclude_classes
            .iter()
            .any(|excluded| identity.classes.iter().any(|class| class == excluded));
        if by_class {
            return true;
        }
        identity
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .is_some_and(|id| self.exclude_ids.iter().any(|excluded| excluded == id))
    }
}

// ── Lenient field decoders ──────────────────────────────────────────────

fn sanitize_amount(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn lenient_mode<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mode, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(Mode::default()),
        Value::Number(n) => match n.as_u64() {
            Some(1) => Ok(Mode::Absolute),
            Some(2) => Ok(Mode::Ratio),
            Some(3) => Ok(Mode::Clamp),
            _ => Err(de::Error::custom(format!("unknown rounding mode {n}"))),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "absolute" | "1" => Ok(Mode::Absolute),
            "ratio" | "2" => Ok(Mode::Ratio),
            "clamp" | "3" => Ok(Mode::Clamp),
            other => Err(de::Error::custom(format!("unknown rounding mode {other:?}"))),
        },
        other => Err(de::Error::custom(format!(
            "rounding mode must be a string, got {other}"
        ))),
    }
}

fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(number_from_value(&value).map_or(0.0, sanitize_amount))
}

fn lenient_ratio<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(number_from_value(&value).map(sanitize_amount))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    })
}

fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            _ => None,
        })
        .collect())
}

// ── SettingsStore ───────────────────────────────────────────────────────

/// Wait-free snapshot store for the active [`Settings`].
///
/// The provider publishes a new record with [`store`](Self::store); a
/// correction pass takes one [`load`](Self::load) at its start and uses that
/// `Arc` for the whole batch.
pub struct SettingsStore {
    inner: ArcSwap<Settings>,
}

impl SettingsStore {
    /// Create a store holding `settings`.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: ArcSwap::from_pointee(settings),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<Settings> {
        self.inner.load_full()
    }

    /// Replace the active settings.
    pub fn store(&self, settings: Settings) {
        tracing::debug!(
            message = "settings.store",
            mode = settings.mode.as_str(),
            edit_all = settings.edit_all,
            excluded_classes = settings.exclude_classes.len(),
            excluded_ids = settings.exclude_ids.len()
        );
        self.inner.store(Arc::new(settings));
    }

    /// Decode `text` and publish it. On error the previous settings stay.
    pub fn store_json(&self, text: &str) -> Result<(), SettingsError> {
        let settings = Settings::from_json(text)?;
        self.store(settings);
        Ok(())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("settings", &*self.inner.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn identity(classes: &[&str], id: Option<&str>) -> ElementIdentity {
        ElementIdentity {
            classes: classes.iter().map(|c| (*c).to_string()).collect(),
            id: id.map(str::to_string),
        }
    }

    #[test]
    fn decodes_full_record() {
        let settings = Settings::from_json(
            r#"{
                "mode": "ratio",
                "roundAmount": 8,
                "ratioAmount": 0.5,
                "minRounding": 4,
                "maxRounding": 20,
                "editAll": true,
                "excludeClasses": ["keep-round"],
                "excludeIds": ["logo"]
            }"#,
        )
        .expect("valid settings");

        assert_eq!(
            settings,
            Settings {
                mode: Mode::Ratio,
                round_amount: 8.0,
                ratio_amount: Some(0.5),
                min_rounding: 4.0,
                max_rounding: 20.0,
                edit_all: true,
                exclude_classes: vec!["keep-round".to_string()],
                exclude_ids: vec!["logo".to_string()],
            }
        );
    }

    #[test]
    fn legacy_mode_codes_decode() {
        for (code, mode) in [("1", Mode::Absolute), ("2", Mode::Ratio), ("3", Mode::Clamp)] {
            let text = format!(r#"{{"mode": "{code}"}}"#);
            assert_eq!(Settings::from_json(&text).expect("legacy code").mode, mode);
        }
        assert_eq!(
            Settings::from_json(r#"{"mode": 3}"#).expect("numeric code").mode,
            Mode::Clamp
        );
    }

    #[test]
    fn missing_and_malformed_fields_fall_back() {
        let settings = Settings::from_json(
            r#"{"excludeClasses": "not-a-list", "excludeIds": null, "ratioAmount": null,
                "roundAmount": "12", "minRounding": -5, "editAll": null}"#,
        )
        .expect("lenient decode");
        assert!(settings.exclude_classes.is_empty());
        assert!(settings.exclude_ids.is_empty());
        assert_eq!(settings.ratio_amount, None);
        assert_eq!(settings.round_amount, 12.0);
        assert_eq!(settings.min_rounding, 0.0);
        assert!(!settings.edit_all);
    }

    #[test]
    fn empty_record_is_default() {
        assert_eq!(Settings::from_json("{}").expect("empty"), Settings::default());
        assert_eq!(
            Settings::from_value(Value::Null).expect("null"),
            Settings::default()
        );
        assert_eq!(Settings::from_json("null").expect("null text"), Settings::default());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = Settings::from_json(r#"{"mode": "squircle"}"#).expect_err("bad mode");
        assert!(matches!(err, SettingsError::Json(_)));
        assert!(Settings::from_json("not json").is_err());
    }

    #[test]
    fn zero_max_disables_upper_bound() {
        let settings = Settings {
            min_rounding: 2.0,
            max_rounding: 0.0,
            ..Settings::default()
        };
        assert_eq!(settings.upper_bound(), None);
        assert_eq!(settings.clamp_radius(1_000.0), 1_000.0);
        assert_eq!(settings.clamp_radius(1.0), 2.0);
    }

    #[test]
    fn lower_bound_wins_when_bounds_cross() {
        let settings = Settings {
            min_rounding: 10.0,
            max_rounding: 5.0,
            ..Settings::default()
        };
        assert_eq!(settings.clamp_radius(3.0), 10.0);
        assert_eq!(settings.clamp_radius(12.0), 5.0);
    }

    #[test]
    fn exclusion_by_class_or_id() {
        let settings = Settings {
            exclude_classes: vec!["pill".to_string()],
            exclude_ids: vec!["avatar".to_string()],
            ..Settings::default()
        };
        assert!(settings.excludes(&identity(&["card", "pill"], None)));
        assert!(settings.excludes(&identity(&[], Some("avatar"))));
        assert!(!settings.excludes(&identity(&["card"], Some("header"))));
        assert!(!settings.excludes(&identity(&[], Some(""))));
    }

    #[test]
    fn store_publishes_whole_records() {
        let store = SettingsStore::default();
        let before = store.load();
        store
            .store_json(r#"{"mode": "clamp", "maxRounding": 6}"#)
            .expect("valid");
        let after = store.load();
        assert_eq!(before.mode, Mode::Absolute);
        assert_eq!(after.mode, Mode::Clamp);
        assert_eq!(after.max_rounding, 6.0);

        assert!(store.store_json(r#"{"mode": 9}"#).is_err());
        assert_eq!(store.load().mode, Mode::Clamp);
    }
}
