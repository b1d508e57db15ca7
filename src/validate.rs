//! Shared validators and the non-fatal [`Warning`] type.
//!
//! X3P files are produced by many vendors and frequently bend the schema.
//! Validators therefore never abort: they hand back a [`Warning`] and leave
//! the target field untouched (or keep the raw string, for dates).  Whether
//! a warning is fatal is decided by the caller through [`Strictness`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Strictness ───────────────────────────────────────────────────────────────

/// Governs what happens when a validator reports a [`Warning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strictness {
    /// Collect warnings and carry on.
    #[default]
    Lenient,
    /// The first warning aborts the operation.
    Strict,
}

impl Strictness {
    #[inline]
    pub fn is_strict(self) -> bool {
        matches!(self, Strictness::Strict)
    }
}

// ── Warning ──────────────────────────────────────────────────────────────────

/// A recoverable problem found while reading or validating a document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Warning {
    #[error("MD5 mismatch for {member}: declared {declared}, computed {computed}")]
    ChecksumMismatch { member: String, declared: String, computed: String },
    #[error("Invalid value {value:?} for {field}: {reason}")]
    InvalidValue { field: String, value: String, reason: String },
    #[error("{field} is not an ISO-8601 date-time: {value:?}")]
    InvalidDate { field: String, value: String },
    #[error("Missing element {0}")]
    MissingElement(String),
    #[error("Unsupported format revision {0:?}")]
    UnsupportedRevision(String),
    #[error("Data list holds {found} entries, matrix dimension declares {declared}")]
    EntryCount { declared: usize, found: usize },
    #[error("Data list entries carry {found} components, SizeZ declares {declared}")]
    ComponentWidening { declared: usize, found: usize },
}

impl Warning {
    pub(crate) fn invalid(field: &str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Warning::InvalidValue {
            field:  field.to_owned(),
            value:  value.into(),
            reason: reason.into(),
        }
    }
}

// ── Dates ────────────────────────────────────────────────────────────────────

/// True when `s` is an `xsd:dateTime`, with or without fraction and zone.
pub fn is_iso8601(s: &str) -> bool {
    let s = s.trim();
    if DateTime::parse_from_rfc3339(s).is_ok() {
        return true;
    }
    // xsd:dateTime allows a missing zone designator.
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Check a date string.  The raw value is always returned for storage.
pub fn check_date(field: &str, value: &str) -> Result<(), Warning> {
    if is_iso8601(value) {
        Ok(())
    } else {
        Err(Warning::InvalidDate { field: field.to_owned(), value: value.to_owned() })
    }
}

/// Check a rotation entry: must be finite and within [-1, 1].
pub fn check_unit_range(field: &str, value: f64) -> Result<(), Warning> {
    if value.is_finite() && (-1.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Warning::invalid(field, value.to_string(), "must lie in [-1, 1]"))
    }
}

/// Parse a float the way the format writes them; surrounding blanks allowed.
pub fn parse_f64(field: &str, text: &str) -> Result<f64, Warning> {
    text.trim()
        .parse::<f64>()
        .map_err(|e| Warning::invalid(field, text, e.to_string()))
}
