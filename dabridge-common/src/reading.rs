use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::tag::TagPath;

/// A value read from (or written to) a DA tag.
///
/// Serializes untagged so wire payloads carry the bare JSON value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TagValue {
    /// Whole number.
    Integer(i64),

    /// Floating-point number.
    Number(f64),

    /// Boolean value.
    Boolean(bool),

    /// Text value.
    Text(String),

    /// No value (failed or never-read tag).
    Null,
}

impl TagValue {
    /// True for the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, TagValue::Null)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Integer(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Number(v)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Boolean(v)
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Text(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Text(v.to_string())
    }
}

/// Coarse reliability indicator accompanying every tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
    Bad,
    Uncertain,
}

impl Quality {
    /// Interpret a classic DA quality code.
    ///
    /// Bands per the DA specification: 0-63 bad, 64-191 uncertain,
    /// 192-255 good.
    pub fn from_da_code(code: u8) -> Self {
        match code {
            0..=63 => Quality::Bad,
            64..=191 => Quality::Uncertain,
            _ => Quality::Good,
        }
    }

    /// Interpret a source quality string.
    ///
    /// Sources report compound codes like "Good, Local Override"; the
    /// leading word decides the band and unknown text maps to bad.
    pub fn from_da_text(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        if lower.starts_with("good") {
            Quality::Good
        } else if lower.starts_with("uncertain") {
            Quality::Uncertain
        } else {
            Quality::Bad
        }
    }

    /// Wire representation ("good", "bad", "uncertain").
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Good => "good",
            Quality::Bad => "bad",
            Quality::Uncertain => "uncertain",
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, Quality::Good)
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped value+quality sample for a tag.
///
/// Produced fresh on every successful poll and never mutated; each cycle's
/// reading logically replaces the previous one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    /// Tag this sample belongs to.
    pub tag: TagPath,

    /// The sampled value.
    pub value: TagValue,

    /// Reliability of the sample.
    pub quality: Quality,

    /// Unix epoch milliseconds when the sample was taken.
    pub timestamp: i64,
}

impl Reading {
    /// Create a reading stamped with the current time.
    pub fn new(tag: TagPath, value: TagValue, quality: Quality) -> Self {
        Self {
            tag,
            value,
            quality,
            timestamp: current_timestamp_millis(),
        }
    }

    /// The reading emitted when a poll fails: null value, bad quality.
    ///
    /// Downstream consumers observe the failure instead of a stale value.
    pub fn failed(tag: TagPath) -> Self {
        Self::new(tag, TagValue::Null, Quality::Bad)
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
