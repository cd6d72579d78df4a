// domain.rs — Typed value domains for set elements and value predicates.
//
// A domain describes a family of raw values: exact booleans, integer and
// float ranges with inclusive/exclusive bounds, strings by exact match,
// regex, or wildcard (with an optional length constraint), and datetime
// ranges. Domains appear inside set literals and match against the raw
// JSON of argument values.
//
// Regex and wildcard patterns are compiled when the policy is compiled,
// never at call time.

use chrono::{DateTime, Utc};
use glob::Pattern as GlobPattern;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// A regex compiled at policy-compile time. Equality and serialization go
/// through the pattern text; deserialization recompiles.
#[derive(Debug, Clone)]
pub struct CompiledRegex {
    pattern: String,
    regex: Regex,
}

impl CompiledRegex {
    pub fn new(pattern: &str) -> Result<Self, PolicyError> {
        let regex = Regex::new(pattern).map_err(|e| PolicyError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(CompiledRegex {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for CompiledRegex {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}
impl Eq for CompiledRegex {}

impl Serialize for CompiledRegex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pattern)
    }
}

impl<'de> Deserialize<'de> for CompiledRegex {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        CompiledRegex::new(&pattern).map_err(serde::de::Error::custom)
    }
}

/// A wildcard pattern (`*`/`?` globbing) compiled at policy-compile time.
#[derive(Debug, Clone)]
pub struct CompiledGlob {
    pattern: String,
    glob: GlobPattern,
}

impl CompiledGlob {
    pub fn new(pattern: &str) -> Result<Self, PolicyError> {
        let glob = GlobPattern::new(pattern).map_err(|e| PolicyError::InvalidWildcard {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(CompiledGlob {
            pattern: pattern.to_string(),
            glob,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.glob.matches(text)
    }
}

impl PartialEq for CompiledGlob {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}
impl Eq for CompiledGlob {}

impl Serialize for CompiledGlob {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pattern)
    }
}

impl<'de> Deserialize<'de> for CompiledGlob {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        CompiledGlob::new(&pattern).map_err(serde::de::Error::custom)
    }
}

/// An integer range with optional open ends and per-bound exclusivity.
/// An exact value is a range with both bounds equal and inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
    #[serde(default)]
    pub min_exclusive: bool,
    #[serde(default)]
    pub max_exclusive: bool,
}

impl IntRange {
    pub fn exact(value: i64) -> Self {
        IntRange {
            min: Some(value),
            max: Some(value),
            ..Default::default()
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        if let Some(min) = self.min {
            if value < min || (self.min_exclusive && value == min) {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max || (self.max_exclusive && value == max) {
                return false;
            }
        }
        true
    }
}

/// A float range; same bound semantics as [`IntRange`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(default)]
    pub min_exclusive: bool,
    #[serde(default)]
    pub max_exclusive: bool,
}

impl FloatRange {
    pub fn exact(value: f64) -> Self {
        FloatRange {
            min: Some(value),
            max: Some(value),
            ..Default::default()
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        if let Some(min) = self.min {
            if value < min || (self.min_exclusive && value == min) {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max || (self.max_exclusive && value == max) {
                return false;
            }
        }
        true
    }
}

/// A datetime range over UTC instants; bounds are inclusive unless marked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub min: Option<DateTime<Utc>>,
    pub max: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_exclusive: bool,
    #[serde(default)]
    pub max_exclusive: bool,
}

impl DateRange {
    pub fn exact(value: DateTime<Utc>) -> Self {
        DateRange {
            min: Some(value),
            max: Some(value),
            ..Default::default()
        }
    }

    pub fn contains(&self, value: DateTime<Utc>) -> bool {
        if let Some(min) = self.min {
            if value < min || (self.min_exclusive && value == min) {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max || (self.max_exclusive && value == max) {
                return false;
            }
        }
        true
    }
}

/// How a string domain matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrMatcher {
    Exact(String),
    Regex(CompiledRegex),
    Wildcard(CompiledGlob),
}

impl StrMatcher {
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            StrMatcher::Exact(s) => s == text,
            StrMatcher::Regex(r) => r.is_match(text),
            StrMatcher::Wildcard(w) => w.is_match(text),
        }
    }
}

/// A typed value domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Bool(bool),
    Int(IntRange),
    Float(FloatRange),
    Str {
        matcher: StrMatcher,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<IntRange>,
    },
    Datetime(DateRange),
}

impl Domain {
    /// Whether a raw JSON value falls inside this domain.
    ///
    /// Numeric domains accept JSON numbers (integers also match float
    /// ranges); datetime domains accept RFC 3339 strings or epoch-second
    /// numbers. Type mismatches never match.
    pub fn matches(&self, raw: &serde_json::Value) -> bool {
        match self {
            Domain::Bool(expected) => raw.as_bool() == Some(*expected),
            Domain::Int(range) => raw.as_i64().is_some_and(|v| range.contains(v)),
            Domain::Float(range) => raw.as_f64().is_some_and(|v| range.contains(v)),
            Domain::Str { matcher, length } => {
                let Some(text) = raw.as_str() else {
                    return false;
                };
                if let Some(length) = length {
                    if !length.contains(text.chars().count() as i64) {
                        return false;
                    }
                }
                matcher.is_match(text)
            }
            Domain::Datetime(range) => parse_datetime(raw).is_some_and(|dt| range.contains(dt)),
        }
    }
}

/// Parse a raw JSON value as a UTC instant: RFC 3339 strings or epoch
/// seconds as a number.
fn parse_datetime(raw: &serde_json::Value) -> Option<DateTime<Utc>> {
    if let Some(text) = raw.as_str() {
        return DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    raw.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn int_range_bounds() {
        let r = IntRange {
            min: Some(1),
            max: Some(100),
            ..Default::default()
        };
        assert!(r.contains(1));
        assert!(r.contains(100));
        assert!(!r.contains(0));
        assert!(!r.contains(101));
    }

    #[test]
    fn int_range_exclusive_bounds() {
        let r = IntRange {
            min: Some(0),
            max: Some(10),
            min_exclusive: true,
            max_exclusive: true,
        };
        assert!(!r.contains(0));
        assert!(r.contains(1));
        assert!(r.contains(9));
        assert!(!r.contains(10));
    }

    #[test]
    fn open_ended_ranges() {
        let from = IntRange {
            min: Some(10),
            ..Default::default()
        };
        assert!(from.contains(10));
        assert!(from.contains(i64::MAX));
        assert!(!from.contains(9));

        let to = IntRange {
            max: Some(50),
            ..Default::default()
        };
        assert!(to.contains(i64::MIN));
        assert!(!to.contains(51));
    }

    #[test]
    fn bool_domain_matches_only_same_bool() {
        assert!(Domain::Bool(true).matches(&json!(true)));
        assert!(!Domain::Bool(true).matches(&json!(false)));
        assert!(!Domain::Bool(true).matches(&json!("true")));
    }

    #[test]
    fn float_domain_accepts_integer_json() {
        let d = Domain::Float(FloatRange {
            min: Some(0.0),
            max: Some(1.0),
            ..Default::default()
        });
        assert!(d.matches(&json!(0)));
        assert!(d.matches(&json!(0.5)));
        assert!(!d.matches(&json!(1.5)));
    }

    #[test]
    fn str_exact_and_regex_and_wildcard() {
        let exact = Domain::Str {
            matcher: StrMatcher::Exact("hello".into()),
            length: None,
        };
        assert!(exact.matches(&json!("hello")));
        assert!(!exact.matches(&json!("hell")));

        let re = Domain::Str {
            matcher: StrMatcher::Regex(CompiledRegex::new(r"^[a-z]+@example\.com$").unwrap()),
            length: None,
        };
        assert!(re.matches(&json!("alice@example.com")));
        assert!(!re.matches(&json!("alice@evil.com")));

        let wild = Domain::Str {
            matcher: StrMatcher::Wildcard(CompiledGlob::new("*.txt").unwrap()),
            length: None,
        };
        assert!(wild.matches(&json!("notes.txt")));
        assert!(!wild.matches(&json!("notes.pdf")));
    }

    #[test]
    fn str_length_constraint() {
        let d = Domain::Str {
            matcher: StrMatcher::Regex(CompiledRegex::new(".*").unwrap()),
            length: Some(IntRange {
                min: Some(1),
                max: Some(5),
                ..Default::default()
            }),
        };
        assert!(d.matches(&json!("abc")));
        assert!(!d.matches(&json!("")));
        assert!(!d.matches(&json!("toolong")));
    }

    #[test]
    fn datetime_domain_accepts_rfc3339_and_epoch() {
        let min = DateTime::parse_from_rfc3339("2023-09-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let max = DateTime::parse_from_rfc3339("2023-10-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let d = Domain::Datetime(DateRange {
            min: Some(min),
            max: Some(max),
            ..Default::default()
        });
        assert!(d.matches(&json!("2023-09-15T12:00:00Z")));
        assert!(!d.matches(&json!("2024-01-01T00:00:00Z")));
        assert!(d.matches(&json!(min.timestamp() + 60)));
        assert!(!d.matches(&json!("not a date")));
    }

    #[test]
    fn invalid_regex_is_a_compile_error() {
        let err = CompiledRegex::new("(unclosed").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidRegex { .. }));
    }

    #[test]
    fn compiled_patterns_round_trip_through_serde() {
        let d = Domain::Str {
            matcher: StrMatcher::Regex(CompiledRegex::new("^x+$").unwrap()),
            length: None,
        };
        let json = serde_json::to_string(&d).unwrap();
        let back: Domain = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
        assert!(back.matches(&serde_json::json!("xxx")));
    }
}
