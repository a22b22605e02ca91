//! Typed attribute values carried by nodes and links.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Attribute map of a node or link. Keys are kept sorted so serialized output is stable.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A single attribute value.
///
/// Dates serialize as ISO-8601 strings and come back as plain strings, so
/// `Date` values only exist on graphs built by an ingester.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "JsonValue")]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    ZonedDateTime(DateTime<FixedOffset>),
    List(Vec<AttributeValue>),
    /// Nested objects kept opaque.
    Json(JsonValue),
}

impl AttributeValue {
    /// Numeric view used by filters. Booleans count as 0/1.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Int(i) => Some(Number::Int(*i)),
            Self::Float(f) => Some(Number::Float(*f)),
            Self::Bool(b) => Some(Number::Int(i64::from(*b))),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Append `value`, promoting a scalar into a two-element list.
    pub fn push(&mut self, value: AttributeValue) {
        match self {
            Self::List(items) => items.push(value),
            _ => {
                let existing = std::mem::replace(self, Self::Null);
                *self = Self::List(vec![existing, value]);
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Date(_) | Self::DateTime(_) | Self::ZonedDateTime(_) => {
                JsonValue::String(self.to_string())
            }
            Self::List(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            Self::Json(v) => v.clone(),
        }
    }
}

impl From<JsonValue> for AttributeValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            obj @ JsonValue::Object(_) => Self::Json(obj),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<NaiveDate> for AttributeValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// String form used by search and string comparisons.
impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{}", s),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Self::ZonedDateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Numeric operand of a filter comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Parse a user-supplied operand: integers stay exact, anything else numeric becomes a float.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(i) = raw.parse::<i64>() {
            return Some(Self::Int(i));
        }
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Self::Float)
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.partial_cmp(b),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dates_serialize_as_iso_strings() {
        let date = AttributeValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(serde_json::to_value(&date).unwrap(), json!("2024-03-09"));

        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        assert_eq!(
            serde_json::to_value(AttributeValue::DateTime(dt)).unwrap(),
            json!("2024-03-09T14:05:00")
        );

        let zoned = DateTime::parse_from_rfc3339("2024-03-09T14:05:00+02:00").unwrap();
        assert_eq!(
            serde_json::to_value(AttributeValue::ZonedDateTime(zoned)).unwrap(),
            json!("2024-03-09T14:05:00+02:00")
        );
    }

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(AttributeValue::from(json!(3)), AttributeValue::Int(3));
        assert_eq!(AttributeValue::from(json!(2.5)), AttributeValue::Float(2.5));
        assert_eq!(AttributeValue::from(json!("x")), AttributeValue::String("x".into()));
        assert_eq!(AttributeValue::from(json!(null)), AttributeValue::Null);
        assert!(matches!(AttributeValue::from(json!({"a": 1})), AttributeValue::Json(_)));
        assert_eq!(
            AttributeValue::from(json!([1, "a"])),
            AttributeValue::List(vec![AttributeValue::Int(1), AttributeValue::String("a".into())])
        );
    }

    #[test]
    fn test_float_keeps_fraction_through_json() {
        let value = AttributeValue::Float(1.0);
        let text = serde_json::to_string(&value).unwrap();
        let back: AttributeValue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_push_promotes_to_list() {
        let mut value = AttributeValue::Int(0);
        value.push(AttributeValue::Int(1));
        value.push(AttributeValue::Int(2));
        assert_eq!(
            value,
            AttributeValue::List(vec![
                AttributeValue::Int(0),
                AttributeValue::Int(1),
                AttributeValue::Int(2)
            ])
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(AttributeValue::Float(25.0).to_string(), "25.0");
        assert_eq!(AttributeValue::Float(2.5).to_string(), "2.5");
        assert_eq!(
            AttributeValue::List(vec!["a".into(), AttributeValue::Int(1)]).to_string(),
            "[a, 1]"
        );
    }

    #[test]
    fn test_number_ordering() {
        assert!(Number::Int(29) < Number::Int(30));
        assert!(Number::Float(29.5) < Number::Int(30));
        assert_eq!(Number::parse(" 42 "), Some(Number::Int(42)));
        assert_eq!(Number::parse("1e3"), Some(Number::Float(1000.0)));
        assert_eq!(Number::parse("abc"), None);
    }
}
