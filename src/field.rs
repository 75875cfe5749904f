use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

/// One raw record of the upstream `feeds` array.
pub type FeedRecord = serde_json::Map<String, Value>;

/// Field number to display name. Built once at startup.
#[derive(Debug, Clone)]
pub struct FieldMap(BTreeMap<u32, String>);

impl FieldMap {
    pub fn new(fields: impl IntoIterator<Item = (u32, String)>) -> Self {
        Self(fields.into_iter().collect())
    }

    pub fn name(&self, field: u32) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.0.iter().map(|(&n, name)| (n, name.as_str()))
    }
}

impl Default for FieldMap {
    fn default() -> Self {
        Self::new(
            [
                (1, "LDR1 (V)"),
                (2, "LDR2 (Cm)"),
                (3, "LDR3"),
                (4, "LDR4 (V)"),
                (5, "Dust Level (Cm)"),
                (6, "Panel Output (V)"),
                (7, "Dust Level (Cm)"),
                (8, "Cleaning Status"),
            ]
            .map(|(n, name)| (n, name.to_string())),
        )
    }
}

/// A field number as it appears in a URL path. Any run of digits matches, so
/// a number too large for a field is still routed and reported as unknown.
#[derive(Debug, Clone)]
pub struct FieldSegment(String);

impl FieldSegment {
    pub fn number(&self) -> Option<u32> {
        self.0.parse().ok()
    }
}

impl FromStr for FieldSegment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(())
        }
    }
}

impl fmt::Display for FieldSegment {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

pub fn key(field: u32) -> String {
    format!("field{field}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    // categorical fields, e.g. "Cleaning Status"
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldReading {
    pub timestamp: Option<String>,
    pub value: Option<FieldValue>,
}

impl FieldValue {
    /// Absent, null and empty values are `None`; numeric text becomes a number.
    pub fn normalize(raw: Option<&Value>) -> Option<Self> {
        match raw? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            // "nan" and "inf" parse, but can't be represented in JSON
            Value::String(s) => Some(
                s.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Self::Number)
                    .unwrap_or_else(|| Self::Raw(Value::String(s.clone()))),
            ),
            Value::Number(n) => Some(match n.as_f64() {
                Some(f) => Self::Number(f),
                None => Self::Raw(Value::Number(n.clone())),
            }),
            other => Some(Self::Raw(other.clone())),
        }
    }
}

impl FieldReading {
    pub fn from_feed(feed: &FeedRecord, field: u32) -> Self {
        Self {
            timestamp: feed
                .get("created_at")
                .and_then(Value::as_str)
                .map(str::to_string),
            value: FieldValue::normalize(feed.get(&key(field))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn feed(v: Value) -> FeedRecord {
        match v {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn empty_and_absent_values_are_null() {
        let f = feed(json!({ "created_at": "t1", "field3": "" }));

        assert_eq!(
            FieldReading::from_feed(&f, 3),
            FieldReading {
                timestamp: Some("t1".into()),
                value: None
            }
        );
        assert_eq!(FieldReading::from_feed(&f, 4).value, None);
        assert_eq!(FieldValue::normalize(Some(&Value::Null)), None);
    }

    #[test]
    fn numeric_text_is_parsed() {
        let f = feed(json!({ "created_at": "t2", "field6": "12.5" }));
        assert_eq!(
            FieldReading::from_feed(&f, 6).value,
            Some(FieldValue::Number(12.5))
        );

        assert_eq!(
            FieldValue::normalize(Some(&json!(" 3 "))),
            Some(FieldValue::Number(3.0))
        );
        assert_eq!(
            FieldValue::normalize(Some(&json!(7))),
            Some(FieldValue::Number(7.0))
        );

        for text in ["nan", "inf", "-Infinity"] {
            assert_eq!(
                FieldValue::normalize(Some(&json!(text))),
                Some(FieldValue::Raw(json!(text))),
                "{text}"
            );
        }
    }

    #[test]
    fn categorical_text_is_kept() {
        let f = feed(json!({ "created_at": "t3", "field8": "Cleaning" }));
        assert_eq!(
            FieldReading::from_feed(&f, 8).value,
            Some(FieldValue::Raw(json!("Cleaning")))
        );
    }

    #[test]
    fn readings_serialize_flat() {
        let readings = [
            FieldReading {
                timestamp: Some("t".into()),
                value: Some(FieldValue::Number(1.5)),
            },
            FieldReading {
                timestamp: None,
                value: Some(FieldValue::Raw(json!("Idle"))),
            },
        ];

        assert_eq!(
            serde_json::to_value(&readings).unwrap(),
            json!([
                { "timestamp": "t", "value": 1.5 },
                { "timestamp": null, "value": "Idle" },
            ])
        );
    }

    #[test]
    fn segments_are_digits_only() {
        let seg: FieldSegment = "6".parse().unwrap();
        assert_eq!(seg.number(), Some(6));

        let seg: FieldSegment = "99999999999".parse().unwrap();
        assert_eq!(seg.number(), None);
        assert_eq!(seg.to_string(), "99999999999");

        for bad in ["", "-1", "+1", "1.5", "abc", "6 "] {
            assert!(bad.parse::<FieldSegment>().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn default_map_names() {
        let map = FieldMap::default();
        assert_eq!(map.name(8), Some("Cleaning Status"));
        assert_eq!(map.name(9), None);
        assert_eq!(map.iter().count(), 8);
    }
}
