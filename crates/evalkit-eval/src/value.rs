use evalkit_core::FloatCmp;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

pub type Metrics = BTreeMap<String, MetricValue>;

/// One entry of an evaluation result. `Map` holds the nested result of a
/// keyed child evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Array(Vec<f64>),
    Text(String),
    Map(Metrics),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Int(v) => Some(*v as f64),
            MetricValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Metrics> {
        match self {
            MetricValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Structural equality. Ints and floats compare numerically.
    pub fn equal(&self, other: &MetricValue, cmp: FloatCmp) -> bool {
        match (self, other) {
            (MetricValue::Int(a), MetricValue::Int(b)) => a == b,
            (MetricValue::Int(a), MetricValue::Float(b)) => cmp.eq(*a as f64, *b),
            (MetricValue::Float(a), MetricValue::Int(b)) => cmp.eq(*a, *b as f64),
            (MetricValue::Float(a), MetricValue::Float(b)) => cmp.eq(*a, *b),
            (MetricValue::Array(a), MetricValue::Array(b)) => cmp.eq_slice(a, b),
            (MetricValue::Text(a), MetricValue::Text(b)) => a == b,
            (MetricValue::Map(a), MetricValue::Map(b)) => metrics_equal(a, b, cmp),
            _ => false,
        }
    }

    /// Human-readable form used by templates and report tables.
    pub fn render(&self) -> String {
        match self {
            MetricValue::Int(v) => v.to_string(),
            MetricValue::Float(v) => format_float(*v),
            MetricValue::Array(values) => {
                let items: Vec<String> = values.iter().map(|v| format_float(*v)).collect();
                format!("[{}]", items.join(", "))
            }
            MetricValue::Text(s) => s.clone(),
            MetricValue::Map(m) => {
                let items: Vec<String> = m
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.render()))
                    .collect();
                format!("{{{}}}", items.join(", "))
            }
        }
    }
}

pub fn metrics_equal(a: &Metrics, b: &Metrics, cmp: FloatCmp) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| value.equal(other, cmp)))
}

/// Follows a dotted path (`group.accuracy`) through nested maps.
pub fn lookup<'a>(metrics: &'a Metrics, path: &str) -> Option<&'a MetricValue> {
    if let Some(value) = metrics.get(path) {
        return Some(value);
    }
    let (head, rest) = path.split_once('.')?;
    match metrics.get(head)? {
        MetricValue::Map(inner) => lookup(inner, rest),
        _ => None,
    }
}

pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{v:.4}")
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(v: Vec<f64>) -> Self {
        MetricValue::Array(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

impl From<Metrics> for MetricValue {
    fn from(v: Metrics) -> Self {
        MetricValue::Map(v)
    }
}

// Non-finite floats travel as the strings "NaN", "inf" and "-inf" since JSON
// has no representation for them.

fn special_float_name(v: f64) -> Option<&'static str> {
    if v.is_nan() {
        Some("NaN")
    } else if v == f64::INFINITY {
        Some("inf")
    } else if v == f64::NEG_INFINITY {
        Some("-inf")
    } else {
        None
    }
}

fn parse_special_float(s: &str) -> Option<f64> {
    match s {
        "NaN" | "nan" => Some(f64::NAN),
        "inf" | "Infinity" => Some(f64::INFINITY),
        "-inf" | "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

struct FloatRepr(f64);

impl Serialize for FloatRepr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match special_float_name(self.0) {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_f64(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for FloatRepr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FloatVisitor;

        impl<'de> Visitor<'de> for FloatVisitor {
            type Value = FloatRepr;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or one of \"NaN\", \"inf\", \"-inf\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<FloatRepr, E> {
                Ok(FloatRepr(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<FloatRepr, E> {
                Ok(FloatRepr(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<FloatRepr, E> {
                Ok(FloatRepr(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<FloatRepr, E> {
                parse_special_float(v)
                    .map(FloatRepr)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(FloatVisitor)
    }
}

/// `#[serde(with = "float_vec")]` for `Vec<f64>` fields that may hold NaN.
pub mod float_vec {
    use super::FloatRepr;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for v in values {
            seq.serialize_element(&FloatRepr(*v))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let items = Vec::<FloatRepr>::deserialize(deserializer)?;
        Ok(items.into_iter().map(|f| f.0).collect())
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Int(v) => serializer.serialize_i64(*v),
            MetricValue::Float(v) => FloatRepr(*v).serialize(serializer),
            MetricValue::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for v in values {
                    seq.serialize_element(&FloatRepr(*v))?;
                }
                seq.end()
            }
            MetricValue::Text(s) => serializer.serialize_str(s),
            MetricValue::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = MetricValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a metric value")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<MetricValue, E> {
                Ok(MetricValue::Int(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<MetricValue, E> {
                i64::try_from(v)
                    .map(MetricValue::Int)
                    .or(Ok(MetricValue::Float(v as f64)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<MetricValue, E> {
                Ok(MetricValue::Float(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<MetricValue, E> {
                Ok(match parse_special_float(v) {
                    Some(f) => MetricValue::Float(f),
                    None => MetricValue::Text(v.to_string()),
                })
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<MetricValue, A::Error> {
                let mut values = Vec::new();
                while let Some(FloatRepr(v)) = seq.next_element()? {
                    values.push(v);
                }
                Ok(MetricValue::Array(values))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<MetricValue, A::Error> {
                let mut map = Metrics::new();
                while let Some((key, value)) = access.next_entry::<String, MetricValue>()? {
                    map.insert(key, value);
                }
                Ok(MetricValue::Map(map))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}
