//! Recursive value model consumed by the markdown renderer.
//!
//! A [`Value`] is either empty, a scalar leaf, an insertion-ordered
//! [`Mapping`], or a sequence of values. Vendor responses arrive as
//! `serde_json::Value` and are converted with `From`, keeping object key
//! order.

use crate::error::RenderError;
use serde::Serialize;
use std::fmt;

/// Leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Scalar {
    /// `0`, `0.0`, `false` and `""` are falsy.
    pub fn is_falsy(&self) -> bool {
        match self {
            Scalar::Int(i) => *i == 0,
            Scalar::Float(f) => *f == 0.0,
            Scalar::Bool(b) => !*b,
            Scalar::Text(s) => s.is_empty(),
        }
    }
}

/// Shortest round-trip text of a float: positional for decimal exponents in
/// `-4..16` (integral values keep a `.0`), otherwise
/// `<mantissa>e<sign><2+ digit exponent>`: `3.0`, `0.1`, `1e+16`, `1e-05`.
fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let scientific = format!("{:e}", v);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if v != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
    }

    let positional = v.to_string();
    if positional.contains('.') {
        positional
    } else {
        format!("{}.0", positional)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => f.write_str(&format_float(*v)),
            Scalar::Bool(true) => f.write_str("True"),
            Scalar::Bool(false) => f.write_str("False"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// A node in the structure handed to the renderer.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Empty,
    Scalar(Scalar),
    Mapping(Mapping),
    Sequence(Vec<Value>),
}

impl Value {
    /// Convenience constructor for text leaves.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Scalar(Scalar::Text(s.into()))
    }

    /// Falsy values are omitted by the renderer: empty, falsy scalars,
    /// and empty mappings or sequences.
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Scalar(s) => s.is_falsy(),
            Value::Mapping(m) => m.is_empty(),
            Value::Sequence(items) => items.is_empty(),
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Serialize any `serde` type into a value tree.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, RenderError> {
        let json = serde_json::to_value(value)
            .map_err(|e| RenderError::Serialization(e.to_string()))?;
        Ok(json.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Scalar(_) => "scalar",
            Value::Mapping(_) => "mapping",
            Value::Sequence(_) => "sequence",
        }
    }
}

/// Insertion-ordered map with unique keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    entries: Vec<(String, Value)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value. An existing key keeps its position and has its value
    /// replaced; the previous value is returned.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize a `serde` struct or map into a mapping.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, RenderError> {
        Self::try_from(Value::from_serialize(value)?)
    }
}

impl<K, V> FromIterator<(K, V)> for Mapping
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (k, v) in iter {
            mapping.insert(k, v);
        }
        mapping
    }
}

impl IntoIterator for Mapping {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl TryFrom<Value> for Mapping {
    type Error = RenderError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Mapping(m) => Ok(m),
            other => Err(RenderError::NotAMapping { found: other.kind() }),
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<Mapping> for Value {
    fn from(m: Mapping) -> Self {
        Value::Mapping(m)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Scalar(Scalar::Bool(b))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Scalar(Scalar::Int(i64::from(i)))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Scalar(Scalar::Int(i64::from(i)))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Scalar(Scalar::Int(i))
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        match i64::try_from(i) {
            Ok(i) => Value::Scalar(Scalar::Int(i)),
            Err(_) => Value::Scalar(Scalar::Float(i as f64)),
        }
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::from(i as u64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Scalar(Scalar::Float(f))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Empty, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Empty,
            serde_json::Value::Bool(b) => b.into(),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i.into()
                } else if let Some(u) = n.as_u64() {
                    u.into()
                } else {
                    n.as_f64().map_or(Value::Empty, Into::into)
                }
            }
            serde_json::Value::String(s) => s.into(),
            serde_json::Value::Array(items) => items.into(),
            serde_json::Value::Object(map) => Value::Mapping(map.into()),
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Mapping {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut m = Mapping::new().with("a", 1).with("b", 2);
        let previous = m.insert("a", 3);

        assert_eq!(previous, Some(Value::from(1)));
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(m.get("a"), Some(&Value::from(3)));
    }

    #[test]
    fn test_falsy_values() {
        assert!(Value::Empty.is_falsy());
        assert!(Value::from(0).is_falsy());
        assert!(Value::from(0.0).is_falsy());
        assert!(Value::from(false).is_falsy());
        assert!(Value::from("").is_falsy());
        assert!(Value::from(Mapping::new()).is_falsy());
        assert!(Value::Sequence(vec![]).is_falsy());

        assert!(!Value::from(f64::NAN).is_falsy());
        assert!(!Value::from("x").is_falsy());
        assert!(!Value::Sequence(vec![Value::Empty]).is_falsy());
    }

    #[test]
    fn test_from_json_preserves_key_order() {
        let value: Value = json!({"zeta": 1, "alpha": {"mid": null, "b": [true]}}).into();
        let mapping = value.as_mapping().unwrap();

        assert_eq!(mapping.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        let alpha = mapping.get("alpha").unwrap().as_mapping().unwrap();
        assert_eq!(alpha.get("mid"), Some(&Value::Empty));
        assert_eq!(
            alpha.get("b"),
            Some(&Value::Sequence(vec![Value::from(true)]))
        );
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(Scalar::Int(-4).to_string(), "-4");
        assert_eq!(Scalar::Float(2.0).to_string(), "2.0");
        assert_eq!(Scalar::Float(4.25).to_string(), "4.25");
        assert_eq!(Scalar::Bool(true).to_string(), "True");
        assert_eq!(Scalar::Bool(false).to_string(), "False");
        assert_eq!(Scalar::Text("hi".into()).to_string(), "hi");
    }

    #[test]
    fn test_float_display_switches_to_exponent() {
        assert_eq!(Scalar::Float(1e16).to_string(), "1e+16");
        assert_eq!(Scalar::Float(1e-5).to_string(), "1e-05");
        assert_eq!(Scalar::Float(-2.5e-7).to_string(), "-2.5e-07");
        assert_eq!(Scalar::Float(1.5e300).to_string(), "1.5e+300");
        assert_eq!(Scalar::Float(1e15).to_string(), "1000000000000000.0");
        assert_eq!(Scalar::Float(0.0001).to_string(), "0.0001");
        assert_eq!(Scalar::Float(0.1).to_string(), "0.1");
        assert_eq!(Scalar::Float(-0.0).to_string(), "-0.0");
        assert_eq!(Scalar::Float(f64::INFINITY).to_string(), "inf");
        assert_eq!(Scalar::Float(f64::NAN).to_string(), "nan");
    }

    #[test]
    fn test_from_serialize_requires_object() {
        #[derive(Serialize)]
        struct Row {
            id: u32,
            name: &'static str,
        }

        let mapping = Mapping::from_serialize(&Row { id: 7, name: "x" }).unwrap();
        assert_eq!(mapping.keys().collect::<Vec<_>>(), vec!["id", "name"]);

        let err = Mapping::from_serialize(&vec![1, 2]).unwrap_err();
        assert!(matches!(err, RenderError::NotAMapping { found: "sequence" }));
    }
}
