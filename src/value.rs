//! The recursive `Value` sum type all scenario payloads, command results,
//! and fixture documents funnel through.

use std::collections::BTreeMap;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number};

/// An insertion-ordered map, backed by `serde_json`'s `preserve_order`
/// feature: internal representations keep insertion order where it
/// carries semantic meaning (command payloads, command results), and are
/// only sorted at canonicalization time.
pub type OrderedMap = Map<String, serde_json::Value>;

/// A dynamically-typed document value. Every boundary conversion (BSON
/// wire documents, JSON fixtures, command payloads) funnels through this
/// type rather than scattering ad-hoc `serde_json::Value` matches, which
/// would silently collapse `Decimal`/`Bytes`/`DateTimeMs`/`ObjectIdHex`
/// values to `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Decimal(String),
    String(String),
    Bytes(Vec<u8>),
    DateTimeMs(i64),
    ObjectIdHex(String),
    Array(Vec<Value>),
    Object(OrderedMap2),
}

/// Insertion-ordered key -> Value map. A thin newtype over `Vec<(String,
/// Value)>` with map-like helpers; `serde_json::Map` can't hold our
/// `Value` directly since it isn't `serde_json::Value`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderedMap2(pub Vec<(String, Value)>);

impl OrderedMap2 {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for OrderedMap2 {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut map = OrderedMap2::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Value {
    pub fn as_object(&self) -> Option<&OrderedMap2> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(i) => Some(*i as i64),
            Value::Int64(i) => Some(*i),
            Value::Double(d) if d.fract() == 0.0 => Some(*d as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(i) => Some(*i as f64),
            Value::Int64(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn object(pairs: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::Object(pairs.into_iter().collect())
    }

    /// Convert a BSON document to our `Value` sum type, preserving the
    /// variants a naive conversion would collapse to `Null`.
    pub fn from_bson_document(doc: &Document) -> Value {
        Value::Object(
            doc.iter()
                .map(|(k, v)| (k.clone(), Value::from_bson(v)))
                .collect(),
        )
    }

    pub fn from_bson(bson: &Bson) -> Value {
        match bson {
            Bson::Double(d) => Value::Double(*d),
            Bson::String(s) => Value::String(s.clone()),
            Bson::Document(d) => Value::from_bson_document(d),
            Bson::Array(a) => Value::Array(a.iter().map(Value::from_bson).collect()),
            Bson::Boolean(b) => Value::Bool(*b),
            Bson::Null => Value::Null,
            Bson::Int32(i) => Value::Int32(*i),
            Bson::Int64(i) => Value::Int64(*i),
            Bson::ObjectId(oid) => Value::ObjectIdHex(oid.to_hex()),
            Bson::DateTime(dt) => Value::DateTimeMs(dt.timestamp_millis()),
            Bson::Decimal128(d) => Value::Decimal(d.to_string()),
            Bson::Binary(b) => Value::Bytes(b.bytes.clone()),
            other => Value::String(other.to_string()),
        }
    }

    /// Convert our `Value` sum type back to a BSON value, the inverse of
    /// `from_bson`.
    pub fn into_bson(&self) -> Bson {
        match self {
            Value::Null => Bson::Null,
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Int32(i) => Bson::Int32(*i),
            Value::Int64(i) => Bson::Int64(*i),
            Value::Double(d) => Bson::Double(*d),
            Value::Decimal(s) => s
                .parse()
                .map(Bson::Decimal128)
                .unwrap_or_else(|_| Bson::String(s.clone())),
            Value::String(s) => Bson::String(s.clone()),
            Value::Bytes(b) => Bson::Binary(bson::Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: b.clone(),
            }),
            Value::DateTimeMs(ms) => Bson::DateTime(bson::DateTime::from_millis(*ms)),
            Value::ObjectIdHex(hex) => bson::oid::ObjectId::parse_str(hex)
                .map(Bson::ObjectId)
                .unwrap_or_else(|_| Bson::String(hex.clone())),
            Value::Array(a) => Bson::Array(a.iter().map(Value::into_bson).collect()),
            Value::Object(m) => Bson::Document(self_to_bson_document(m)),
        }
    }

    pub fn into_bson_document(&self) -> Document {
        match self {
            Value::Object(m) => self_to_bson_document(m),
            _ => Document::new(),
        }
    }

    /// Convert from a `serde_json::Value` (used for fixture/spec-file
    /// ingestion, which is plain JSON, not BSON).
    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => number_to_value(n),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(a) => Value::Array(a.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn into_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int32(i) => serde_json::Value::Number((*i).into()),
            Value::Int64(i) => serde_json::Value::Number((*i).into()),
            Value::Double(d) => Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Decimal(s) => serde_json::Value::String(s.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
            Value::DateTimeMs(ms) => serde_json::Value::Number((*ms).into()),
            Value::ObjectIdHex(hex) => serde_json::Value::String(hex.clone()),
            Value::Array(a) => serde_json::Value::Array(a.iter().map(Value::into_json).collect()),
            Value::Object(m) => {
                let mut out = OrderedMap::new();
                for (k, v) in m.iter() {
                    out.insert(k.clone(), v.into_json());
                }
                serde_json::Value::Object(out)
            }
        }
    }
}

fn number_to_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
            Value::Int32(i as i32)
        } else {
            Value::Int64(i)
        }
    } else if let Some(f) = n.as_f64() {
        Value::Double(f)
    } else {
        Value::Null
    }
}

fn self_to_bson_document(m: &OrderedMap2) -> Document {
    let mut doc = Document::new();
    for (k, v) in m.iter() {
        doc.insert(k.clone(), v.into_bson());
    }
    doc
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.into_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(&json))
    }
}

impl Serialize for OrderedMap2 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = OrderedMap::new();
        for (k, v) in self.iter() {
            map.insert(k.clone(), v.into_json());
        }
        serde_json::Value::Object(map).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OrderedMap2 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, Value::from_json(&v)))
                .collect()),
            _ => Err(serde::de::Error::custom("expected a JSON object")),
        }
    }
}

/// A plain `BTreeMap` view used only where sorted-key iteration is the
/// point (canonicalization); everywhere else we keep `OrderedMap2`'s
/// insertion order.
pub type SortedMap = BTreeMap<String, Value>;
