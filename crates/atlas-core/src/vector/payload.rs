//! Retrieved records and their vector payloads.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Point identifier as returned by the database: unsigned integer or UUID string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Num(n) => write!(f, "{}", n),
            PointId::Uuid(s) => f.write_str(s),
        }
    }
}

/// Sparse vector as parallel index/value sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f64>,
}

/// Vector payload of a single record.
///
/// Decoding classifies by JSON structure rather than by a tag: an array of
/// numbers is dense, an array of arrays is a multivector, an object with
/// `indices` is sparse and any other object is a set of named vectors.
/// Everything else is kept as `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VectorPayload {
    Dense(Vec<f64>),
    MultiVector(Vec<Vec<f64>>),
    Sparse(SparseVector),
    Named(BTreeMap<String, VectorPayload>),
    Unknown(Value),
}

/// Structural classification of a vector payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorShape {
    Dense,
    MultiVector,
    Sparse,
    Named,
    Unknown,
}

impl fmt::Display for VectorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VectorShape::Dense => "dense",
            VectorShape::MultiVector => "multivector",
            VectorShape::Sparse => "sparse",
            VectorShape::Named => "named",
            VectorShape::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl VectorPayload {
    pub fn shape(&self) -> VectorShape {
        match self {
            VectorPayload::Dense(_) => VectorShape::Dense,
            VectorPayload::MultiVector(_) => VectorShape::MultiVector,
            VectorPayload::Sparse(_) => VectorShape::Sparse,
            VectorPayload::Named(_) => VectorShape::Named,
            VectorPayload::Unknown(_) => VectorShape::Unknown,
        }
    }

    /// Look up a named vector. Only `Named` payloads have entries.
    pub fn get(&self, name: &str) -> Option<&VectorPayload> {
        match self {
            VectorPayload::Named(vectors) => vectors.get(name),
            _ => None,
        }
    }
}

impl From<Value> for VectorPayload {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                if matches!(items.first(), Some(Value::Array(_))) {
                    let raw = Value::Array(items);
                    match serde_json::from_value::<Vec<Vec<f64>>>(raw.clone()) {
                        Ok(rows) => VectorPayload::MultiVector(rows),
                        Err(_) => VectorPayload::Unknown(raw),
                    }
                } else {
                    let raw = Value::Array(items);
                    match serde_json::from_value::<Vec<f64>>(raw.clone()) {
                        Ok(values) => VectorPayload::Dense(values),
                        Err(_) => VectorPayload::Unknown(raw),
                    }
                }
            }
            Value::Object(map) if map.contains_key("indices") => {
                let raw = Value::Object(map);
                match serde_json::from_value::<SparseVector>(raw.clone()) {
                    Ok(sparse) => VectorPayload::Sparse(sparse),
                    Err(_) => VectorPayload::Unknown(raw),
                }
            }
            Value::Object(map) => VectorPayload::Named(
                map.into_iter()
                    .map(|(name, v)| (name, VectorPayload::from(v)))
                    .collect(),
            ),
            other => VectorPayload::Unknown(other),
        }
    }
}

impl<'de> Deserialize<'de> for VectorPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(VectorPayload::from)
    }
}

/// One retrieved point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: PointId,
    #[serde(default)]
    pub vector: Option<VectorPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Record {
    pub fn new(id: impl Into<PointId>, vector: VectorPayload) -> Self {
        Self {
            id: id.into(),
            vector: Some(vector),
            payload: None,
        }
    }

    /// Resolve the vector addressed by `using`.
    ///
    /// Without a selector the record's default vector is returned as-is,
    /// which may itself be a `Named` set. With a selector only an entry of a
    /// `Named` set matches.
    pub fn resolve(&self, using: Option<&str>) -> Option<&VectorPayload> {
        let vector = self.vector.as_ref()?;
        match using {
            None => Some(vector),
            Some(name) => vector.get(name),
        }
    }
}

impl From<u64> for PointId {
    fn from(n: u64) -> Self {
        PointId::Num(n)
    }
}

impl From<&str> for PointId {
    fn from(s: &str) -> Self {
        PointId::Uuid(s.to_string())
    }
}
