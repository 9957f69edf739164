use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Scalar value attached to a document field in replies and aggregation rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortableValue {
    Null,
    Double(f64),
    Text(String),
}

impl SortableValue {
    /// Natural comparison: null < number < string, numbers by value,
    /// strings lexicographically.
    pub fn cmp_natural(&self, other: &SortableValue) -> Ordering {
        use SortableValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Double(a), Double(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Double(_), Text(_)) => Ordering::Less,
            (Text(_), Double(_)) => Ordering::Greater,
            (Text(a), Text(b)) => a.cmp(b),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SortableValue::Double(d) => Some(*d),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A stored document: a flat field map. For JSON documents the field names
/// are the flattened paths (`$.a`), for hashes the plain names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub fields: HashMap<String, String>,
}

impl Document {
    pub fn new(fields: HashMap<String, String>) -> Self {
        Document { fields }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}
