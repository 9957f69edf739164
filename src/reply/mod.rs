use crate::core::types::SortableValue;

/// Reply tree handed to the wire layer. Framing (RESP encoding) happens
/// outside this crate; commands only decide the structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Bulk(String),
    Long(i64),
    Double(f64),
    Null,
    Array(Vec<Reply>),
    /// Ordered key/value pairs, sent with the map marker.
    Map(Vec<(Reply, Reply)>),
    /// Distinct members, sent with the set marker.
    Set(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Simple("OK".to_string())
    }

    pub fn simple(s: impl Into<String>) -> Reply {
        Reply::Simple(s.into())
    }

    pub fn bulk(s: impl Into<String>) -> Reply {
        Reply::Bulk(s.into())
    }

    pub fn string_array<I, S>(items: I) -> Reply
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Reply::Array(items.into_iter().map(Reply::bulk).collect())
    }

    /// Array length, if this is an array.
    pub fn len(&self) -> Option<usize> {
        match self {
            Reply::Array(items) => Some(items.len()),
            _ => None,
        }
    }
}

impl From<&SortableValue> for Reply {
    fn from(value: &SortableValue) -> Reply {
        match value {
            SortableValue::Null => Reply::Null,
            SortableValue::Double(d) => Reply::Double(*d),
            SortableValue::Text(s) => Reply::Bulk(s.clone()),
        }
    }
}
