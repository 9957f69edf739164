use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Document format an index is defined over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    Hash,
    Json,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Hash => "HASH",
            IndexKind::Json => "JSON",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Tag,
    Text,
    Numeric,
    Vector,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Tag => "TAG",
            FieldType::Text => "TEXT",
            FieldType::Numeric => "NUMERIC",
            FieldType::Vector => "VECTOR",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFlags {
    pub sortable: bool,
    pub noindex: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagParams {
    pub separator: char,
    pub case_sensitive: bool,
    pub with_suffixtrie: bool,
}

impl Default for TagParams {
    fn default() -> Self {
        TagParams { separator: ',', case_sensitive: false, with_suffixtrie: false }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TextParams {
    pub with_suffixtrie: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericParams {
    pub block_size: usize,
}

impl Default for NumericParams {
    fn default() -> Self {
        NumericParams { block_size: 1024 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorSimilarity {
    L2,
    Ip,
    Cosine,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorParams {
    pub use_hnsw: bool,
    pub dim: usize,
    pub sim: VectorSimilarity,
    pub capacity: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
}

impl Default for VectorParams {
    fn default() -> Self {
        VectorParams {
            use_hnsw: true,
            dim: 0,
            sim: VectorSimilarity::L2,
            capacity: 1024,
            hnsw_m: 16,
            hnsw_ef_construction: 200,
        }
    }
}

/// Type-specific field parameters. The variant matches the field type by
/// construction: the grammar produces both together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldParams {
    Tag(TagParams),
    Text(TextParams),
    Numeric(NumericParams),
    Vector(VectorParams),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub field_type: FieldType,
    pub flags: FieldFlags,
    /// User-facing name: the alias if one was given, the identifier otherwise.
    pub short_name: String,
    pub params: FieldParams,
}

/// Ordered field map (identifier -> descriptor) plus the alias -> identifier
/// map. Identifiers are used for physical lookup, aliases for naming.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<(String, SchemaField)>,
    field_names: HashMap<String, String>,
}

impl Schema {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.field_names.contains_key(alias)
    }

    /// Insert a field under its identifier and register the alias. The caller
    /// must have rejected duplicate aliases already.
    pub fn insert(&mut self, ident: String, field: SchemaField) {
        self.field_names.insert(field.short_name.clone(), ident.clone());
        if let Some(slot) = self.fields.iter_mut().find(|(i, _)| *i == ident) {
            slot.1 = field;
        } else {
            self.fields.push((ident, field));
        }
    }

    pub fn field(&self, ident: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|(i, _)| i == ident).map(|(_, f)| f)
    }

    /// Resolve a user-facing name (alias or identifier) to the identifier.
    pub fn resolve<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if let Some(ident) = self.field_names.get(name) {
            return Some(ident.as_str());
        }
        self.fields.iter().find(|(i, _)| i == name).map(|(i, _)| i.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SchemaField)> {
        self.fields.iter().map(|(i, f)| (i, f))
    }

    /// Additive merge: identifiers and aliases already present keep their old
    /// definition. Callers must not rely on update-or-insert semantics.
    pub fn merge_additive(&mut self, other: Schema) {
        for (ident, field) in other.fields {
            if self.field(&ident).is_none() {
                self.fields.push((ident, field));
            }
        }
        for (alias, ident) in other.field_names {
            self.field_names.entry(alias).or_insert(ident);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexOptions {
    pub stopwords: HashSet<String>,
}

/// Normalized index definition, shared immutably with every shard after
/// publish. ALTER replaces the whole definition instead of mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocIndex {
    pub kind: IndexKind,
    pub prefix: String,
    pub schema: Schema,
    pub options: IndexOptions,
}

impl Default for DocIndex {
    fn default() -> Self {
        DocIndex {
            kind: IndexKind::Hash,
            prefix: String::new(),
            schema: Schema::default(),
            options: IndexOptions::default(),
        }
    }
}

/// Syntactic gate for JSON path identifiers. The real path engine lives with
/// the document store; this only rejects obviously malformed paths.
pub fn is_valid_json_path(path: &str) -> bool {
    let rest = match path.strip_prefix('$') {
        Some(rest) => rest,
        None => return false,
    };
    if rest.is_empty() {
        return true;
    }
    if !rest.starts_with('.') && !rest.starts_with('[') {
        return false;
    }
    if rest.ends_with('.') || rest.contains("..") {
        return false;
    }
    rest.chars().all(|c| c.is_alphanumeric() || "_.[]*\"'-:".contains(c))
}
