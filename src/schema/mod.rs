pub mod schema;

pub use schema::{
    is_valid_json_path, DocIndex, FieldFlags, FieldParams, FieldType, IndexKind, IndexOptions,
    NumericParams, Schema, SchemaField, TagParams, TextParams, VectorParams, VectorSimilarity,
};
