use crate::core::types::{SortOrder, SortableValue};
use crate::query::{KnnScoreSortOption, QueryParams};

/// Physical field identifier plus an optional display alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldReference {
    pub ident: String,
    pub alias: String,
}

impl FieldReference {
    pub fn new(ident: impl Into<String>, alias: impl Into<String>) -> Self {
        FieldReference { ident: ident.into(), alias: alias.into() }
    }

    /// Name the field is emitted under.
    pub fn output_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.ident
        } else {
            &self.alias
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortOption {
    pub field: FieldReference,
    pub order: SortOrder,
}

impl SortOption {
    /// True when this SORTBY targets the KNN score itself, making a second
    /// sort pass redundant.
    pub fn is_same(&self, knn: &KnnScoreSortOption) -> bool {
        self.field.output_name() == knn.score_field_alias
    }
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub limit_offset: usize,
    pub limit_total: usize,
    /// Projection from the document store, `@` prefixes stripped.
    /// Mutually exclusive with `return_fields`.
    pub load_fields: Option<Vec<FieldReference>>,
    /// Projection from the index; empty list means NOCONTENT (keys only).
    pub return_fields: Option<Vec<FieldReference>>,
    pub query_params: QueryParams,
    pub sort_option: Option<SortOption>,
}

impl Default for SearchParams {
    // Offset 0 / total 10 by convention of the external API.
    fn default() -> Self {
        SearchParams {
            limit_offset: 0,
            limit_total: 10,
            load_fields: None,
            return_fields: None,
            query_params: QueryParams::default(),
            sort_option: None,
        }
    }
}

impl SearchParams {
    pub fn ids_only(&self) -> bool {
        matches!(&self.return_fields, Some(fields) if fields.is_empty())
    }

    pub fn should_return_field(&self, name: &str) -> bool {
        match &self.return_fields {
            None => true,
            Some(fields) => fields.iter().any(|f| f.output_name() == name),
        }
    }

    /// The projection a shard serializes per document; `None` means all
    /// stored fields.
    pub fn selected_fields(&self) -> Option<&[FieldReference]> {
        self.return_fields.as_deref().or(self.load_fields.as_deref())
    }
}

/// One document serialized by a shard evaluator.
#[derive(Debug, Clone)]
pub struct SerializedSearchDoc {
    pub key: String,
    pub values: Vec<(String, SortableValue)>,
    pub knn_score: f64,
    pub sort_score: SortableValue,
}

/// Single profiling sample: operators report depth-tagged events in
/// pre-order; the coordinator rebuilds the tree from depths.
#[derive(Debug, Clone)]
pub struct ProfileEvent {
    pub descr: String,
    pub depth: usize,
    pub micros: u64,
    pub num_processed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SearchProfile {
    pub events: Vec<ProfileEvent>,
}

/// Per-shard search output gathered by the coordinator.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub total_hits: usize,
    pub docs: Vec<SerializedSearchDoc>,
    pub error: Option<String>,
    pub profile: Option<SearchProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_prefers_alias() {
        assert_eq!(FieldReference::new("$.a", "a").output_name(), "a");
        assert_eq!(FieldReference::new("city", "").output_name(), "city");
    }

    #[test]
    fn nocontent_is_an_empty_return_list() {
        let mut params = SearchParams::default();
        assert!(!params.ids_only());
        params.return_fields = Some(Vec::new());
        assert!(params.ids_only());
        assert!(!params.should_return_field("anything"));
    }

    #[test]
    fn absent_return_list_returns_everything() {
        let params = SearchParams::default();
        assert!(params.should_return_field("score"));
    }
}
