use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use unicode_segmentation::UnicodeSegmentation;

use crate::aggregate::DocValues;
use crate::core::error::{Error, Result};
use crate::core::types::{Document, SortOrder, SortableValue};
use crate::index::synonyms::Synonyms;
use crate::query::{QueryAst, SearchAlgorithm};
use crate::schema::{DocIndex, FieldParams, FieldType, VectorSimilarity};
use crate::search::params::{
    ProfileEvent, SearchParams, SearchProfile, SearchResult, SerializedSearchDoc,
};

/// Snapshot returned to the coordinator by FT.INFO.
#[derive(Debug, Clone)]
pub struct DocIndexInfo {
    pub base_index: DocIndex,
    pub num_docs: usize,
}

/// Shard-local index over the documents gated by the definition's prefix.
///
/// The definition is shared immutably; ALTER publishes a fresh one. The term
/// map exists for the synonym-update rebuild hook: it lets the index touch
/// only documents containing an affected term.
pub struct ShardDocIndex {
    base: Arc<DocIndex>,
    keys: BTreeSet<String>,
    term_docs: HashMap<String, BTreeSet<String>>,
    synonyms: Synonyms,
}

impl ShardDocIndex {
    pub fn new(base: Arc<DocIndex>, documents: &HashMap<String, Document>) -> Self {
        let mut index = ShardDocIndex {
            base,
            keys: BTreeSet::new(),
            term_docs: HashMap::new(),
            synonyms: Synonyms::default(),
        };
        for (key, doc) in documents {
            index.add_document(key, doc);
        }
        index
    }

    pub fn base(&self) -> &Arc<DocIndex> {
        &self.base
    }

    pub fn get_info(&self) -> DocIndexInfo {
        DocIndexInfo { base_index: (*self.base).clone(), num_docs: self.keys.len() }
    }

    pub fn add_document(&mut self, key: &str, doc: &Document) {
        if !key.starts_with(&self.base.prefix) {
            return;
        }
        self.keys.insert(key.to_string());
        for term in extract_text_terms(&self.base, doc) {
            self.term_docs.entry(term).or_default().insert(key.to_string());
        }
    }

    pub fn synonyms(&self) -> &Synonyms {
        &self.synonyms
    }

    /// Replace the synonym group and rebuild entries only for documents
    /// containing one of the affected terms.
    pub fn rebuild_for_group(
        &mut self,
        group_id: &str,
        terms: &[String],
        documents: &HashMap<String, Document>,
    ) {
        // Terms affected by the update: the new ones plus the group's old ones.
        let mut affected_terms: HashSet<String> = terms.iter().map(|t| t.to_lowercase()).collect();
        if let Some(old) = self.synonyms.groups().get(group_id) {
            affected_terms.extend(old.iter().cloned());
        }
        self.synonyms.update_group(group_id, terms);

        let affected_keys: BTreeSet<String> = affected_terms
            .iter()
            .filter_map(|term| self.term_docs.get(term))
            .flat_map(|keys| keys.iter().cloned())
            .collect();

        for key in &affected_keys {
            for keys in self.term_docs.values_mut() {
                keys.remove(key);
            }
            if let Some(doc) = documents.get(key) {
                for term in extract_text_terms(&self.base, doc) {
                    self.term_docs.entry(term).or_default().insert(key.clone());
                }
            }
        }
        self.term_docs.retain(|_, keys| !keys.is_empty());
    }

    pub fn get_tag_vals(
        &self,
        documents: &HashMap<String, Document>,
        field_name: &str,
    ) -> Result<BTreeSet<String>> {
        let ident = match self.base.schema.resolve(field_name) {
            Some(ident) => ident.to_string(),
            None => return Err(Error::shard("-Unknown Field")),
        };
        let field = match self.base.schema.field(&ident) {
            Some(field) => field,
            None => return Err(Error::shard("-Unknown Field")),
        };
        let tag_params = match &field.params {
            FieldParams::Tag(params) => params,
            _ => return Err(Error::shard("-Not a tag field")),
        };

        let mut out = BTreeSet::new();
        for key in &self.keys {
            let raw = match documents.get(key).and_then(|doc| doc.get(&ident)) {
                Some(raw) => raw,
                None => continue,
            };
            for part in raw.split(tag_params.separator) {
                let tag = part.trim();
                if tag.is_empty() {
                    continue;
                }
                if tag_params.case_sensitive {
                    out.insert(tag.to_string());
                } else {
                    out.insert(tag.to_lowercase());
                }
            }
        }
        Ok(out)
    }

    pub fn search(
        &self,
        documents: &HashMap<String, Document>,
        params: &SearchParams,
        algo: &SearchAlgorithm,
    ) -> SearchResult {
        let start = Instant::now();

        if let Some(name) = self.unknown_query_field(algo.ast()) {
            return SearchResult {
                error: Some(format!("Unknown field {}", name)),
                ..Default::default()
            };
        }

        let knn = match algo.ast() {
            QueryAst::Knn { field, param, limit, .. } => Some((field, param, *limit)),
            _ => None,
        };

        let mut docs = Vec::new();
        for key in &self.keys {
            let doc = match documents.get(key) {
                Some(doc) => doc,
                None => continue,
            };
            if !self.matches(doc, algo.ast()) {
                continue;
            }
            let knn_score = match knn {
                Some((field, param, _)) => match self.knn_distance(doc, field, param, algo) {
                    Some(distance) => distance,
                    None => continue,
                },
                None => 0.0,
            };
            docs.push(self.serialize_doc(key, doc, params, knn_score));
        }
        let total_hits = docs.len();

        // Local cut only; the coordinator re-sorts after the merge.
        match knn {
            Some((_, _, limit)) => {
                docs.sort_by(|l, r| {
                    l.knn_score.partial_cmp(&r.knn_score).unwrap_or(std::cmp::Ordering::Equal)
                });
                docs.truncate(limit);
            }
            None => {
                if let Some(sort) = &params.sort_option {
                    let order = sort.order;
                    docs.sort_by(|l, r| {
                        let ord = l.sort_score.cmp_natural(&r.sort_score);
                        match order {
                            SortOrder::Asc => ord,
                            SortOrder::Desc => ord.reverse(),
                        }
                    });
                }
                docs.truncate(params.limit_offset.saturating_add(params.limit_total));
            }
        }

        let profile = if algo.profiling_enabled() {
            let micros = start.elapsed().as_micros() as u64;
            Some(SearchProfile {
                events: vec![
                    ProfileEvent {
                        descr: "Search".to_string(),
                        depth: 0,
                        micros,
                        num_processed: total_hits,
                    },
                    ProfileEvent {
                        descr: algo.ast().describe(),
                        depth: 1,
                        micros,
                        num_processed: total_hits,
                    },
                ],
            })
        } else {
            None
        };

        SearchResult { total_hits, docs, error: None, profile }
    }

    /// Rows for the aggregation pipeline: every stored field, numbers
    /// coerced, keyed by the schema alias where one exists.
    pub fn search_for_aggregator(
        &self,
        documents: &HashMap<String, Document>,
        algo: &SearchAlgorithm,
    ) -> Vec<DocValues> {
        let mut rows = Vec::new();
        for key in &self.keys {
            let doc = match documents.get(key) {
                Some(doc) => doc,
                None => continue,
            };
            if !self.matches(doc, algo.ast()) {
                continue;
            }
            let mut row = DocValues::new();
            for (name, raw) in &doc.fields {
                let out_name = match self.base.schema.resolve(name) {
                    Some(ident) => self
                        .base
                        .schema
                        .field(ident)
                        .map(|f| f.short_name.clone())
                        .unwrap_or_else(|| name.clone()),
                    None => name.clone(),
                };
                row.insert(out_name, coerce_scalar(raw));
            }
            rows.push(row);
        }
        rows
    }

    fn matches(&self, doc: &Document, ast: &QueryAst) -> bool {
        match ast {
            QueryAst::MatchAll => true,
            QueryAst::Term { field: None, term } => {
                let needles = self.synonyms.expand(&term.to_lowercase());
                self.base.schema.iter().any(|(ident, field)| {
                    field.field_type == FieldType::Text
                        && !field.flags.noindex
                        && doc
                            .get(ident)
                            .map_or(false, |text| self.tokens_match(text, &needles))
                })
            }
            QueryAst::Term { field: Some(name), term } => {
                let ident = match self.base.schema.resolve(name) {
                    Some(ident) => ident,
                    None => return false,
                };
                let field = match self.base.schema.field(ident) {
                    Some(field) => field,
                    None => return false,
                };
                let raw = match doc.get(ident) {
                    Some(raw) => raw,
                    None => return false,
                };
                match field.field_type {
                    FieldType::Text => {
                        let needles = self.synonyms.expand(&term.to_lowercase());
                        self.tokens_match(raw, &needles)
                    }
                    FieldType::Tag => {
                        let tag_params = match &field.params {
                            FieldParams::Tag(params) => params,
                            _ => return false,
                        };
                        raw.split(tag_params.separator).map(str::trim).any(|tag| {
                            if tag_params.case_sensitive {
                                tag == term
                            } else {
                                tag.eq_ignore_ascii_case(term)
                            }
                        })
                    }
                    FieldType::Numeric => match (raw.parse::<f64>(), term.parse::<f64>()) {
                        (Ok(doc_value), Ok(query_value)) => doc_value == query_value,
                        _ => false,
                    },
                    FieldType::Vector => false,
                }
            }
            QueryAst::Knn { base, .. } => self.matches(doc, base),
        }
    }

    fn tokens_match(&self, text: &str, needles: &HashSet<String>) -> bool {
        tokenize(&self.base, text).iter().any(|token| needles.contains(token))
    }

    fn unknown_query_field<'a>(&self, ast: &'a QueryAst) -> Option<&'a str> {
        match ast {
            QueryAst::MatchAll | QueryAst::Term { field: None, .. } => None,
            QueryAst::Term { field: Some(name), .. } => {
                if self.base.schema.resolve(name).is_none() {
                    Some(name)
                } else {
                    None
                }
            }
            QueryAst::Knn { base, field, .. } => {
                if self.base.schema.resolve(field).is_none() {
                    return Some(field);
                }
                self.unknown_query_field(base)
            }
        }
    }

    fn knn_distance(
        &self,
        doc: &Document,
        field: &str,
        param: &str,
        algo: &SearchAlgorithm,
    ) -> Option<f64> {
        let ident = self.base.schema.resolve(field)?;
        let schema_field = self.base.schema.field(ident)?;
        let vector_params = match &schema_field.params {
            FieldParams::Vector(params) => params,
            _ => return None,
        };
        let query_vec = parse_vector(algo.params().get(param)?)?;
        let doc_vec = parse_vector(doc.get(ident)?)?;
        if query_vec.len() != vector_params.dim || doc_vec.len() != vector_params.dim {
            return None;
        }
        Some(vector_distance(vector_params.sim, &query_vec, &doc_vec))
    }

    fn serialize_doc(
        &self,
        key: &str,
        doc: &Document,
        params: &SearchParams,
        knn_score: f64,
    ) -> SerializedSearchDoc {
        let mut values = Vec::new();
        match params.selected_fields() {
            Some(fields) => {
                for reference in fields {
                    let ident =
                        self.base.schema.resolve(&reference.ident).unwrap_or(&reference.ident);
                    if let Some(raw) = doc.get(ident) {
                        values.push((
                            reference.output_name().to_string(),
                            self.typed_value(ident, raw),
                        ));
                    }
                }
            }
            None => {
                let mut names: Vec<&String> = doc.fields.keys().collect();
                names.sort();
                for name in names {
                    let raw = match doc.get(name) {
                        Some(raw) => raw,
                        None => continue,
                    };
                    let out_name = self
                        .base
                        .schema
                        .field(name)
                        .map(|f| f.short_name.clone())
                        .unwrap_or_else(|| name.clone());
                    values.push((out_name, self.typed_value(name, raw)));
                }
            }
        }

        let sort_score = params
            .sort_option
            .as_ref()
            .and_then(|sort| {
                let ident =
                    self.base.schema.resolve(&sort.field.ident).unwrap_or(&sort.field.ident);
                doc.get(ident).map(coerce_scalar)
            })
            .unwrap_or(SortableValue::Null);

        SerializedSearchDoc { key: key.to_string(), values, knn_score, sort_score }
    }

    /// Value as the reply presents it: numeric fields as doubles, everything
    /// else verbatim.
    fn typed_value(&self, ident: &str, raw: &str) -> SortableValue {
        match self.base.schema.field(ident) {
            Some(field) if field.field_type == FieldType::Numeric => {
                raw.parse::<f64>().map(SortableValue::Double).unwrap_or(SortableValue::Null)
            }
            _ => SortableValue::Text(raw.to_string()),
        }
    }
}

fn tokenize(base: &DocIndex, text: &str) -> Vec<String> {
    text.unicode_words()
        .map(str::to_lowercase)
        .filter(|word| !base.options.stopwords.iter().any(|s| s.eq_ignore_ascii_case(word)))
        .collect()
}

fn extract_text_terms(base: &DocIndex, doc: &Document) -> HashSet<String> {
    let mut terms = HashSet::new();
    for (ident, field) in base.schema.iter() {
        if field.field_type != FieldType::Text || field.flags.noindex {
            continue;
        }
        if let Some(text) = doc.get(ident) {
            terms.extend(tokenize(base, text));
        }
    }
    terms
}

/// Sort keys and aggregation values coerce numeric-looking strings.
fn coerce_scalar(raw: &str) -> SortableValue {
    match raw.parse::<f64>() {
        Ok(value) => SortableValue::Double(value),
        Err(_) => SortableValue::Text(raw.to_string()),
    }
}

fn parse_vector(raw: &str) -> Option<Vec<f32>> {
    raw.split(',').map(|part| part.trim().parse::<f32>().ok()).collect()
}

fn vector_distance(sim: VectorSimilarity, a: &[f32], b: &[f32]) -> f64 {
    let dot = || a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum::<f64>();
    match sim {
        VectorSimilarity::L2 => a
            .iter()
            .zip(b)
            .map(|(x, y)| {
                let d = (*x as f64) - (*y as f64);
                d * d
            })
            .sum::<f64>()
            .sqrt(),
        VectorSimilarity::Ip => 1.0 - dot(),
        VectorSimilarity::Cosine => {
            let norm_a = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
            let norm_b = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                1.0
            } else {
                1.0 - dot() / (norm_a * norm_b)
            }
        }
    }
}
