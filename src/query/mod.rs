pub mod ast;
pub mod parser;

use std::collections::HashMap;
use std::sync::Once;

pub use ast::QueryAst;

/// `PARAMS` map attached to a query, consumed by the query language
/// (vector blobs, placeholder values).
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    map: HashMap<String, String>,
}

impl QueryParams {
    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Directive produced when the query contains a vector-similarity clause:
/// cap the merged result at `limit` and optionally project the score under
/// the alias.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnScoreSortOption {
    pub score_field_alias: String,
    pub limit: usize,
}

/// Compiled query handed to every shard evaluator. Wraps the parsed algebraic
/// tree; the full query language lives outside this crate.
#[derive(Debug, Clone, Default)]
pub struct SearchAlgorithm {
    ast: QueryAst,
    params: QueryParams,
    profiling: bool,
}

impl SearchAlgorithm {
    /// Parse the query string. Returns false on a syntax error, leaving the
    /// algorithm unusable.
    pub fn init(&mut self, query: &str, params: &QueryParams) -> bool {
        match parser::parse_query(query) {
            Some(ast) => {
                self.ast = ast;
                self.params = params.clone();
                true
            }
            None => false,
        }
    }

    pub fn enable_profiling(&mut self) {
        self.profiling = true;
    }

    pub fn profiling_enabled(&self) -> bool {
        self.profiling
    }

    pub fn ast(&self) -> &QueryAst {
        &self.ast
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    pub fn knn_score_sort_option(&self) -> Option<KnnScoreSortOption> {
        match &self.ast {
            QueryAst::Knn { limit, field, score_alias, .. } => Some(KnnScoreSortOption {
                score_field_alias: score_alias
                    .clone()
                    .unwrap_or_else(|| format!("__{}_score", field)),
                limit: *limit,
            }),
            _ => None,
        }
    }
}

static WARMUP: Once = Once::new();

/// One-shot parser initialization, run on the first CREATE of a process
/// lifetime to avoid a first-call latency cliff.
pub fn warmup_query_parser() {
    WARMUP.call_once(|| {
        let _ = parser::parse_query("");
    });
}
