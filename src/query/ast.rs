/// Algebraic form of a query string. Deliberately small: the full query
/// language (boolean composition, ranges, fuzzy matching) is an external
/// collaborator; this covers the shapes the command layer is exercised with.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryAst {
    MatchAll,
    /// Bare term, or `@field:term` when a field is given.
    Term { field: Option<String>, term: String },
    /// `<base> =>[KNN <k> @field $param [AS alias]]`
    Knn {
        base: Box<QueryAst>,
        limit: usize,
        field: String,
        param: String,
        score_alias: Option<String>,
    },
}

impl Default for QueryAst {
    fn default() -> Self {
        QueryAst::MatchAll
    }
}

impl QueryAst {
    /// Short operator name used in profiling output.
    pub fn describe(&self) -> String {
        match self {
            QueryAst::MatchAll => "MatchAll".to_string(),
            QueryAst::Term { field: Some(f), term } => format!("Term{{@{}:{}}}", f, term),
            QueryAst::Term { field: None, term } => format!("Term{{{}}}", term),
            QueryAst::Knn { limit, field, .. } => format!("Knn{{{} @{}}}", limit, field),
        }
    }
}
