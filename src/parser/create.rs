use tracing::warn;

use crate::core::error::{Error, Result};
use crate::parser::args::ArgParser;
use crate::schema::{
    is_valid_json_path, DocIndex, FieldFlags, FieldParams, FieldType, IndexKind, NumericParams,
    SchemaField, TagParams, TextParams, VectorParams, VectorSimilarity,
};

// Accepted for compatibility, not indexed any differently.
const IGNORED_OPTIONS: [&str; 4] = ["UNF", "NOSTEM", "INDEXMISSING", "INDEXEMPTY"];
const IGNORED_OPTIONS_WITH_ARG: [&str; 2] = ["WEIGHT", "PHONETIC"];

/// `[ON HASH|JSON] [PREFIX 1 p] [STOPWORDS n w...] SCHEMA field-spec...`
///
/// Clause order is free until SCHEMA, which is terminal. Unknown top-level
/// options are skipped by one token (legacy leniency).
pub fn parse_create_params(parser: &mut ArgParser) -> Result<DocIndex> {
    let mut index = DocIndex::default();

    while parser.has_next() {
        if parser.check("ON") {
            if let Some(kind) =
                parser.map_next(&[("HASH", IndexKind::Hash), ("JSON", IndexKind::Json)])
            {
                index.kind = kind;
            }
        } else if parser.check("PREFIX") {
            if !parser.check("1") {
                return Err(Error::syntax("Multiple prefixes are not supported"));
            }
            index.prefix = parser.next().to_string();
        } else if parser.check("STOPWORDS") {
            index.options.stopwords.clear();
            let mut num: usize = parser.next_parsed();
            while num > 0 && parser.has_next() {
                index.options.stopwords.insert(parser.next().to_string());
                num -= 1;
            }
            if num > 0 {
                parser.next(); // records the missing-argument error
            }
        } else if parser.check("SCHEMA") {
            parse_schema(parser, &mut index)?;
            break;
        } else {
            parser.skip(1);
        }
    }

    Ok(index)
}

/// `(<ident> [AS <alias>] <TAG|TEXT|NUMERIC|VECTOR> <type-params> <flags>*)+`
///
/// Also used by ALTER ... SCHEMA ADD, which parses into a fresh definition
/// carrying the existing index kind.
pub fn parse_schema(parser: &mut ArgParser, index: &mut DocIndex) -> Result<()> {
    if !parser.has_next() {
        return Err(Error::syntax("Fields arguments are missing"));
    }

    while parser.has_next() {
        let ident = parser.next().to_string();

        if index.kind == IndexKind::Json && !is_valid_json_path(&ident) {
            return Err(Error::syntax(format!("Bad json path: {}", ident)));
        }

        let mut alias = ident.clone();
        if parser.check("AS") {
            alias = parser.next().to_string();
        }

        if index.schema.contains_alias(&alias) {
            return Err(Error::syntax(format!("Duplicate field in schema - {}", alias)));
        }

        let type_tok = parser.next();
        let (field_type, params) = if type_tok.eq_ignore_ascii_case("TAG") {
            (FieldType::Tag, FieldParams::Tag(parse_tag_params(parser)?))
        } else if type_tok.eq_ignore_ascii_case("TEXT") {
            (FieldType::Text, FieldParams::Text(parse_text_params(parser)))
        } else if type_tok.eq_ignore_ascii_case("NUMERIC") {
            (FieldType::Numeric, FieldParams::Numeric(parse_numeric_params(parser)))
        } else if type_tok.eq_ignore_ascii_case("VECTOR") {
            (FieldType::Vector, FieldParams::Vector(parse_vector_params(parser)?))
        } else {
            return Err(Error::syntax(format!("Field type {} is not supported", type_tok)));
        };

        let mut flags = FieldFlags::default();
        loop {
            if parser.check("NOINDEX") {
                flags.noindex = true;
                continue;
            }
            if parser.check("SORTABLE") {
                flags.sortable = true;
                continue;
            }

            let option = parser.peek();
            if IGNORED_OPTIONS.iter().any(|o| option.eq_ignore_ascii_case(o)) {
                if !option.eq_ignore_ascii_case("INDEXMISSING")
                    && !option.eq_ignore_ascii_case("INDEXEMPTY")
                {
                    warn!("Ignoring unsupported field option in FT.CREATE: {}", option);
                }
                parser.skip(1);
                continue;
            }
            if IGNORED_OPTIONS_WITH_ARG.iter().any(|o| option.eq_ignore_ascii_case(o)) {
                warn!("Ignoring unsupported field option in FT.CREATE: {}", option);
                parser.skip(2);
                continue;
            }
            break;
        }

        index.schema.insert(ident, SchemaField { field_type, flags, short_name: alias, params });
    }

    Ok(())
}

// Tag fields: [SEPARATOR char] [CASESENSITIVE] [WITHSUFFIXTRIE]
fn parse_tag_params(parser: &mut ArgParser) -> Result<TagParams> {
    let mut params = TagParams::default();
    while parser.has_next() {
        if parser.check("SEPARATOR") {
            let separator = parser.next();
            let mut chars = separator.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => params.separator = c,
                _ => {
                    return Err(Error::syntax(format!(
                        "Tag separator must be a single character. Got `{}`",
                        separator
                    )))
                }
            }
            continue;
        }
        if parser.check("CASESENSITIVE") {
            params.case_sensitive = true;
            continue;
        }
        if parser.check("WITHSUFFIXTRIE") {
            params.with_suffixtrie = true;
            continue;
        }
        break;
    }
    Ok(params)
}

fn parse_text_params(parser: &mut ArgParser) -> TextParams {
    TextParams { with_suffixtrie: parser.check("WITHSUFFIXTRIE") }
}

fn parse_numeric_params(parser: &mut ArgParser) -> NumericParams {
    let mut params = NumericParams::default();
    if parser.check("BLOCKSIZE") {
        params.block_size = parser.next_parsed();
    }
    params
}

// Vector fields: {HNSW|FLAT} num_args (key value)...
fn parse_vector_params(parser: &mut ArgParser) -> Result<VectorParams> {
    let mut params = VectorParams::default();

    if let Some(use_hnsw) = parser.map_next(&[("HNSW", true), ("FLAT", false)]) {
        params.use_hnsw = use_hnsw;
    }
    let num_args: usize = parser.next_parsed();

    let mut consumed = 0;
    while parser.has_next() && consumed * 2 < num_args {
        if parser.check("DIM") {
            params.dim = parser.next_parsed();
        } else if parser.check("DISTANCE_METRIC") {
            if let Some(sim) = parser.map_next(&[
                ("L2", VectorSimilarity::L2),
                ("IP", VectorSimilarity::Ip),
                ("COSINE", VectorSimilarity::Cosine),
            ]) {
                params.sim = sim;
            }
        } else if parser.check("INITIAL_CAP") {
            params.capacity = parser.next_parsed();
        } else if parser.check("M") {
            params.hnsw_m = parser.next_parsed();
        } else if parser.check("EF_CONSTRUCTION") {
            params.hnsw_ef_construction = parser.next_parsed();
        } else if parser.check("EF_RUNTIME") {
            parser.next_parsed::<usize>();
            warn!("EF_RUNTIME not supported");
        } else if parser.check("EPSILON") {
            parser.next_parsed::<f64>();
            warn!("EPSILON not supported");
        } else {
            parser.skip(2);
        }
        consumed += 1;
    }

    if parser.error().is_some() {
        return Err(Error::syntax("Parse error of vector parameters"));
    }
    if params.dim == 0 {
        return Err(Error::syntax("Knn vector dimension cannot be zero"));
    }
    Ok(params)
}
