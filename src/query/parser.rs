use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while1};
use nom::character::complete::{char, digit1, multispace0, multispace1};
use nom::combinator::{all_consuming, map, map_res, opt};
use nom::sequence::{delimited, preceded, separated_pair, tuple};
use nom::IResult;

use crate::query::ast::QueryAst;

fn ident(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.' || c == '$')(input)
}

fn term_text(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')(input)
}

fn match_all(input: &str) -> IResult<&str, QueryAst> {
    map(char('*'), |_| QueryAst::MatchAll)(input)
}

fn field_term(input: &str) -> IResult<&str, QueryAst> {
    map(
        separated_pair(preceded(char('@'), ident), char(':'), term_text),
        |(field, term)| QueryAst::Term { field: Some(field.to_string()), term: term.to_string() },
    )(input)
}

fn bare_term(input: &str) -> IResult<&str, QueryAst> {
    map(term_text, |term| QueryAst::Term { field: None, term: term.to_string() })(input)
}

fn base_query(input: &str) -> IResult<&str, QueryAst> {
    alt((match_all, field_term, bare_term))(input)
}

struct KnnClause {
    limit: usize,
    field: String,
    param: String,
    score_alias: Option<String>,
}

fn knn_clause(input: &str) -> IResult<&str, KnnClause> {
    let inner = tuple((
        tag_no_case("KNN"),
        preceded(multispace1, map_res(digit1, str::parse::<usize>)),
        preceded(multispace1, preceded(char('@'), ident)),
        preceded(multispace1, preceded(char('$'), ident)),
        opt(preceded(
            tuple((multispace1, tag_no_case("AS"), multispace1)),
            ident,
        )),
        multispace0,
    ));
    map(
        delimited(char('['), preceded(multispace0, inner), char(']')),
        |(_, limit, field, param, alias, _)| KnnClause {
            limit,
            field: field.to_string(),
            param: param.to_string(),
            score_alias: alias.map(str::to_string),
        },
    )(input)
}

fn query(input: &str) -> IResult<&str, QueryAst> {
    let knn_suffix = preceded(tuple((multispace0, tag("=>"), multispace0)), knn_clause);
    map(tuple((base_query, opt(knn_suffix))), |(base, knn)| match knn {
        Some(clause) => QueryAst::Knn {
            base: Box::new(base),
            limit: clause.limit,
            field: clause.field,
            param: clause.param,
            score_alias: clause.score_alias,
        },
        None => base,
    })(input)
}

/// Parse a query string into its algebraic tree; `None` on syntax errors.
pub fn parse_query(input: &str) -> Option<QueryAst> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    all_consuming(query)(trimmed).ok().map(|(_, ast)| ast)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_is_match_all() {
        assert_eq!(parse_query("*"), Some(QueryAst::MatchAll));
    }

    #[test]
    fn bare_and_field_terms() {
        assert_eq!(
            parse_query("hello"),
            Some(QueryAst::Term { field: None, term: "hello".into() })
        );
        assert_eq!(
            parse_query("@title:rust"),
            Some(QueryAst::Term { field: Some("title".into()), term: "rust".into() })
        );
    }

    #[test]
    fn knn_wraps_its_base() {
        let ast = parse_query("* =>[KNN 10 @vec $blob AS score]").unwrap();
        match ast {
            QueryAst::Knn { base, limit, field, param, score_alias } => {
                assert_eq!(*base, QueryAst::MatchAll);
                assert_eq!(limit, 10);
                assert_eq!(field, "vec");
                assert_eq!(param, "blob");
                assert_eq!(score_alias.as_deref(), Some("score"));
            }
            other => panic!("expected knn, got {:?}", other),
        }
    }

    #[test]
    fn malformed_queries_are_rejected() {
        assert_eq!(parse_query(""), None);
        assert_eq!(parse_query("@title:"), None);
        assert_eq!(parse_query("*=>[KNN ten @v $p]"), None);
        assert_eq!(parse_query("* trailing garbage !"), None);
    }
}
