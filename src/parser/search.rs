use crate::core::error::{Error, Result};
use crate::core::types::SortOrder;
use crate::parser::args::ArgParser;
use crate::query::QueryParams;
use crate::search::params::{FieldReference, SearchParams, SortOption};

/// Strip the optional leading `@` from a field reference.
pub fn parse_field<'a>(parser: &mut ArgParser<'a>) -> &'a str {
    let field = parser.next();
    field.strip_prefix('@').unwrap_or(field)
}

/// `<count> (<field> [AS <alias>])*`. A count larger than the remaining
/// arguments is tolerated: fields are parsed up to what is available.
pub fn parse_load_or_return_fields(parser: &mut ArgParser, is_load: bool) -> Vec<FieldReference> {
    let mut fields = Vec::new();
    let mut num: usize = parser.next_parsed();

    while parser.has_next() && num > 0 {
        let field = if is_load { parse_field(parser) } else { parser.next() };
        let mut alias = "";
        if parser.check("AS") {
            alias = parser.next();
        }
        fields.push(FieldReference::new(field, alias));
        num -= 1;
    }
    fields
}

/// `PARAMS <count> (<name> <value>)*`
pub fn parse_query_params(parser: &mut ArgParser) -> QueryParams {
    let mut params = QueryParams::default();
    let num_args: usize = parser.next_parsed();
    while parser.has_next() && params.len() * 2 < num_args {
        let key = parser.next().to_string();
        let value = parser.next().to_string();
        params.insert(key, value);
    }
    params
}

/// Search clauses after `<index> <query>`. Unknown tokens are skipped by one
/// (legacy leniency — AGGREGATE is strict, SEARCH is not).
pub fn parse_search_params(parser: &mut ArgParser) -> Result<SearchParams> {
    let mut params = SearchParams::default();

    while parser.has_next() {
        if parser.check("LIMIT") {
            params.limit_offset = parser.next_parsed();
            params.limit_total = parser.next_parsed();
        } else if parser.check("LOAD") {
            if params.return_fields.is_some() {
                return Err(Error::syntax("LOAD cannot be applied after RETURN"));
            }
            params.load_fields = Some(parse_load_or_return_fields(parser, true));
        } else if parser.check("RETURN") {
            if params.load_fields.is_some() {
                return Err(Error::syntax("RETURN cannot be applied after LOAD"));
            }
            // After NOCONTENT the clause is silently ignored; its tokens fall
            // through to the unknown-token skip below.
            if params.return_fields.is_none() {
                params.return_fields = Some(parse_load_or_return_fields(parser, false));
            }
        } else if parser.check("NOCONTENT") {
            params.return_fields = Some(Vec::new());
        } else if parser.check("PARAMS") {
            params.query_params = parse_query_params(parser);
        } else if parser.check("SORTBY") {
            let field = FieldReference::new(parse_field(parser), "");
            let order = if parser.check("DESC") { SortOrder::Desc } else { SortOrder::Asc };
            params.sort_option = Some(SortOption { field, order });
        } else {
            parser.skip(1);
        }
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn parse(tokens: &[&str]) -> Result<SearchParams> {
        let argv = args(tokens);
        let mut parser = ArgParser::new(&argv);
        let params = parse_search_params(&mut parser)?;
        match parser.take_error() {
            Some(err) => Err(err),
            None => Ok(params),
        }
    }

    #[test]
    fn defaults_are_offset_zero_total_ten() {
        let params = parse(&[]).unwrap();
        assert_eq!(params.limit_offset, 0);
        assert_eq!(params.limit_total, 10);
    }

    #[test]
    fn limit_load_params_sortby() {
        let params = parse(&[
            "LIMIT", "5", "20", "LOAD", "2", "@a", "$.b", "AS", "b", "PARAMS", "2", "vec", "xyz",
            "SORTBY", "price", "DESC",
        ])
        .unwrap();

        assert_eq!(params.limit_offset, 5);
        assert_eq!(params.limit_total, 20);
        let load = params.load_fields.as_ref().unwrap();
        assert_eq!(load[0], FieldReference::new("a", ""));
        assert_eq!(load[1], FieldReference::new("$.b", "b"));
        assert_eq!(params.query_params.get("vec"), Some("xyz"));
        let sort = params.sort_option.as_ref().unwrap();
        assert_eq!(sort.field.ident, "price");
        assert_eq!(sort.order, SortOrder::Desc);
    }

    #[test]
    fn load_after_return_is_an_error() {
        let err = parse(&["RETURN", "1", "a", "LOAD", "1", "b"]).unwrap_err();
        assert_eq!(err.to_string(), "LOAD cannot be applied after RETURN");
    }

    #[test]
    fn return_after_load_is_an_error() {
        let err = parse(&["LOAD", "1", "a", "RETURN", "1", "b"]).unwrap_err();
        assert_eq!(err.to_string(), "RETURN cannot be applied after LOAD");
    }

    #[test]
    fn return_after_nocontent_is_silently_ignored() {
        let params = parse(&["NOCONTENT", "RETURN", "1", "a"]).unwrap();
        assert!(params.ids_only());
    }

    #[test]
    fn load_count_larger_than_remaining_args_is_tolerated() {
        let params = parse(&["LOAD", "5", "a", "b"]).unwrap();
        assert_eq!(params.load_fields.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let params = parse(&["WITHSCORES", "LIMIT", "0", "3"]).unwrap();
        assert_eq!(params.limit_total, 3);
    }
}
