use crate::aggregate::{AggregateParams, Reducer, ReducerFunc, SortParams, Step};
use crate::core::error::{Error, Result};
use crate::core::types::SortOrder;
use crate::parser::args::ArgParser;
use crate::parser::search::{parse_field, parse_load_or_return_fields, parse_query_params};

/// Field reference that must carry a leading `@` while the legacy-reject
/// switch is on; with it off the bare name is accepted.
fn parse_field_with_atsign<'a>(parser: &mut ArgParser<'a>, reject_legacy: bool) -> Option<&'a str> {
    let field = parser.next();
    match field.strip_prefix('@') {
        Some(stripped) => Some(stripped),
        None if reject_legacy => None,
        None => Some(field),
    }
}

/// `SORTBY <n> (<field> [ASC|DESC])* [MAX <n>]` — n counts strings, and the
/// clause must consume exactly that many.
fn parse_sort_params(parser: &mut ArgParser, reject_legacy: bool) -> Result<SortParams> {
    let mut strings_num: usize = parser.next_parsed();

    let mut sort_params = SortParams::default();
    sort_params.fields.reserve(strings_num / 2);

    while parser.has_next() && strings_num > 0 {
        let potential_field = parser.peek().to_string();
        let field = match parse_field_with_atsign(parser, reject_legacy) {
            Some(field) => field.to_string(),
            None => {
                return Err(Error::syntax(format!(
                    "SORTBY field name '{}' must start with '@'",
                    potential_field
                )))
            }
        };
        strings_num -= 1;

        let mut order = SortOrder::Asc;
        if strings_num > 0 {
            if let Some(parsed) =
                parser.try_map_next(&[("ASC", SortOrder::Asc), ("DESC", SortOrder::Desc)])
            {
                order = parsed;
                strings_num -= 1;
            }
        }

        sort_params.fields.push((field, order));
    }

    if strings_num > 0 {
        return Err(Error::syntax("bad arguments for SORTBY: specified invalid number of strings"));
    }

    if parser.check("MAX") {
        sort_params.max = Some(parser.next_parsed());
    }

    Ok(sort_params)
}

/// `<index> <query> LOAD* (GROUPBY|SORTBY|LIMIT|PARAMS)*`. Unlike SEARCH,
/// unknown clauses are hard errors.
pub fn parse_aggregate_params(
    parser: &mut ArgParser,
    reject_legacy: bool,
) -> Result<AggregateParams> {
    let mut params = AggregateParams::default();
    params.index = parser.next().to_string();
    params.query = parser.next().to_string();

    // LOAD clauses only precede the pipeline; repeated clauses accumulate.
    while parser.has_next() && parser.check("LOAD") {
        let fields = parse_load_or_return_fields(parser, true);
        match &mut params.load_fields {
            Some(existing) => existing.extend(fields),
            None => params.load_fields = Some(fields),
        }
    }

    while parser.has_next() {
        if parser.check("GROUPBY") {
            let num_fields: usize = parser.next_parsed();
            let mut fields = Vec::with_capacity(num_fields.min(16));
            let mut remaining = num_fields;
            while parser.has_next() && remaining > 0 {
                match parse_field_with_atsign(parser, reject_legacy) {
                    Some(field) => fields.push(field.to_string()),
                    None => {
                        return Err(Error::syntax(
                            "bad arguments: Field name should start with '@'",
                        ))
                    }
                }
                remaining -= 1;
            }

            let mut reducers = Vec::new();
            while parser.check("REDUCE") {
                let func_tok = parser.next();
                let func = match ReducerFunc::from_name(func_tok) {
                    Some(func) => func,
                    None => {
                        return Err(Error::syntax(format!(
                            "reducer function {} not found",
                            func_tok
                        )))
                    }
                };

                let nargs: usize = parser.next_parsed();
                let mut source = String::new();
                if nargs > 0 {
                    source = parse_field(parser).to_string();
                }

                parser.expect_tag("AS");
                let result_field = parser.next().to_string();

                reducers.push(Reducer { source, result_field, func });
            }

            params.steps.push(Step::Group { fields, reducers });
            continue;
        }

        if parser.check("SORTBY") {
            let sort_params = parse_sort_params(parser, reject_legacy)?;
            params.steps.push(Step::Sort(sort_params));
            continue;
        }

        if parser.check("LIMIT") {
            let offset = parser.next_parsed();
            let num = parser.next_parsed();
            params.steps.push(Step::Limit { offset, num });
            continue;
        }

        if parser.check("PARAMS") {
            params.params = parse_query_params(parser);
            continue;
        }

        if parser.check("LOAD") {
            return Err(Error::syntax("LOAD cannot be applied after projectors or reducers"));
        }

        return Err(Error::syntax(format!("Unknown clause: {}", parser.peek())));
    }

    Ok(params)
}
