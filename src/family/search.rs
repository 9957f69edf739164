use std::sync::Arc;
use std::time::Instant;

use crate::aggregate::{self, DocValues};
use crate::core::error::{Error, Result};
use crate::family::{surface, SearchFamily};
use crate::parser::aggregate::parse_aggregate_params;
use crate::parser::args::ArgParser;
use crate::parser::search::parse_search_params;
use crate::query::SearchAlgorithm;
use crate::reply::Reply;
use crate::search::merge::build_search_reply;
use crate::search::params::{ProfileEvent, SearchResult};

impl SearchFamily {
    pub fn ft_search(&self, args: &[String]) -> Result<Reply> {
        let mut parser = ArgParser::new(args);
        let index_name = parser.next().to_string();
        let query_str = parser.next().to_string();
        let params = surface(parse_search_params(&mut parser), &mut parser)?;

        let mut algo = SearchAlgorithm::default();
        if !algo.init(&query_str, &params.query_params) {
            return Err(Error::query("Query syntax error"));
        }

        // The coordinator owns no shard, so index existence is only known
        // after the hop.
        let params = Arc::new(params);
        let algo = Arc::new(algo);
        let results: Vec<Option<SearchResult>> = {
            let name = index_name.clone();
            let params = params.clone();
            let algo = algo.clone();
            self.shards().gather(move |shard| shard.search(&name, &params, &algo))
        };

        let missing = results.iter().filter(|result| result.is_none()).count();
        debug_assert!(missing == 0 || missing == self.shards().size());
        if missing == self.shards().size() {
            return Err(Error::not_found(format!("{}: no such index", index_name)));
        }

        let results: Vec<SearchResult> = results.into_iter().flatten().collect();
        for result in &results {
            if let Some(err) = &result.error {
                return Err(Error::shard(err.clone()));
            }
        }

        Ok(build_search_reply(&params, algo.knn_score_sort_option().as_ref(), results))
    }

    pub fn ft_aggregate(&self, args: &[String]) -> Result<Reply> {
        let mut parser = ArgParser::new(args);
        let reject_legacy = self.config.reject_legacy_field;
        let params = surface(parse_aggregate_params(&mut parser, reject_legacy), &mut parser)?;

        let mut algo = SearchAlgorithm::default();
        if !algo.init(&params.query, &params.params) {
            return Err(Error::query("Query syntax error"));
        }

        let algo = Arc::new(algo);
        let shard_rows: Vec<Option<Vec<DocValues>>> = {
            let name = params.index.clone();
            let algo = algo.clone();
            self.shards().gather(move |shard| shard.search_for_aggregator(&name, &algo))
        };
        let values: Vec<DocValues> = shard_rows.into_iter().flatten().flatten().collect();

        let load_fields: Vec<String> = params
            .load_fields
            .as_ref()
            .map(|fields| fields.iter().map(|f| f.output_name().to_string()).collect())
            .unwrap_or_default();

        let agg_results = aggregate::process(values, &load_fields, &params.steps);

        let mut out = Vec::with_capacity(agg_results.values.len() + 1);
        out.push(Reply::Long(agg_results.values.len() as i64));
        for row in &agg_results.values {
            let mut pairs = Vec::new();
            for field in &agg_results.fields_to_print {
                if let Some(value) = row.get(field) {
                    pairs.push(Reply::bulk(field.clone()));
                    pairs.push(Reply::from(value));
                }
            }
            out.push(Reply::Array(pairs));
        }
        Ok(Reply::Array(out))
    }

    pub fn ft_profile(&self, args: &[String]) -> Result<Reply> {
        let mut parser = ArgParser::new(args);
        let index_name = parser.next().to_string();

        if !parser.check("SEARCH") {
            if parser.check("AGGREGATE") {
                // Accepted by the grammar, rejected deliberately: the reply
                // shape for a profiled aggregation is not defined.
                return Err(Error::syntax("FT.PROFILE does not support AGGREGATE"));
            }
            return Err(Error::syntax("no `SEARCH` or `AGGREGATE` provided"));
        }

        parser.check("LIMITED"); // accepted, profiling is never limited
        parser.expect_tag("QUERY");
        let query_str = parser.next().to_string();
        let params = surface(parse_search_params(&mut parser), &mut parser)?;

        let mut algo = SearchAlgorithm::default();
        if !algo.init(&query_str, &params.query_params) {
            return Err(Error::query("query syntax error"));
        }
        algo.enable_profiling();

        let start = Instant::now();
        let params = Arc::new(params);
        let algo = Arc::new(algo);
        let outputs: Vec<Option<(SearchResult, u64)>> = {
            let name = index_name.clone();
            let params = params.clone();
            let algo = algo.clone();
            self.shards().gather(move |shard| {
                let shard_start = Instant::now();
                shard
                    .search(&name, &params, &algo)
                    .map(|result| (result, shard_start.elapsed().as_micros() as u64))
            })
        };

        let missing = outputs.iter().filter(|output| output.is_none()).count();
        debug_assert!(missing == 0 || missing == self.shards().size());
        if missing == self.shards().size() {
            return Err(Error::not_found(format!("{}: no such index", index_name)));
        }

        let took = start.elapsed().as_micros() as u64;

        let mut search_results = Vec::new();
        let mut shard_profiles = Vec::new();
        for (mut result, micros) in outputs.into_iter().flatten() {
            shard_profiles.push((micros, result.profile.take(), result.error.is_some()));
            search_results.push(result);
        }

        let mut result_is_empty = false;
        let mut total_docs = 0usize;
        let mut total_serialized = 0usize;
        for result in &search_results {
            if result.error.is_none() {
                total_docs += result.total_hits;
                total_serialized += result.docs.len();
            } else {
                result_is_empty = true;
            }
        }

        // First element: the search reply. Second element: profile info.
        let search_reply = if result_is_empty {
            Reply::Array(vec![Reply::Long(0)])
        } else {
            build_search_reply(&params, algo.knn_score_sort_option().as_ref(), search_results)
        };

        let mut profile_section = Vec::with_capacity(shard_profiles.len() + 1);
        profile_section.push(Reply::Map(vec![
            (Reply::bulk("took"), Reply::Long(took as i64)),
            (Reply::bulk("hits"), Reply::Long(total_docs as i64)),
            (Reply::bulk("serialized"), Reply::Long(total_serialized as i64)),
        ]));

        for (micros, profile, had_error) in shard_profiles {
            let tree = match profile {
                Some(profile) if !had_error && !profile.events.is_empty() => {
                    build_profile_tree(&profile.events)
                }
                _ => Reply::Array(Vec::new()),
            };
            profile_section.push(Reply::Map(vec![
                (Reply::bulk("took"), Reply::Long(micros as i64)),
                (Reply::bulk("tree"), tree),
            ]));
        }

        Ok(Reply::Array(vec![search_reply, Reply::Array(profile_section)]))
    }
}

/// Rebuild the event tree from the flat pre-order event list: children are
/// contiguous after their parent with depth parent+1, a subtree ends at the
/// next same-depth sibling.
pub(crate) fn build_profile_tree(events: &[ProfileEvent]) -> Reply {
    let (node, _) = profile_node(events, 0);
    node
}

fn profile_node(events: &[ProfileEvent], start: usize) -> (Reply, usize) {
    let event = &events[start];
    let mut children = Vec::new();
    let mut children_micros = 0u64;

    let mut next = start + 1;
    while next < events.len() && events[next].depth == event.depth + 1 {
        children_micros += events[next].micros;
        let (child, after) = profile_node(events, next);
        children.push(child);
        next = after;
    }

    let mut map = vec![
        (Reply::simple("total_time"), Reply::Long(event.micros as i64)),
        (Reply::simple("operation"), Reply::simple(event.descr.clone())),
        (
            Reply::simple("self_time"),
            Reply::Long(event.micros.saturating_sub(children_micros) as i64),
        ),
        (Reply::simple("processed"), Reply::Long(event.num_processed as i64)),
    ];
    if !children.is_empty() {
        map.push((Reply::simple("children"), Reply::Array(children)));
    }
    (Reply::Map(map), next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::family::CommandContext;
    use std::collections::HashMap;

    fn family() -> SearchFamily {
        SearchFamily::new(Config { num_shards: 2, ..Default::default() }).unwrap()
    }

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn create(family: &SearchFamily, spec: &[&str]) {
        family.ft_create(&CommandContext::default(), &args(spec)).unwrap();
    }

    fn insert(family: &SearchFamily, key: &str, pairs: &[(&str, &str)]) {
        let fields: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        family.insert_document(key, fields);
    }

    #[test]
    fn search_on_empty_index_returns_zero_total() {
        let family = family();
        create(&family, &["idx", "SCHEMA", "f", "TEXT"]);
        let reply = family
            .ft_search(&args(&["idx", "*", "LIMIT", "0", "10", "NOCONTENT"]))
            .unwrap();
        assert_eq!(reply, Reply::Array(vec![Reply::Long(0)]));
    }

    #[test]
    fn search_unknown_index() {
        let family = family();
        let err = family.ft_search(&args(&["nope", "*"])).unwrap_err();
        assert_eq!(err.to_string(), "nope: no such index");
    }

    #[test]
    fn search_bad_query_string() {
        let family = family();
        create(&family, &["idx", "SCHEMA", "f", "TEXT"]);
        let err = family.ft_search(&args(&["idx", "=>["])).unwrap_err();
        assert_eq!(err.to_string(), "Query syntax error");
    }

    #[test]
    fn search_merges_and_limits_across_shards() {
        let family = family();
        create(&family, &["idx", "PREFIX", "1", "d:", "SCHEMA", "body", "TEXT", "n", "NUMERIC"]);
        for i in 0..6 {
            insert(&family, &format!("d:{}", i), &[("body", "hello world"), ("n", &i.to_string())]);
        }

        let reply = family
            .ft_search(&args(&["idx", "hello", "LIMIT", "0", "4", "NOCONTENT"]))
            .unwrap();
        match reply {
            Reply::Array(items) => {
                assert_eq!(items[0], Reply::Long(6));
                assert_eq!(items.len(), 5);
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn search_sortby_orders_across_shards() {
        let family = family();
        create(&family, &["idx", "PREFIX", "1", "d:", "SCHEMA", "body", "TEXT", "n", "NUMERIC", "SORTABLE"]);
        for i in 0..5 {
            insert(&family, &format!("d:{}", i), &[("body", "x"), ("n", &i.to_string())]);
        }

        let reply = family
            .ft_search(&args(&["idx", "*", "SORTBY", "n", "DESC", "NOCONTENT"]))
            .unwrap();
        match reply {
            Reply::Array(items) => {
                assert_eq!(items[0], Reply::Long(5));
                assert_eq!(items[1], Reply::bulk("d:4"));
                assert_eq!(items[5], Reply::bulk("d:0"));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn knn_reply_order_is_nondecreasing_in_score() {
        let family = family();
        create(&family, &[
            "idx", "PREFIX", "1", "v:", "SCHEMA", "vec", "VECTOR", "FLAT", "4", "DIM", "2",
            "DISTANCE_METRIC", "L2",
        ]);
        insert(&family, "v:far", &[("vec", "10.0,10.0")]);
        insert(&family, "v:near", &[("vec", "0.1,0.0")]);
        insert(&family, "v:mid", &[("vec", "1.0,1.0")]);

        let reply = family
            .ft_search(&args(&[
                "idx", "*=>[KNN 3 @vec $q]", "PARAMS", "2", "q", "0.0,0.0", "NOCONTENT",
            ]))
            .unwrap();
        match reply {
            Reply::Array(items) => {
                assert_eq!(items[0], Reply::Long(3));
                assert_eq!(items[1], Reply::bulk("v:near"));
                assert_eq!(items[2], Reply::bulk("v:mid"));
                assert_eq!(items[3], Reply::bulk("v:far"));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn aggregate_group_count_sort_limit() {
        let family = family();
        create(&family, &["idx", "PREFIX", "1", "c:", "SCHEMA", "city", "TAG"]);
        insert(&family, "c:1", &[("city", "A")]);
        insert(&family, "c:2", &[("city", "A")]);
        insert(&family, "c:3", &[("city", "B")]);

        let reply = family
            .ft_aggregate(&args(&[
                "idx", "*", "GROUPBY", "1", "@city", "REDUCE", "COUNT", "0", "AS", "n", "SORTBY",
                "2", "@n", "DESC", "LIMIT", "0", "5",
            ]))
            .unwrap();
        match reply {
            Reply::Array(items) => {
                assert_eq!(items[0], Reply::Long(2));
                assert_eq!(
                    items[1],
                    Reply::Array(vec![
                        Reply::bulk("city"),
                        Reply::bulk("A"),
                        Reply::bulk("n"),
                        Reply::Double(2.0),
                    ])
                );
                assert_eq!(
                    items[2],
                    Reply::Array(vec![
                        Reply::bulk("city"),
                        Reply::bulk("B"),
                        Reply::bulk("n"),
                        Reply::Double(1.0),
                    ])
                );
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn aggregate_unknown_clause_is_rejected() {
        let family = family();
        create(&family, &["idx", "SCHEMA", "f", "TEXT"]);
        let err = family.ft_aggregate(&args(&["idx", "*", "APPLY", "x"])).unwrap_err();
        assert_eq!(err.to_string(), "Unknown clause: APPLY");
    }

    #[test]
    fn profile_wraps_search_reply_and_shard_trees() {
        let family = family();
        create(&family, &["idx", "PREFIX", "1", "d:", "SCHEMA", "body", "TEXT"]);
        insert(&family, "d:1", &[("body", "hello")]);

        let reply = family
            .ft_profile(&args(&["idx", "SEARCH", "LIMITED", "QUERY", "hello", "NOCONTENT"]))
            .unwrap();
        let items = match reply {
            Reply::Array(items) => items,
            other => panic!("expected array, got {:?}", other),
        };
        assert_eq!(items.len(), 2);

        match &items[0] {
            Reply::Array(search_items) => assert_eq!(search_items[0], Reply::Long(1)),
            other => panic!("expected search reply, got {:?}", other),
        }

        let profile = match &items[1] {
            Reply::Array(profile) => profile,
            other => panic!("expected profile array, got {:?}", other),
        };
        assert_eq!(profile.len(), 3); // summary + one entry per shard
        match &profile[0] {
            Reply::Map(pairs) => {
                assert_eq!(pairs[0].0, Reply::bulk("took"));
                assert_eq!(pairs[1].0, Reply::bulk("hits"));
                assert_eq!(pairs[1].1, Reply::Long(1));
                assert_eq!(pairs[2].0, Reply::bulk("serialized"));
            }
            other => panic!("expected summary map, got {:?}", other),
        }
        match &profile[1] {
            Reply::Map(pairs) => {
                assert_eq!(pairs[1].0, Reply::bulk("tree"));
            }
            other => panic!("expected shard map, got {:?}", other),
        }
    }

    #[test]
    fn profile_requires_a_subcommand_and_rejects_aggregate() {
        let family = family();
        let err = family.ft_profile(&args(&["idx", "QUERY", "*"])).unwrap_err();
        assert_eq!(err.to_string(), "no `SEARCH` or `AGGREGATE` provided");

        let err = family
            .ft_profile(&args(&["idx", "AGGREGATE", "QUERY", "*"]))
            .unwrap_err();
        assert_eq!(err.to_string(), "FT.PROFILE does not support AGGREGATE");
    }

    #[test]
    fn profile_tree_reconstruction() {
        let events = vec![
            ProfileEvent { descr: "root".into(), depth: 0, micros: 100, num_processed: 10 },
            ProfileEvent { descr: "a".into(), depth: 1, micros: 40, num_processed: 5 },
            ProfileEvent { descr: "a1".into(), depth: 2, micros: 10, num_processed: 2 },
            ProfileEvent { descr: "b".into(), depth: 1, micros: 20, num_processed: 3 },
        ];
        let tree = build_profile_tree(&events);
        let pairs = match tree {
            Reply::Map(pairs) => pairs,
            other => panic!("expected map, got {:?}", other),
        };
        // self_time of the root: 100 - (40 + 20).
        assert_eq!(pairs[2].1, Reply::Long(40));
        match &pairs[4].1 {
            Reply::Array(children) => {
                assert_eq!(children.len(), 2);
                match &children[0] {
                    Reply::Map(child) => {
                        assert_eq!(child[1].1, Reply::simple("a"));
                        assert_eq!(child[2].1, Reply::Long(30)); // 40 - 10
                    }
                    other => panic!("expected child map, got {:?}", other),
                }
            }
            other => panic!("expected children array, got {:?}", other),
        }
    }
}
