mod search;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::index::DocIndexInfo;
use crate::parser::args::ArgParser;
use crate::parser::create::{parse_create_params, parse_schema};
use crate::query::warmup_query_parser;
use crate::reply::Reply;
use crate::schema::{DocIndex, FieldParams};
use crate::shard::ShardSet;

/// Per-connection state the command surface depends on.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub db_index: usize,
}

/// The FT.* command family over one process-local shard set.
pub struct SearchFamily {
    shards: Arc<ShardSet>,
    config: Config,
}

/// Parse-result errors win over recorded tokenizer errors, matching the
/// order mismatches are discovered in.
fn surface<T>(result: Result<T>, parser: &mut ArgParser) -> Result<T> {
    match result {
        Err(err) => Err(err),
        Ok(value) => match parser.take_error() {
            Some(err) => Err(err),
            None => Ok(value),
        },
    }
}

impl SearchFamily {
    pub fn new(config: Config) -> Result<SearchFamily> {
        let shards = Arc::new(ShardSet::new(&config)?);
        Ok(SearchFamily { shards, config })
    }

    pub fn shards(&self) -> &Arc<ShardSet> {
        &self.shards
    }

    /// Store a document; indexes gated by a matching prefix pick it up.
    pub fn insert_document(&self, key: &str, fields: HashMap<String, String>) {
        self.shards.insert_document(key, fields);
    }

    pub fn handle_command(
        &self,
        ctx: &CommandContext,
        verb: &str,
        args: &[String],
    ) -> Result<Reply> {
        debug!(verb, args = args.len(), "search command");
        match verb.to_ascii_uppercase().as_str() {
            "FT.CREATE" => self.ft_create(ctx, args),
            "FT.ALTER" => self.ft_alter(args),
            "FT.DROPINDEX" => self.ft_dropindex(args),
            "FT.INFO" => self.ft_info(args),
            "FT._LIST" => self.ft_list(),
            "FT.SEARCH" => self.ft_search(args),
            "FT.AGGREGATE" => self.ft_aggregate(args),
            "FT.PROFILE" => self.ft_profile(args),
            "FT.TAGVALS" => self.ft_tagvals(args),
            "FT.SYNDUMP" => self.ft_syndump(args),
            "FT.SYNUPDATE" => self.ft_synupdate(args),
            _ => Err(Error::semantic(format!("unknown command '{}'", verb))),
        }
    }

    pub fn ft_create(&self, ctx: &CommandContext, args: &[String]) -> Result<Reply> {
        warmup_query_parser();

        if ctx.db_index != 0 {
            return Err(Error::semantic("Cannot create index on db != 0"));
        }

        let mut parser = ArgParser::new(args);
        let idx_name = parser.next().to_string();
        let index = surface(parse_create_params(&mut parser), &mut parser)?;

        // Phase 1: does the index exist anywhere?
        let exists_cnt = Arc::new(AtomicUsize::new(0));
        let mut tx = self.shards.transaction();
        {
            let name = idx_name.clone();
            let exists = exists_cnt.clone();
            tx.execute(
                move |shard| {
                    if shard.indices.get_index(&name).is_some() {
                        exists.fetch_add(1, Ordering::Relaxed);
                    }
                },
                false,
            );
        }

        let count = exists_cnt.load(Ordering::Relaxed);
        debug_assert!(count == 0 || count == self.shards.size());
        if count > 0 {
            tx.conclude();
            return Err(Error::semantic("Index already exists"));
        }

        // Phase 2: publish one shared definition to every shard.
        let base = Arc::new(index);
        tx.execute(
            move |shard| {
                shard.init_index(&idx_name, base.clone());
            },
            true,
        );

        Ok(Reply::ok())
    }

    pub fn ft_alter(&self, args: &[String]) -> Result<Reply> {
        let mut parser = ArgParser::new(args);
        let idx_name = parser.next().to_string();
        parser.expect_tag("SCHEMA");
        parser.expect_tag("ADD");
        if let Some(err) = parser.take_error() {
            return Err(err);
        }

        // All shards hold the same definition; fetch it from shard 0 only.
        let info_slot: Arc<Mutex<Option<DocIndex>>> = Arc::new(Mutex::new(None));
        let mut tx = self.shards.transaction();
        {
            let name = idx_name.clone();
            let slot = info_slot.clone();
            tx.execute(
                move |shard| {
                    if shard.shard_id() > 0 {
                        return;
                    }
                    if let Some(index) = shard.indices.get_index(&name) {
                        *slot.lock() = Some(index.get_info().base_index);
                    }
                },
                false,
            );
        }

        let mut index_info = match info_slot.lock().take() {
            Some(info) => info,
            None => {
                tx.conclude();
                return Err(Error::semantic("Index not found"));
            }
        };

        // Parse the additional fields against the existing document kind.
        let mut new_index = DocIndex { kind: index_info.kind, ..DocIndex::default() };
        let parse_result = surface(parse_schema(&mut parser, &mut new_index), &mut parser);
        if let Err(err) = parse_result {
            tx.conclude();
            return Err(err);
        }

        info!(index = %idx_name, added = new_index.schema.len(), "altering index schema");
        index_info.schema.merge_additive(new_index.schema);

        // Full rebuild under the fresh definition.
        let base = Arc::new(index_info);
        tx.execute(
            move |shard| {
                shard.indices.drop_index(&idx_name);
                shard.init_index(&idx_name, base.clone());
            },
            true,
        );

        Ok(Reply::ok())
    }

    pub fn ft_dropindex(&self, args: &[String]) -> Result<Reply> {
        let mut parser = ArgParser::new(args);
        let idx_name = parser.next().to_string();
        parser.check("DD"); // accepted, not implemented
        if let Some(err) = parser.take_error() {
            return Err(err);
        }

        let num_deleted = Arc::new(AtomicUsize::new(0));
        {
            let deleted = num_deleted.clone();
            self.shards.schedule_single_hop(move |shard| {
                if shard.indices.drop_index(&idx_name) {
                    deleted.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        let count = num_deleted.load(Ordering::Relaxed);
        debug_assert!(count == 0 || count == self.shards.size());
        if count == 0 {
            return Err(Error::not_found("-Unknown Index name"));
        }
        Ok(Reply::ok())
    }

    pub fn ft_info(&self, args: &[String]) -> Result<Reply> {
        let mut parser = ArgParser::new(args);
        let idx_name = parser.next().to_string();
        if let Some(err) = parser.take_error() {
            return Err(err);
        }

        let infos: Vec<Option<DocIndexInfo>> = {
            let name = idx_name.clone();
            self.shards.gather(move |shard| shard.indices.get_index(&name).map(|ix| ix.get_info()))
        };

        let num_notfound = infos.iter().filter(|info| info.is_none()).count();
        debug_assert!(num_notfound == 0 || num_notfound == self.shards.size());
        if num_notfound > 0 {
            return Err(Error::not_found("Unknown Index name"));
        }

        let infos: Vec<DocIndexInfo> = infos.into_iter().flatten().collect();
        let total_num_docs: usize = infos.iter().map(|info| info.num_docs).sum();
        let info = match infos.first() {
            Some(info) => info,
            None => return Err(Error::not_found("Unknown Index name")),
        };
        let schema = &info.base_index.schema;

        let mut attributes = Vec::with_capacity(schema.len());
        for (ident, field) in schema.iter() {
            let mut entry = vec![
                "identifier".to_string(),
                ident.clone(),
                "attribute".to_string(),
                field.short_name.clone(),
                "type".to_string(),
                field.field_type.as_str().to_string(),
            ];
            if field.flags.noindex {
                entry.push("NOINDEX".to_string());
            }
            if field.flags.sortable {
                entry.push("SORTABLE".to_string());
            }
            if let FieldParams::Numeric(numeric) = &field.params {
                entry.push("blocksize".to_string());
                entry.push(numeric.block_size.to_string());
            }
            attributes.push(Reply::Array(entry.into_iter().map(Reply::simple).collect()));
        }

        Ok(Reply::Map(vec![
            (Reply::simple("index_name"), Reply::simple(idx_name)),
            (
                Reply::simple("index_definition"),
                Reply::Map(vec![
                    (Reply::simple("key_type"), Reply::simple(info.base_index.kind.as_str())),
                    (Reply::simple("prefix"), Reply::simple(info.base_index.prefix.clone())),
                ]),
            ),
            (Reply::simple("attributes"), Reply::Array(attributes)),
            (Reply::simple("num_docs"), Reply::Long(total_num_docs as i64)),
        ]))
    }

    pub fn ft_list(&self) -> Result<Reply> {
        let first = Arc::new(AtomicUsize::new(0));
        let names: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        {
            // All shards hold the same metadata; the first writer wins.
            let first = first.clone();
            let names = names.clone();
            self.shards.schedule_single_hop(move |shard| {
                if first.fetch_add(1, Ordering::Relaxed) == 0 {
                    *names.lock() = shard.indices.get_index_names();
                }
            });
        }
        let names = std::mem::take(&mut *names.lock());
        Ok(Reply::string_array(names))
    }

    pub fn ft_tagvals(&self, args: &[String]) -> Result<Reply> {
        let mut parser = ArgParser::new(args);
        let index_name = parser.next().to_string();
        let field_name = parser.next().to_string();
        if let Some(err) = parser.take_error() {
            return Err(err);
        }
        debug!(index = %index_name, field = %field_name, "FtTagVals");

        let results: Vec<Result<BTreeSet<String>>> = self.shards.gather(move |shard| {
            match shard.indices.get_index(&index_name) {
                Some(index) => index.get_tag_vals(&shard.documents, &field_name),
                None => Err(Error::shard("-Unknown Index name")),
            }
        });

        let mut merged = BTreeSet::new();
        for result in results {
            merged.extend(result?);
        }
        Ok(Reply::Set(merged.into_iter().map(Reply::bulk).collect()))
    }

    pub fn ft_syndump(&self, args: &[String]) -> Result<Reply> {
        let mut parser = ArgParser::new(args);
        let index_name = parser.next().to_string();
        if let Some(err) = parser.take_error() {
            return Err(err);
        }

        let index_not_found = Arc::new(AtomicBool::new(true));
        let shard_term_groups: Arc<Vec<Mutex<HashMap<String, BTreeSet<String>>>>> =
            Arc::new((0..self.shards.size()).map(|_| Mutex::new(HashMap::new())).collect());

        let mut tx = self.shards.transaction();
        {
            let found = index_not_found.clone();
            let slots = shard_term_groups.clone();
            tx.execute(
                move |shard| {
                    let index = match shard.indices.get_index(&index_name) {
                        Some(index) => index,
                        None => return,
                    };
                    found.store(false, Ordering::Relaxed);

                    // Invert group -> terms into term -> group ids.
                    let mut term_groups: HashMap<String, BTreeSet<String>> = HashMap::new();
                    for (group_id, terms) in index.synonyms().groups() {
                        for term in terms {
                            term_groups.entry(term.clone()).or_default().insert(group_id.clone());
                        }
                    }
                    *slots[shard.id].lock() = term_groups;
                },
                true,
            );
        }

        if index_not_found.load(Ordering::Relaxed) {
            return Err(Error::not_found("Unknown index name"));
        }

        let mut merged: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for slot in shard_term_groups.iter() {
            for (term, group_ids) in slot.lock().drain() {
                merged.entry(term).or_default().extend(group_ids);
            }
        }

        let mut out = Vec::with_capacity(merged.len() * 2);
        for (term, group_ids) in merged {
            out.push(Reply::bulk(term));
            out.push(Reply::Array(group_ids.into_iter().map(Reply::bulk).collect()));
        }
        Ok(Reply::Array(out))
    }

    pub fn ft_synupdate(&self, args: &[String]) -> Result<Reply> {
        let mut parser = ArgParser::new(args);
        let index_name = parser.next().to_string();
        let group_id = parser.next().to_string();

        // Accepted for compatibility; the reference server ignores it too.
        let _skip_initial_scan = parser.check("SKIPINITIALSCAN");

        let mut terms = Vec::new();
        while parser.has_next() {
            terms.push(parser.next().to_string());
        }

        if terms.is_empty() {
            return Err(Error::syntax("No terms specified"));
        }
        if !parser.finalize() {
            if let Some(err) = parser.take_error() {
                return Err(err);
            }
        }

        let index_not_found = Arc::new(AtomicBool::new(true));
        let mut tx = self.shards.transaction();
        {
            let name = index_name.clone();
            let found = index_not_found.clone();
            tx.execute(
                move |shard| {
                    if shard.rebuild_for_group(&name, &group_id, &terms) {
                        found.store(false, Ordering::Relaxed);
                    }
                },
                true,
            );
        }

        if index_not_found.load(Ordering::Relaxed) {
            return Err(Error::not_found(format!("{}: no such index", index_name)));
        }
        Ok(Reply::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family() -> SearchFamily {
        SearchFamily::new(Config { num_shards: 2, ..Default::default() }).unwrap()
    }

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn ctx() -> CommandContext {
        CommandContext::default()
    }

    #[test]
    fn create_list_info_roundtrip() {
        let family = family();
        let reply = family
            .ft_create(&ctx(), &args(&["idx", "ON", "JSON", "PREFIX", "1", "doc:", "SCHEMA", "$.a", "AS", "a", "TEXT"]))
            .unwrap();
        assert_eq!(reply, Reply::ok());

        assert_eq!(family.ft_list().unwrap(), Reply::string_array(vec!["idx"]));

        let info = family.ft_info(&args(&["idx"])).unwrap();
        match info {
            Reply::Map(pairs) => {
                assert_eq!(pairs[0].1, Reply::simple("idx"));
                match &pairs[1].1 {
                    Reply::Map(def) => {
                        assert_eq!(def[0].1, Reply::simple("JSON"));
                        assert_eq!(def[1].1, Reply::simple("doc:"));
                    }
                    other => panic!("expected definition map, got {:?}", other),
                }
                match &pairs[2].1 {
                    Reply::Array(attrs) => {
                        assert_eq!(
                            attrs[0],
                            Reply::Array(vec![
                                Reply::simple("identifier"),
                                Reply::simple("$.a"),
                                Reply::simple("attribute"),
                                Reply::simple("a"),
                                Reply::simple("type"),
                                Reply::simple("TEXT"),
                            ])
                        );
                    }
                    other => panic!("expected attributes, got {:?}", other),
                }
                assert_eq!(pairs[3].1, Reply::Long(0));
            }
            other => panic!("expected info map, got {:?}", other),
        }
    }

    #[test]
    fn create_rejects_non_default_db() {
        let family = family();
        let err = family
            .ft_create(&CommandContext { db_index: 3 }, &args(&["idx", "SCHEMA", "f", "TEXT"]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot create index on db != 0");
    }

    #[test]
    fn duplicate_create_fails_and_drop_is_idempotent() {
        let family = family();
        let create = args(&["idx", "ON", "HASH", "SCHEMA", "v", "VECTOR", "HNSW", "6", "DIM", "4",
            "DISTANCE_METRIC", "COSINE", "M", "16"]);
        family.ft_create(&ctx(), &create).unwrap();
        let err = family.ft_create(&ctx(), &create).unwrap_err();
        assert_eq!(err.to_string(), "Index already exists");

        family.ft_dropindex(&args(&["idx"])).unwrap();
        let err = family.ft_dropindex(&args(&["idx"])).unwrap_err();
        assert_eq!(err.to_string(), "-Unknown Index name");
    }

    #[test]
    fn alter_requires_existing_index() {
        let family = family();
        let err = family
            .ft_alter(&args(&["missing", "SCHEMA", "ADD", "f", "TEXT"]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Index not found");
    }

    #[test]
    fn alter_extends_schema_additively() {
        let family = family();
        family.ft_create(&ctx(), &args(&["idx", "SCHEMA", "a", "TEXT"])).unwrap();
        family.ft_alter(&args(&["idx", "SCHEMA", "ADD", "b", "TAG"])).unwrap();

        let info = family.ft_info(&args(&["idx"])).unwrap();
        match info {
            Reply::Map(pairs) => match &pairs[2].1 {
                Reply::Array(attrs) => assert_eq!(attrs.len(), 2),
                other => panic!("expected attributes, got {:?}", other),
            },
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn synupdate_requires_terms_and_an_index() {
        let family = family();
        let err = family.ft_synupdate(&args(&["idx", "g1"])).unwrap_err();
        assert_eq!(err.to_string(), "No terms specified");

        let err = family.ft_synupdate(&args(&["idx", "g1", "hello"])).unwrap_err();
        assert_eq!(err.to_string(), "idx: no such index");
    }

    #[test]
    fn synupdate_syndump_roundtrip() {
        let family = family();
        family.ft_create(&ctx(), &args(&["idx", "SCHEMA", "body", "TEXT"])).unwrap();
        family.ft_synupdate(&args(&["idx", "g1", "hello", "hi"])).unwrap();
        family.ft_synupdate(&args(&["idx", "g2", "SKIPINITIALSCAN", "hello"])).unwrap();

        let reply = family.ft_syndump(&args(&["idx"])).unwrap();
        match reply {
            Reply::Array(items) => {
                assert_eq!(items.len(), 4);
                assert_eq!(items[0], Reply::bulk("hello"));
                assert_eq!(
                    items[1],
                    Reply::Array(vec![Reply::bulk("g1"), Reply::bulk("g2")])
                );
                assert_eq!(items[2], Reply::bulk("hi"));
                assert_eq!(items[3], Reply::Array(vec![Reply::bulk("g1")]));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn syndump_unknown_index() {
        let family = family();
        let err = family.ft_syndump(&args(&["nope"])).unwrap_err();
        assert_eq!(err.to_string(), "Unknown index name");
    }

    #[test]
    fn tagvals_merges_across_shards() {
        let family = family();
        family
            .ft_create(&ctx(), &args(&["idx", "PREFIX", "1", "p:", "SCHEMA", "tags", "TAG"]))
            .unwrap();
        // Several keys so both shards hold documents.
        for i in 0..8 {
            let mut fields = HashMap::new();
            fields.insert("tags".to_string(), format!("common, t{}", i % 3));
            family.insert_document(&format!("p:{}", i), fields);
        }

        let reply = family.ft_tagvals(&args(&["idx", "tags"])).unwrap();
        match reply {
            Reply::Set(vals) => {
                assert!(vals.contains(&Reply::bulk("common")));
                assert_eq!(vals.len(), 4);
            }
            other => panic!("expected set, got {:?}", other),
        }

        let err = family.ft_tagvals(&args(&["missing", "tags"])).unwrap_err();
        assert_eq!(err.to_string(), "-Unknown Index name");
    }

    #[test]
    fn wrong_schema_keyword_is_surfaced() {
        let family = family();
        family.ft_create(&ctx(), &args(&["idx", "SCHEMA", "a", "TEXT"])).unwrap();
        assert!(family.ft_alter(&args(&["idx", "SCHEMA", "REPLACE", "b", "TAG"])).is_err());
    }
}
