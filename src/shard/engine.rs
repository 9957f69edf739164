use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregate::DocValues;
use crate::core::types::Document;
use crate::index::registry::ShardDocIndices;
use crate::query::SearchAlgorithm;
use crate::schema::DocIndex;
use crate::search::params::{SearchParams, SearchResult};

pub type ShardId = usize;

/// One shard: a slice of the key space plus its index registry, owned
/// exclusively by the shard's executor thread.
pub struct EngineShard {
    pub id: ShardId,
    pub documents: HashMap<String, Document>,
    pub indices: ShardDocIndices,
}

impl EngineShard {
    pub fn new(id: ShardId) -> Self {
        EngineShard { id, documents: HashMap::new(), indices: ShardDocIndices::default() }
    }

    pub fn shard_id(&self) -> ShardId {
        self.id
    }

    pub fn insert_document(&mut self, key: &str, fields: HashMap<String, String>) {
        let doc = Document::new(fields);
        for index in self.indices.iter_mut() {
            index.add_document(key, &doc);
        }
        self.documents.insert(key.to_string(), doc);
    }

    pub fn init_index(&mut self, name: &str, base: Arc<DocIndex>) {
        self.indices.init_index(name, base, &self.documents);
    }

    pub fn search(
        &self,
        name: &str,
        params: &SearchParams,
        algo: &SearchAlgorithm,
    ) -> Option<SearchResult> {
        self.indices.get_index(name).map(|index| index.search(&self.documents, params, algo))
    }

    pub fn search_for_aggregator(
        &self,
        name: &str,
        algo: &SearchAlgorithm,
    ) -> Option<Vec<DocValues>> {
        self.indices
            .get_index(name)
            .map(|index| index.search_for_aggregator(&self.documents, algo))
    }

    /// Update the group and trigger the targeted rebuild; false when the
    /// index is absent on this shard.
    pub fn rebuild_for_group(&mut self, name: &str, group_id: &str, terms: &[String]) -> bool {
        let documents = &self.documents;
        match self.indices.get_index_mut(name) {
            Some(index) => {
                index.rebuild_for_group(group_id, terms, documents);
                true
            }
            None => false,
        }
    }
}
