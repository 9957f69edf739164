use std::collections::HashMap;
use std::sync::Arc;

use crate::core::types::Document;
use crate::index::doc_index::ShardDocIndex;
use crate::schema::DocIndex;

/// Per-shard index registry. Only the owning shard's executor touches it, so
/// no locking happens here.
#[derive(Default)]
pub struct ShardDocIndices {
    indices: HashMap<String, ShardDocIndex>,
}

impl ShardDocIndices {
    pub fn get_index(&self, name: &str) -> Option<&ShardDocIndex> {
        self.indices.get(name)
    }

    pub fn get_index_mut(&mut self, name: &str) -> Option<&mut ShardDocIndex> {
        self.indices.get_mut(name)
    }

    /// Install a freshly published definition, building the shard-local index
    /// over the current documents. Replaces any previous index of that name.
    pub fn init_index(
        &mut self,
        name: &str,
        base: Arc<DocIndex>,
        documents: &HashMap<String, Document>,
    ) {
        self.indices.insert(name.to_string(), ShardDocIndex::new(base, documents));
    }

    pub fn drop_index(&mut self, name: &str) -> bool {
        self.indices.remove(name).is_some()
    }

    pub fn get_index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ShardDocIndex> {
        self.indices.values_mut()
    }
}
