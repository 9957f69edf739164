use std::collections::{BTreeSet, HashMap, HashSet};

/// Shard-local synonym table: group id -> set of terms. Term matching treats
/// every member of a group as equivalent.
#[derive(Debug, Clone, Default)]
pub struct Synonyms {
    groups: HashMap<String, BTreeSet<String>>,
}

impl Synonyms {
    pub fn groups(&self) -> &HashMap<String, BTreeSet<String>> {
        &self.groups
    }

    /// Replace (or create) a group wholesale. Terms are stored lowercased,
    /// the same normalization tokenization applies on the lookup side.
    pub fn update_group(&mut self, group_id: &str, terms: &[String]) {
        self.groups
            .insert(group_id.to_string(), terms.iter().map(|t| t.to_lowercase()).collect());
    }

    /// The term plus every term sharing a group with it.
    pub fn expand(&self, term: &str) -> HashSet<String> {
        let mut expanded = HashSet::new();
        expanded.insert(term.to_string());
        for group in self.groups.values() {
            if group.contains(term) {
                expanded.extend(group.iter().cloned());
            }
        }
        expanded
    }
}
