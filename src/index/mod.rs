pub mod doc_index;
pub mod registry;
pub mod synonyms;

pub use doc_index::{DocIndexInfo, ShardDocIndex};
pub use registry::ShardDocIndices;
pub use synonyms::Synonyms;
