pub mod merge;
pub mod params;

pub use params::{
    FieldReference, ProfileEvent, SearchParams, SearchProfile, SearchResult, SerializedSearchDoc,
    SortOption,
};
