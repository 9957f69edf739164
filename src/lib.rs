pub mod aggregate;
pub mod core;
pub mod family;
pub mod index;
pub mod parser;
pub mod query;
pub mod reply;
pub mod schema;
pub mod search;
pub mod shard;

pub use crate::core::config::Config;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::family::{CommandContext, SearchFamily};
pub use crate::reply::Reply;

/*
┌──────────────────────────────────────────────────────────────────────────┐
│                     DAMSELFLY COMMAND & COORDINATION LAYER                │
└──────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────── COMMAND LAYER ────────────────────────────┐
│                                                                           │
│  ┌─────────────────────────────────────────────────────────────────┐    │
│  │                        struct SearchFamily                       │    │
│  │  shards: Arc<ShardSet>     // dedicated executor per shard       │    │
│  │  config: Config            // shard count, legacy switches       │    │
│  │                                                                  │    │
│  │  FT.CREATE / FT.ALTER / FT.DROPINDEX / FT.INFO / FT._LIST        │    │
│  │  FT.SEARCH / FT.AGGREGATE / FT.PROFILE / FT.TAGVALS              │    │
│  │  FT.SYNDUMP / FT.SYNUPDATE                                       │    │
│  └─────────────────────────────────────────────────────────────────┘    │
│                                                                           │
│  ┌──────────────────┐  ┌────────────────────┐  ┌────────────────────┐   │
│  │ struct ArgParser │  │ parse_create_params │  │ parse_search_params│   │
│  │ • check/peek     │  │ parse_schema        │  │ parse_aggregate_   │   │
│  │ • map_next       │  │ (TAG TEXT NUMERIC   │  │   params (strict)  │   │
│  │ • recorded error │  │  VECTOR params)     │  └────────────────────┘   │
│  └──────────────────┘  └────────────────────┘                            │
└──────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── FANOUT LAYER ──────────────────────────────┐
│                                                                           │
│  ShardSet ──spawns──> shard-0..N executor threads (crossbeam channels)   │
│     │                                                                     │
│     ├── schedule_single_hop(cb)   // one closure per shard, atomic        │
│     ├── gather(cb) -> Vec<T>      // per-shard-indexed result slots       │
│     └── transaction()             // two-phase: Execute(cb, final)        │
│                                                                           │
│  EngineShard { documents, indices: ShardDocIndices }                      │
│     └── ShardDocIndex { Arc<DocIndex>, term map, synonyms }               │
└──────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── MERGE LAYER ───────────────────────────────┐
│                                                                           │
│  SearchResult×N ──> build_search_reply   // KNN cut, offset/limit,        │
│                                          // SORTBY partial sort           │
│  DocValues rows ──> aggregate::process   // GROUP+REDUCE, SORT, LIMIT     │
│  ProfileEvent[]  ──> build_profile_tree  // depth-tagged pre-order        │
└──────────────────────────────────────────────────────────────────────────┘
*/
