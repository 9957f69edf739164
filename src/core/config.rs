#[derive(Debug, Clone)]
pub struct Config {
    pub num_shards: usize,             // Dedicated executor threads, one per shard
    pub shard_queue_depth: usize,      // Bounded job queue per shard executor
    pub reject_legacy_field: bool,     // FT.AGGREGATE: reject field names without '@'
}

impl Default for Config {
    fn default() -> Self {
        Config {
            num_shards: 4,
            shard_queue_depth: 1024,
            reject_legacy_field: true,
        }
    }
}
