use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;
use tracing::debug;

use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::shard::engine::EngineShard;

type ShardClosure = dyn Fn(&mut EngineShard) + Send + Sync;

enum ShardMessage {
    /// Run one closure and acknowledge through the wait group.
    Run(Arc<ShardClosure>, WaitGroup),
    /// Park inside a transaction: only its phase channel feeds the shard
    /// until Conclude, so no other writer can interleave.
    Enter(Receiver<PhaseMessage>),
    Shutdown,
}

enum PhaseMessage {
    Run(Arc<ShardClosure>, WaitGroup),
    Conclude,
}

/// All shards of the process plus their executor threads. The coordinator
/// never touches shard state directly; it hands closures to the executors
/// and blocks until a hop completes — that wait is the only coarse
/// suspension point.
pub struct ShardSet {
    senders: Vec<Sender<ShardMessage>>,
    handles: Vec<JoinHandle<()>>,
}

impl ShardSet {
    pub fn new(config: &Config) -> Result<ShardSet> {
        let mut senders = Vec::with_capacity(config.num_shards);
        let mut handles = Vec::with_capacity(config.num_shards);

        for id in 0..config.num_shards {
            let (tx, rx) = bounded(config.shard_queue_depth);
            let handle = thread::Builder::new()
                .name(format!("shard-{}", id))
                .spawn(move || shard_loop(id, rx))
                .map_err(|e| Error::new(ErrorKind::Internal, e.to_string()))?;
            senders.push(tx);
            handles.push(handle);
        }

        debug!(shards = config.num_shards, "shard set started");
        Ok(ShardSet { senders, handles })
    }

    pub fn size(&self) -> usize {
        self.senders.len()
    }

    /// Run the closure once per shard and conclude atomically.
    pub fn schedule_single_hop<F>(&self, f: F)
    where
        F: Fn(&mut EngineShard) + Send + Sync + 'static,
    {
        let closure: Arc<ShardClosure> = Arc::new(f);
        let wg = WaitGroup::new();
        for sender in &self.senders {
            let _ = sender.send(ShardMessage::Run(closure.clone(), wg.clone()));
        }
        wg.wait();
    }

    /// Begin a multi-phase transaction (CREATE, ALTER, SYNDUMP, SYNUPDATE).
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction { set: self, phases: None }
    }

    /// Run the closure on every shard, collecting one result per shard into
    /// per-shard-indexed slots (a single writer per slot).
    pub fn gather<T, F>(&self, f: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(&mut EngineShard) -> T + Send + Sync + 'static,
    {
        let slots: Arc<Vec<Mutex<Option<T>>>> =
            Arc::new((0..self.size()).map(|_| Mutex::new(None)).collect());
        let writer = slots.clone();
        self.schedule_single_hop(move |shard| {
            *writer[shard.id].lock() = Some(f(shard));
        });
        slots
            .iter()
            .map(|slot| slot.lock().take().expect("every shard fills its slot exactly once"))
            .collect()
    }

    /// Route one document to its owning shard.
    pub fn insert_document(&self, key: &str, fields: HashMap<String, String>) {
        let shard = self.shard_for(key);
        let key = key.to_string();
        let state = Mutex::new(Some((key, fields)));
        let closure: Arc<ShardClosure> = Arc::new(move |engine: &mut EngineShard| {
            if let Some((key, fields)) = state.lock().take() {
                engine.insert_document(&key, fields);
            }
        });
        let wg = WaitGroup::new();
        let _ = self.senders[shard].send(ShardMessage::Run(closure, wg.clone()));
        wg.wait();
    }

    fn shard_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.size()
    }
}

impl Drop for ShardSet {
    fn drop(&mut self) {
        for sender in &self.senders {
            let _ = sender.send(ShardMessage::Shutdown);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Two-phase fanout: `execute(cb, false)` may be repeated; the final hop
/// (`execute(cb, true)` or `conclude`) releases the shards. Between hops the
/// shard executors stay parked on the transaction's channels.
pub struct Transaction<'a> {
    set: &'a ShardSet,
    phases: Option<Vec<Sender<PhaseMessage>>>,
}

impl Transaction<'_> {
    pub fn execute<F>(&mut self, f: F, conclude: bool)
    where
        F: Fn(&mut EngineShard) + Send + Sync + 'static,
    {
        self.enter();
        let closure: Arc<ShardClosure> = Arc::new(f);
        let wg = WaitGroup::new();
        if let Some(phases) = &self.phases {
            for phase in phases {
                let _ = phase.send(PhaseMessage::Run(closure.clone(), wg.clone()));
            }
        }
        wg.wait();
        if conclude {
            self.conclude();
        }
    }

    /// Release the shards without another closure.
    pub fn conclude(&mut self) {
        if let Some(phases) = self.phases.take() {
            for phase in phases {
                let _ = phase.send(PhaseMessage::Conclude);
            }
        }
    }

    fn enter(&mut self) {
        if self.phases.is_some() {
            return;
        }
        let mut phases = Vec::with_capacity(self.set.size());
        for sender in &self.set.senders {
            let (tx, rx) = unbounded();
            let _ = sender.send(ShardMessage::Enter(rx));
            phases.push(tx);
        }
        self.phases = Some(phases);
    }
}

impl Drop for Transaction<'_> {
    // An abandoned transaction must not leave shards parked.
    fn drop(&mut self) {
        self.conclude();
    }
}

fn shard_loop(id: usize, rx: Receiver<ShardMessage>) {
    let mut shard = EngineShard::new(id);
    while let Ok(message) = rx.recv() {
        match message {
            ShardMessage::Run(closure, wg) => {
                closure(&mut shard);
                drop(wg);
            }
            ShardMessage::Enter(phase_rx) => {
                while let Ok(phase) = phase_rx.recv() {
                    match phase {
                        PhaseMessage::Run(closure, wg) => {
                            closure(&mut shard);
                            drop(wg);
                        }
                        PhaseMessage::Conclude => break,
                    }
                }
            }
            ShardMessage::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small_set() -> ShardSet {
        let config = Config { num_shards: 3, ..Default::default() };
        ShardSet::new(&config).unwrap()
    }

    #[test]
    fn single_hop_runs_on_every_shard() {
        let set = small_set();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        set.schedule_single_hop(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(count.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn gather_collects_per_shard_slots() {
        let set = small_set();
        let ids = set.gather(|shard| shard.shard_id());
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn transaction_phases_stay_ordered() {
        let set = small_set();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut tx = set.transaction();
        let first = log.clone();
        tx.execute(
            move |shard| {
                first.lock().push((1, shard.shard_id()));
            },
            false,
        );
        let second = log.clone();
        tx.execute(
            move |shard| {
                second.lock().push((2, shard.shard_id()));
            },
            true,
        );

        let entries = log.lock();
        assert_eq!(entries.len(), 6);
        // Every phase-1 entry precedes every phase-2 entry.
        let first_phase_two = entries.iter().position(|(phase, _)| *phase == 2).unwrap();
        assert!(entries[..first_phase_two].iter().all(|(phase, _)| *phase == 1));
    }

    #[test]
    fn concluded_transaction_releases_shards() {
        let set = small_set();
        let mut tx = set.transaction();
        tx.execute(|_| {}, false);
        tx.conclude();
        // Shards accept ordinary work again.
        let ids = set.gather(|shard| shard.shard_id());
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn documents_route_to_a_single_shard() {
        let set = small_set();
        set.insert_document("user:1", HashMap::new());
        let counts = set.gather(|shard| shard.documents.len());
        assert_eq!(counts.iter().sum::<usize>(), 1);
    }
}
