use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::mem;

use log::trace;
use parking_lot::Mutex;

/// A bucket of the extendible hash table.
#[derive(Debug)]
struct Bucket<K, V> {
    /// Number of low hash bits shared by every key in this bucket
    depth: u32,
    /// Entries in insertion order, keys unique
    items: Vec<(K, V)>,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(depth: u32) -> Self {
        Self {
            depth,
            items: Vec::new(),
        }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        self.items.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Directory state guarded by the table latch.
///
/// Buckets live in an arena and directory slots hold arena indices, so
/// several slots can share one bucket. Buckets only ever split, never merge,
/// so every arena entry stays referenced by at least one slot.
#[derive(Debug)]
struct Directory<K, V> {
    global_depth: u32,
    slots: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
    len: usize,
}

impl<K: Eq, V> Directory<K, V> {
    fn new() -> Self {
        Self {
            global_depth: 0,
            slots: vec![0],
            buckets: vec![Bucket::new(0)],
            len: 0,
        }
    }

    fn index_of(&self, hash: u64) -> usize {
        let mask = (1u64 << self.global_depth) - 1;
        (hash & mask) as usize
    }

    fn bucket_for(&self, hash: u64) -> usize {
        self.slots[self.index_of(hash)]
    }

    /// Doubles the directory; the upper half mirrors the lower half.
    fn grow(&mut self) {
        assert!(
            self.global_depth < u64::BITS - 1,
            "extendible hash directory cannot grow past {} bits",
            u64::BITS - 1
        );
        self.global_depth += 1;
        self.slots.extend_from_within(..);
    }

    /// Splits `bucket` on its next hash bit, moving matching entries and
    /// directory slots to a new sibling bucket.
    fn split(&mut self, bucket: usize, hash_of: impl Fn(&K) -> u64) {
        if self.buckets[bucket].depth == self.global_depth {
            self.grow();
        }

        let split_bit = 1u64 << self.buckets[bucket].depth;
        self.buckets[bucket].depth += 1;
        let depth = self.buckets[bucket].depth;

        let items = mem::take(&mut self.buckets[bucket].items);
        let (moved, kept): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|(k, _)| hash_of(k) & split_bit != 0);
        self.buckets[bucket].items = kept;

        let sibling = self.buckets.len();
        self.buckets.push(Bucket { depth, items: moved });

        for (i, slot) in self.slots.iter_mut().enumerate() {
            if *slot == bucket && (i as u64) & split_bit != 0 {
                *slot = sibling;
            }
        }

        trace!(
            "split bucket {} at depth {} (global depth {}, {} buckets)",
            bucket,
            depth,
            self.global_depth,
            self.buckets.len()
        );
    }
}

/// A thread-safe extendible hash table.
///
/// Keys are addressed by the low `global_depth` bits of their hash. A full
/// bucket splits on insert, doubling the directory first when the bucket
/// already uses every directory bit, so inserts only fail when more than a
/// bucket's worth of keys share one hash.
///
/// The buffer pool uses it as its page directory (`PageId -> FrameId`), but
/// it places no requirements on keys beyond `Hash + Eq`.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    /// Maximum number of entries per bucket
    bucket_size: usize,
    hash_builder: S,
    directory: Mutex<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V, RandomState>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Creates an empty table whose buckets hold `bucket_size` entries.
    ///
    /// # Panics
    /// Panics if `bucket_size` is 0.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    V: Clone,
    S: BuildHasher,
{
    /// Creates an empty table that hashes keys with `hash_builder`.
    ///
    /// # Panics
    /// Panics if `bucket_size` is 0.
    pub fn with_hasher(bucket_size: usize, hash_builder: S) -> Self {
        assert!(bucket_size > 0, "bucket_size must be > 0");
        Self {
            bucket_size,
            hash_builder,
            directory: Mutex::new(Directory::new()),
        }
    }

    fn hash_of(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    /// Looks up the value stored for `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let hash = self.hash_of(key);
        let dir = self.directory.lock();
        dir.buckets[dir.bucket_for(hash)].find(key).cloned()
    }

    /// Removes `key`, returning true if it was present.
    pub fn remove(&self, key: &K) -> bool {
        let hash = self.hash_of(key);
        let mut dir = self.directory.lock();
        let bucket = dir.bucket_for(hash);
        let removed = dir.buckets[bucket].remove(key);
        if removed {
            dir.len -= 1;
        }
        removed
    }

    /// Inserts `key -> value`, overwriting any existing value for `key`.
    ///
    /// # Panics
    /// Panics if more than `bucket_size` distinct keys share one hash value,
    /// since no number of splits can separate them.
    pub fn insert(&self, key: K, value: V) {
        let hash = self.hash_of(&key);
        let mut dir = self.directory.lock();

        let bucket = dir.bucket_for(hash);
        if let Some(existing) = dir.buckets[bucket].find_mut(&key) {
            *existing = value;
            return;
        }

        loop {
            let bucket = dir.bucket_for(hash);
            if dir.buckets[bucket].items.len() < self.bucket_size {
                dir.buckets[bucket].items.push((key, value));
                dir.len += 1;
                return;
            }
            assert!(
                dir.buckets[bucket]
                    .items
                    .iter()
                    .any(|(k, _)| self.hash_of(k) != hash),
                "more than {} keys share one hash",
                self.bucket_size
            );
            dir.split(bucket, |k| self.hash_of(k));
        }
    }

    /// Returns the number of hash bits used to address the directory.
    pub fn global_depth(&self) -> u32 {
        self.directory.lock().global_depth
    }

    /// Returns the local depth of the bucket referenced by directory slot
    /// `dir_index`.
    ///
    /// # Panics
    /// Panics if `dir_index` is not below `1 << global_depth()`.
    pub fn local_depth(&self, dir_index: usize) -> u32 {
        let dir = self.directory.lock();
        dir.buckets[dir.slots[dir_index]].depth
    }

    /// Returns the number of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        self.directory.lock().buckets.len()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.directory.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of every key in the table.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        let dir = self.directory.lock();
        dir.buckets
            .iter()
            .flat_map(|b| b.items.iter().map(|(k, _)| k.clone()))
            .collect()
    }
}
