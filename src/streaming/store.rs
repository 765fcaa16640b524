//! LRU-bounded chunk cache
//!
//! Chunks stay cached after leaving every view so a viewer walking back finds
//! them ready. When the store grows past its capacity, the least recently
//! used chunk that no pool slot is showing gets evicted.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;

use crate::math::GridPos;
use crate::streaming::chunk::Chunk;

pub struct ChunkStore {
    chunks: HashMap<GridPos, Chunk>,
    /// Number of in-use pool slots (across viewers) showing each chunk
    pins: HashMap<GridPos, usize>,
    capacity: usize,
    chunk_axis_size: f32,
    lod_count: usize,
    /// Monotonic access clock for LRU
    clock: u64,
    /// Access time -> chunk, oldest first
    by_access: BTreeMap<u64, GridPos>,
}

impl ChunkStore {
    pub fn new(capacity: usize, chunk_axis_size: f32, lod_count: usize) -> Self {
        Self {
            chunks: HashMap::new(),
            pins: HashMap::new(),
            capacity,
            chunk_axis_size,
            lod_count,
            clock: 0,
            by_access: BTreeMap::new(),
        }
    }

    /// Get the chunk at `pos`, creating an empty one on a miss.
    ///
    /// The bool is true when the chunk was created.
    pub fn get_or_create(&mut self, pos: GridPos) -> (&mut Chunk, bool) {
        let created = !self.chunks.contains_key(&pos);
        if created && self.chunks.len() >= self.capacity {
            self.evict_lru();
        }
        let clock = self.tick_clock();
        let (chunk_axis_size, lod_count) = (self.chunk_axis_size, self.lod_count);
        let chunk = self
            .chunks
            .entry(pos)
            .or_insert_with(|| Chunk::new(pos, chunk_axis_size, lod_count));
        if !created {
            self.by_access.remove(&chunk.last_access);
        }
        chunk.last_access = clock;
        self.by_access.insert(clock, pos);
        (chunk, created)
    }

    /// Look up without touching the access order
    pub fn get(&self, pos: GridPos) -> Option<&Chunk> {
        self.chunks.get(&pos)
    }

    /// Look up and mark as recently used
    pub fn get_mut(&mut self, pos: GridPos) -> Option<&mut Chunk> {
        let chunk = self.chunks.get_mut(&pos)?;
        self.clock += 1;
        self.by_access.remove(&chunk.last_access);
        chunk.last_access = self.clock;
        self.by_access.insert(self.clock, pos);
        Some(chunk)
    }

    /// Chunk containing a world position
    pub fn chunk_at_world(&self, pos: Vec3) -> Option<&Chunk> {
        self.get(GridPos::from_world(pos, self.chunk_axis_size))
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        self.chunks.contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Protect `pos` from eviction while a slot shows it
    pub fn pin(&mut self, pos: GridPos) {
        *self.pins.entry(pos).or_default() += 1;
    }

    pub fn unpin(&mut self, pos: GridPos) {
        if let Some(count) = self.pins.get_mut(&pos) {
            *count -= 1;
            if *count == 0 {
                self.pins.remove(&pos);
            }
        }
    }

    pub fn is_pinned(&self, pos: GridPos) -> bool {
        self.pins.contains_key(&pos)
    }

    fn tick_clock(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Evict the least recently used unpinned chunk
    fn evict_lru(&mut self) -> Option<Chunk> {
        let oldest = self
            .by_access
            .iter()
            .find(|(_, pos)| !self.pins.contains_key(pos))
            .map(|(&access, &pos)| (access, pos));

        match oldest {
            Some((access, pos)) => {
                log::trace!("Evicted chunk {:?}", pos);
                self.by_access.remove(&access);
                self.chunks.remove(&pos)
            }
            None => {
                log::warn!(
                    "Chunk store over capacity ({} chunks, capacity {}): every chunk is pinned",
                    self.chunks.len(),
                    self.capacity
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create() {
        let mut store = ChunkStore::new(10, 32.0, 4);
        let (chunk, created) = store.get_or_create(GridPos::new(1, 2, 3));
        assert!(created);
        assert_eq!(chunk.pos(), GridPos::new(1, 2, 3));
        assert_eq!(chunk.lod_count(), 4);
        let (_, created) = store.get_or_create(GridPos::new(1, 2, 3));
        assert!(!created);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let mut store = ChunkStore::new(3, 32.0, 1);
        store.get_or_create(GridPos::new(0, 0, 0));
        store.get_or_create(GridPos::new(1, 0, 0));
        store.get_or_create(GridPos::new(2, 0, 0));

        // Touch the oldest so (1,0,0) becomes LRU
        store.get_mut(GridPos::new(0, 0, 0));
        store.get_or_create(GridPos::new(3, 0, 0));

        assert_eq!(store.len(), 3);
        assert!(store.contains(GridPos::new(0, 0, 0)));
        assert!(!store.contains(GridPos::new(1, 0, 0)));
        assert!(store.contains(GridPos::new(3, 0, 0)));
    }

    #[test]
    fn test_pinned_never_evicted() {
        let mut store = ChunkStore::new(2, 32.0, 1);
        store.get_or_create(GridPos::new(0, 0, 0));
        store.get_or_create(GridPos::new(1, 0, 0));
        store.pin(GridPos::new(0, 0, 0));
        store.pin(GridPos::new(1, 0, 0));

        // Everything pinned: store grows past capacity
        store.get_or_create(GridPos::new(2, 0, 0));
        assert_eq!(store.len(), 3);

        store.unpin(GridPos::new(1, 0, 0));
        store.get_or_create(GridPos::new(3, 0, 0));
        assert!(!store.contains(GridPos::new(1, 0, 0)));
        assert!(store.contains(GridPos::new(0, 0, 0)));
    }

    #[test]
    fn test_access_index_tracks_chunks() {
        let mut store = ChunkStore::new(4, 32.0, 1);
        for x in 0..20 {
            store.get_or_create(GridPos::new(x, 0, 0));
            store.get_mut(GridPos::new(x / 2, 0, 0));
            if x % 3 == 0 {
                store.pin(GridPos::new(x, 0, 0));
            }
        }
        assert_eq!(store.by_access.len(), store.len());
        for chunk in store.iter() {
            assert_eq!(store.by_access.get(&chunk.last_access), Some(&chunk.pos()));
        }
    }

    #[test]
    fn test_pin_counts() {
        let mut store = ChunkStore::new(4, 32.0, 1);
        let pos = GridPos::new(5, 5, 5);
        store.pin(pos);
        store.pin(pos);
        store.unpin(pos);
        assert!(store.is_pinned(pos));
        store.unpin(pos);
        assert!(!store.is_pinned(pos));
    }

    #[test]
    fn test_chunk_at_world() {
        let mut store = ChunkStore::new(4, 32.0, 1);
        store.get_or_create(GridPos::new(-1, 0, 2));
        let chunk = store.chunk_at_world(Vec3::new(-0.5, 10.0, 70.0)).unwrap();
        assert_eq!(chunk.pos(), GridPos::new(-1, 0, 2));
        assert!(store.chunk_at_world(Vec3::new(100.0, 0.0, 0.0)).is_none());
    }
}
