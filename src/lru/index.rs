//! Concurrent LRU index over an arena-backed intrusive list.
//!
//! Tracks which artifacts are resident on the substrate and how recently
//! each was touched. The recency order is a doubly-linked list threaded
//! through a slot arena: two sentinel slots are pre-wired to each other so
//! the interior holds exactly `len` real nodes and link surgery needs no
//! end-of-list special cases. A [`DashMap`] maps keys to slot indices for
//! O(1) lookup.
//!
//! # Locking
//!
//! All link surgery happens under a single list mutex; lookups resolve the
//! slot index through the map first and re-validate the key once the list
//! lock is held, so a stale index (the entry was removed or its slot reused
//! in the window between lookup and lock) degrades to a miss instead of
//! corrupting the list. Lock order is always list-lock before map-shard;
//! map reads taken outside the list lock drop their shard guard before the
//! list lock is acquired.
//!
//! # Recency under contention
//!
//! Concurrent promotions serialize on the list mutex in arrival order, so
//! two racing `get` calls may land in either head order. The only guarantee
//! is that a promoted node sits ahead of every node not touched since.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use thiserror::Error;

/// Errors returned by [`LruIndex`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LruError {
    /// No real nodes to evict.
    #[error("LRU index is empty")]
    Empty,
}

/// Slot index of the head sentinel (most-recent end).
const HEAD: usize = 0;
/// Slot index of the tail sentinel (least-recent end).
const TAIL: usize = 1;

/// Key/value payload of a live slot.
struct Entry<V> {
    key: String,
    value: V,
}

/// One arena slot. Sentinels and freed slots carry no entry.
struct Slot<V> {
    prev: usize,
    next: usize,
    entry: Option<Entry<V>>,
}

/// The list state guarded by the mutex: slot arena plus free-slot stack.
struct LruList<V> {
    slots: Vec<Slot<V>>,
    free: Vec<usize>,
}

impl<V> LruList<V> {
    fn new() -> Self {
        // Sentinels point at each other; the interior is empty.
        let slots = vec![
            Slot {
                prev: TAIL,
                next: TAIL,
                entry: None,
            },
            Slot {
                prev: HEAD,
                next: HEAD,
                entry: None,
            },
        ];
        Self {
            slots,
            free: Vec::new(),
        }
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.slots[idx].prev;
        let next = self.slots[idx].next;
        self.slots[prev].next = next;
        self.slots[next].prev = prev;
    }

    fn link_at_head(&mut self, idx: usize) {
        let first = self.slots[HEAD].next;
        self.slots[idx].prev = HEAD;
        self.slots[idx].next = first;
        self.slots[first].prev = idx;
        self.slots[HEAD].next = idx;
    }

    /// Take a slot for a new entry, reusing freed slots before growing.
    fn allocate(&mut self, key: String, value: V) -> usize {
        let entry = Some(Entry { key, value });
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx].entry = entry;
                idx
            }
            None => {
                self.slots.push(Slot {
                    prev: HEAD,
                    next: HEAD,
                    entry,
                });
                self.slots.len() - 1
            }
        }
    }

    /// Return an unlinked slot to the free stack and take its payload.
    fn release(&mut self, idx: usize) -> Entry<V> {
        let entry = self.slots[idx]
            .entry
            .take()
            .expect("released slot must hold an entry");
        self.free.push(idx);
        entry
    }

    /// Key held by the slot, if it is live.
    fn key_at(&self, idx: usize) -> Option<&str> {
        self.slots
            .get(idx)
            .and_then(|slot| slot.entry.as_ref())
            .map(|entry| entry.key.as_str())
    }
}

/// Thread-safe LRU index mapping string keys to artifact handles.
///
/// `get` and `put` promote the touched entry to the head; `evict_tail`
/// removes the entry at the least-recent end and hands its key to the
/// caller for downstream cleanup.
pub struct LruIndex<V> {
    /// Key to slot index. Membership here matches list membership exactly.
    map: DashMap<String, usize>,
    list: Mutex<LruList<V>>,
    /// Real node count. Advisory; readers see it without the list lock.
    len: AtomicUsize,
}

impl<V: Clone> LruIndex<V> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            list: Mutex::new(LruList::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Look up a key, promoting it to most-recent on a hit.
    pub fn get(&self, key: &str) -> Option<V> {
        // Copy the slot index out so the map shard guard is released before
        // the list lock is taken (lock order: list before map).
        let idx = match self.map.get(key) {
            Some(slot) => *slot,
            None => return None,
        };

        let mut list = self.list.lock().unwrap();
        // The slot may have been removed or reused since the map lookup.
        if list.key_at(idx) != Some(key) {
            return None;
        }
        list.unlink(idx);
        list.link_at_head(idx);
        list.slots[idx]
            .entry
            .as_ref()
            .map(|entry| entry.value.clone())
    }

    /// Insert or overwrite a key, promoting it to most-recent.
    pub fn put(&self, key: &str, value: V) {
        let mut list = self.list.lock().unwrap();
        let existing = self.map.get(key).map(|slot| *slot);
        match existing {
            Some(idx) => {
                if let Some(entry) = list.slots[idx].entry.as_mut() {
                    entry.value = value;
                }
                list.unlink(idx);
                list.link_at_head(idx);
            }
            None => {
                let idx = list.allocate(key.to_string(), value);
                list.link_at_head(idx);
                self.map.insert(key.to_string(), idx);
                self.len.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Remove a key. Returns the stored value, or `None` if absent.
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut list = self.list.lock().unwrap();
        let idx = match self.map.remove(key) {
            Some((_, idx)) => idx,
            None => return None,
        };
        list.unlink(idx);
        let entry = list.release(idx);
        self.len.fetch_sub(1, Ordering::Relaxed);
        Some(entry.value)
    }

    /// Unlink the least-recently-used entry and return its key.
    ///
    /// The caller owns downstream cleanup (metadata deletion, byte
    /// reclamation); the index forgets the entry immediately.
    pub fn evict_tail(&self) -> Result<String, LruError> {
        let mut list = self.list.lock().unwrap();
        let idx = list.slots[TAIL].prev;
        if idx == HEAD {
            return Err(LruError::Empty);
        }
        list.unlink(idx);
        let entry = list.release(idx);
        self.map.remove(&entry.key);
        self.len.fetch_sub(1, Ordering::Relaxed);
        Ok(entry.key)
    }

    /// Whether the key is currently tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Number of tracked entries. Approximate under concurrent mutation.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Whether the index tracks no entries. Approximate, like [`len`](Self::len).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for LruIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}
