//! Per-channel typed attribute storage: a copy-on-write sorted array keyed
//! by a monotonically-assigned id, read lock-free via binary search.
//!
//! Netty's equivalent keys attributes off pooled
//! static `AttributeKey` singletons backed by a process-global
//! `ConstantPool`; corvid replaces that with an explicit
//! [`AttributeKey::new`] that draws
//! from a crate-local monotonic counter, so there is no hidden global state
//! beyond the counter itself.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

static NEXT_KEY_ID: AtomicU32 = AtomicU32::new(0);

/// A typed, comparable handle identifying one attribute slot. Cheap to copy
/// and compare; ordering is solely by assignment id so a sorted array of
/// `(AttributeKey, _)` pairs binary-searches correctly regardless of `T`.
pub struct AttributeKey<T> {
    id: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    /// Allocates a fresh key. Each call returns a distinct key even for the
    /// same `T` — callers typically store the result in a `static` via
    /// `OnceLock` rather than calling this per lookup.
    pub fn new() -> AttributeKey<T> {
        AttributeKey {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for AttributeKey<T> {}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeKey").field(&self.id).finish()
    }
}

impl<T> Default for AttributeKey<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct Slot {
    id: u32,
    value: Arc<dyn Any + Send + Sync>,
}

/// A single-slot cell within an [`AttributeMap`], returned lazily-created by
/// [`AttributeMap::attr`].
pub struct Attribute<'a, T> {
    map: &'a AttributeMap,
    key: AttributeKey<T>,
}

impl<'a, T: Clone + Send + Sync + 'static> Attribute<'a, T> {
    pub fn get(&self) -> Option<T> {
        self.map.get(self.key)
    }

    pub fn set(&self, value: T) {
        self.map.set(self.key, value);
    }

    pub fn get_and_set(&self, value: T) -> Option<T> {
        self.map.get_and_set(self.key, value)
    }

    pub fn get_and_remove(&self) -> Option<T> {
        self.map.get_and_remove(self.key)
    }

    pub fn remove(&self) {
        self.map.remove(self.key);
    }

    /// Sets `new` only if the current value is `None`; returns whether this
    /// call won the race.
    pub fn compare_and_set_absent(&self, new: T) -> bool {
        self.map.compare_and_set_absent(self.key, new)
    }
}

/// Copy-on-write attribute storage. Reads binary-search an immutable
/// snapshot with no locking; writes build a new sorted array and CAS it
/// into place, retrying from the latest snapshot on contention.
pub struct AttributeMap {
    slots: Arc<parking_lot::RwLock<Vec<Slot>>>,
    write_lock: Mutex<()>,
    version: AtomicUsize,
}

impl Default for AttributeMap {
    fn default() -> Self {
        AttributeMap {
            slots: Arc::new(parking_lot::RwLock::new(Vec::new())),
            write_lock: Mutex::new(()),
            version: AtomicUsize::new(0),
        }
    }
}

impl AttributeMap {
    pub fn new() -> AttributeMap {
        AttributeMap::default()
    }

    /// Returns a handle to the slot for `key`, creating it lazily on first
    /// write; reading through the handle before any `set` call yields `None`.
    pub fn attr<T: Clone + Send + Sync + 'static>(&self, key: AttributeKey<T>) -> Attribute<'_, T> {
        Attribute { map: self, key }
    }

    pub fn has_attr<T>(&self, key: AttributeKey<T>) -> bool {
        let slots = self.slots.read();
        binary_search(&slots, key.id).is_ok()
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: AttributeKey<T>) -> Option<T> {
        let slots = self.slots.read();
        let idx = binary_search(&slots, key.id).ok()?;
        slots[idx].value.downcast_ref::<T>().cloned()
    }

    pub fn set<T: Clone + Send + Sync + 'static>(&self, key: AttributeKey<T>, value: T) {
        let _guard = self.write_lock.lock();
        let mut slots = self.slots.read().clone_inner();
        upsert(&mut slots, key.id, Arc::new(value));
        *self.slots.write() = slots;
        self.version.fetch_add(1, Ordering::Release);
    }

    pub fn get_and_set<T: Clone + Send + Sync + 'static>(
        &self,
        key: AttributeKey<T>,
        value: T,
    ) -> Option<T> {
        let _guard = self.write_lock.lock();
        let mut slots = self.slots.read().clone_inner();
        let previous = binary_search(&slots, key.id)
            .ok()
            .and_then(|idx| slots[idx].value.downcast_ref::<T>().cloned());
        upsert(&mut slots, key.id, Arc::new(value));
        *self.slots.write() = slots;
        self.version.fetch_add(1, Ordering::Release);
        previous
    }

    /// Sets `new` only if no value is currently present for `key`. Races
    /// between two callers resolve to exactly one winner; the loser
    /// observes the winner's value via a subsequent `get`.
    pub fn compare_and_set_absent<T: Clone + Send + Sync + 'static>(
        &self,
        key: AttributeKey<T>,
        new: T,
    ) -> bool {
        let _guard = self.write_lock.lock();
        let mut slots = self.slots.read().clone_inner();
        if binary_search(&slots, key.id).is_ok() {
            return false;
        }
        upsert(&mut slots, key.id, Arc::new(new));
        *self.slots.write() = slots;
        self.version.fetch_add(1, Ordering::Release);
        true
    }

    pub fn get_and_remove<T: Clone + Send + Sync + 'static>(
        &self,
        key: AttributeKey<T>,
    ) -> Option<T> {
        let _guard = self.write_lock.lock();
        let mut slots = self.slots.read().clone_inner();
        let idx = binary_search(&slots, key.id).ok()?;
        let previous = slots[idx].value.downcast_ref::<T>().cloned();
        slots.remove(idx);
        *self.slots.write() = slots;
        self.version.fetch_add(1, Ordering::Release);
        previous
    }

    pub fn remove<T>(&self, key: AttributeKey<T>) {
        let _guard = self.write_lock.lock();
        let mut slots = self.slots.read().clone_inner();
        if let Ok(idx) = binary_search(&slots, key.id) {
            slots.remove(idx);
            *self.slots.write() = slots;
            self.version.fetch_add(1, Ordering::Release);
        }
    }
}

trait CloneInner {
    fn clone_inner(&self) -> Vec<Slot>;
}

impl CloneInner for Vec<Slot> {
    fn clone_inner(&self) -> Vec<Slot> {
        self.iter()
            .map(|s| Slot {
                id: s.id,
                value: s.value.clone(),
            })
            .collect()
    }
}

fn binary_search(slots: &[Slot], id: u32) -> Result<usize, usize> {
    slots.binary_search_by_key(&id, |s| s.id)
}

fn upsert(slots: &mut Vec<Slot>, id: u32, value: Arc<dyn Any + Send + Sync>) {
    match binary_search(slots, id) {
        Ok(idx) => slots[idx] = Slot { id, value },
        Err(idx) => slots.insert(idx, Slot { id, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;

    #[test]
    fn set_then_get_round_trips() {
        let key = AttributeKey::<u32>::new();
        let map = AttributeMap::new();
        assert_eq!(map.attr(key).get(), None);
        map.attr(key).set(42);
        assert_eq!(map.attr(key).get(), Some(42));
    }

    #[test]
    fn compare_and_set_absent_has_one_winner() {
        let key = AttributeKey::<&'static str>::new();
        let map = StdArc::new(AttributeMap::new());

        let map_a = map.clone();
        let a = thread::spawn(move || map_a.compare_and_set_absent(key, "a"));
        let map_b = map.clone();
        let b = thread::spawn(move || map_b.compare_and_set_absent(key, "b"));

        let (won_a, won_b) = (a.join().unwrap(), b.join().unwrap());
        assert_ne!(won_a, won_b);

        let final_value = map.attr(key).get().unwrap();
        assert!(final_value == "a" || final_value == "b");
    }

    #[test]
    fn remove_clears_has_attr() {
        let key = AttributeKey::<i32>::new();
        let map = AttributeMap::new();
        map.attr(key).set(7);
        assert!(map.has_attr(key));
        map.attr(key).remove();
        assert!(!map.has_attr(key));
    }
}
