use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Why an entry left an [`ExpiringLru`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// Capacity exceeded; the least recently used entry went
    Capacity,
    /// Time-to-live elapsed
    Expired,
    /// Explicit `remove`
    Removed,
}

type EvictFn<K, V> = Box<dyn Fn(&K, &V, EvictReason) + Send + Sync>;

struct Slot<V> {
    value: V,
    inserted: Instant,
    last_used: u64,
}

struct State<K, V> {
    slots: HashMap<K, Slot<V>>,
    tick: u64,
}

/// A bounded map whose entries expire a fixed time after insertion.
///
/// Every access first drops expired entries. The eviction callback runs
/// for each entry that leaves the map, outside the internal lock.
pub struct ExpiringLru<K, V> {
    capacity: usize,
    ttl: Duration,
    state: Mutex<State<K, V>>,
    on_evict: Option<EvictFn<K, V>>,
}

impl<K, V> ExpiringLru<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            state: Mutex::new(State {
                slots: HashMap::new(),
                tick: 0,
            }),
            on_evict: None,
        }
    }

    pub fn with_eviction(
        mut self,
        on_evict: impl Fn(&K, &V, EvictReason) + Send + Sync + 'static,
    ) -> Self {
        self.on_evict = Some(Box::new(on_evict));
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let (value, evicted) = {
            let mut state = self.lock();
            let evicted = self.take_expired(&mut state);
            state.tick += 1;
            let tick = state.tick;
            let value = state.slots.get_mut(key).map(|slot| {
                slot.last_used = tick;
                slot.value.clone()
            });
            (value, evicted)
        };
        self.notify(evicted);
        value
    }

    /// Whether `key` is present, without touching recency.
    pub fn contains(&self, key: &K) -> bool {
        let (present, evicted) = {
            let mut state = self.lock();
            let evicted = self.take_expired(&mut state);
            (state.slots.contains_key(key), evicted)
        };
        self.notify(evicted);
        present
    }

    /// Insert or overwrite `key`. Overwriting restarts its time-to-live and
    /// does not run the eviction callback for the old value.
    pub fn insert(&self, key: K, value: V) {
        let evicted = {
            let mut state = self.lock();
            let mut evicted = self.take_expired(&mut state);
            self.put(&mut state, key, value);
            evicted.extend(self.take_overflow(&mut state));
            evicted
        };
        self.notify(evicted);
    }

    /// Insert `key` only if it is absent. Returns `false` if it was present.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let (inserted, evicted) = {
            let mut state = self.lock();
            let mut evicted = self.take_expired(&mut state);
            if state.slots.contains_key(&key) {
                (false, evicted)
            } else {
                self.put(&mut state, key, value);
                evicted.extend(self.take_overflow(&mut state));
                (true, evicted)
            }
        };
        self.notify(evicted);
        inserted
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let (value, evicted) = {
            let mut state = self.lock();
            let mut evicted = self.take_expired(&mut state);
            let value = state.slots.remove(key).map(|slot| slot.value);
            if let Some(value) = &value {
                evicted.push((key.clone(), value.clone(), EvictReason::Removed));
            }
            (value, evicted)
        };
        self.notify(evicted);
        value
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let evicted = {
            let mut state = self.lock();
            self.take_expired(&mut state)
        };
        let count = evicted.len();
        self.notify(evicted);
        count
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<K, V>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn put(&self, state: &mut State<K, V>, key: K, value: V) {
        state.tick += 1;
        let slot = Slot {
            value,
            inserted: Instant::now(),
            last_used: state.tick,
        };
        state.slots.insert(key, slot);
    }

    fn take_expired(&self, state: &mut State<K, V>) -> Vec<(K, V, EvictReason)> {
        let now = Instant::now();
        let expired: Vec<K> = state
            .slots
            .iter()
            .filter(|(_, slot)| now.duration_since(slot.inserted) >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| {
                let slot = state.slots.remove(&key)?;
                Some((key, slot.value, EvictReason::Expired))
            })
            .collect()
    }

    fn take_overflow(&self, state: &mut State<K, V>) -> Vec<(K, V, EvictReason)> {
        let mut evicted = Vec::new();
        while state.slots.len() > self.capacity {
            let Some(oldest) = state
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            if let Some(slot) = state.slots.remove(&oldest) {
                evicted.push((oldest, slot.value, EvictReason::Capacity));
            }
        }
        evicted
    }

    fn notify(&self, evicted: Vec<(K, V, EvictReason)>) {
        let Some(on_evict) = &self.on_evict else {
            return;
        };
        for (key, value, reason) in evicted {
            on_evict(&key, &value, reason);
        }
    }
}
