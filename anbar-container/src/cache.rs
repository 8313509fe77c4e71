//! Instance caches for singleton and scoped bindings.
//!
//! Each key gets its own [`OnceCell`] slot. The map shard is locked only
//! long enough to fetch or create the slot; construction then runs inside
//! the slot, so two callers racing on one key build it once while callers
//! on other keys never wait.
//!
//! Waiting on a slot another thread is filling is recorded, so two threads
//! building each other's dependencies fail with a cycle instead of blocking
//! forever.

use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use anbar_support::rendering::render_chain;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{trace, warn};

use crate::error::{AnbarError, CircularDependencyError, Result};
use crate::instance::Instance;
use crate::key::DependencyKey;

type Slot = Arc<OnceCell<Instance>>;

/// Per-key get-or-create store.
#[derive(Debug, Default)]
pub struct InstanceCache {
    slots: DashMap<DependencyKey, Slot>,
    /// Key → thread running its construction.
    builders: DashMap<DependencyKey, ThreadId>,
    /// Thread → key it is blocked on.
    waiting: DashMap<ThreadId, DependencyKey>,
}

/// Removes a table entry when dropped.
struct Claim<'a, K: Eq + Hash, V> {
    table: &'a DashMap<K, V>,
    key: K,
}

impl<K: Eq + Hash, V> Drop for Claim<'_, K, V> {
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached instance for `key`, building it with `create` on a miss.
    ///
    /// A failing `create` leaves the slot empty, so the next call retries.
    ///
    /// # Errors
    /// Whatever `create` returns, or [`AnbarError::CircularDependency`] when
    /// waiting for `key` would wait on this thread's own construction.
    pub fn get_or_create<F>(&self, key: &DependencyKey, create: F) -> Result<Instance>
    where
        F: FnOnce() -> Result<Instance>,
    {
        if let Some(hit) = self.get(key) {
            trace!(key = %key, "Cache hit");
            return Ok(hit);
        }

        let slot = self.slot(key);
        let me = thread::current().id();
        let _waiting = self.wait_for(me, key)?;

        slot.get_or_try_init(|| {
            self.waiting.remove(&me);
            self.builders.insert(*key, me);
            let _building = Claim {
                table: &self.builders,
                key: *key,
            };
            create()
        })
        .cloned()
    }

    /// Records that `me` is about to block on `key`, failing if the threads
    /// it would wait on are themselves waiting on `me`.
    fn wait_for(&self, me: ThreadId, key: &DependencyKey) -> Result<Claim<'_, ThreadId, DependencyKey>> {
        self.waiting.insert(me, *key);
        let claim = Claim {
            table: &self.waiting,
            key: me,
        };

        if let Some(chain) = self.wait_cycle(me, key) {
            let names: Vec<String> = chain.iter().map(DependencyKey::short_name).collect();
            warn!(cycle = %render_chain(&names), "Circular dependency across threads");
            return Err(AnbarError::CircularDependency(CircularDependencyError { chain }));
        }
        Ok(claim)
    }

    /// Follows builder → awaited key links starting at `key`.
    fn wait_cycle(&self, me: ThreadId, key: &DependencyKey) -> Option<Vec<DependencyKey>> {
        let mut chain = vec![*key];
        let mut next = *key;
        for _ in 0..=self.waiting.len() {
            let owner = *self.builders.get(&next)?;
            if owner == me {
                chain.insert(0, next);
                return Some(chain);
            }
            next = *self.waiting.get(&owner)?;
            chain.push(next);
        }
        None
    }

    /// Cached instance, if one has finished construction.
    pub fn get(&self, key: &DependencyKey) -> Option<Instance> {
        self.slots.get(key).and_then(|slot| slot.value().get().cloned())
    }

    pub fn contains(&self, key: &DependencyKey) -> bool {
        self.get(key).is_some()
    }

    /// Forgets one key. An in-flight construction finishes into a detached slot.
    pub fn evict(&self, key: &DependencyKey) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Drops every cached instance.
    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Number of constructed instances.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &DependencyKey) -> Slot {
        self.slots
            .entry(*key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone()
    }
}
