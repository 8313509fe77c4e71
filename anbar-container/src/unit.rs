//! Units of work.
//!
//! A [`UnitOfWork`] is one request, job, or CLI run. It owns the scoped
//! cache for that unit: scoped bindings resolved with the same unit share
//! one instance, and everything in the cache is released when the unit
//! ends. Handles are cheap clones of one shared unit; the cache is also
//! released when the last handle is dropped, which covers error paths and
//! cancelled futures that never reach `end_unit`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::debug;

use crate::cache::InstanceCache;

/// Handle to one active (or ended) unit of work.
#[derive(Clone)]
pub struct UnitOfWork {
    inner: Arc<UnitInner>,
}

struct UnitInner {
    id: u64,
    cache: InstanceCache,
    ended: AtomicBool,
    active_units: Arc<AtomicUsize>,
}

impl UnitOfWork {
    pub(crate) fn begin(id: u64, active_units: Arc<AtomicUsize>) -> Self {
        active_units.fetch_add(1, Ordering::AcqRel);
        debug!(unit = id, "Unit of work started");
        Self {
            inner: Arc::new(UnitInner {
                id,
                cache: InstanceCache::new(),
                ended: AtomicBool::new(false),
                active_units,
            }),
        }
    }

    /// Process-unique id, for correlation in logs.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// Number of scoped instances currently held.
    pub fn cached_instances(&self) -> usize {
        self.inner.cache.len()
    }

    pub(crate) fn cache(&self) -> &InstanceCache {
        &self.inner.cache
    }

    /// Ends the unit and releases its scoped instances. Idempotent.
    pub(crate) fn end(&self) {
        self.inner.finish();
    }
}

impl UnitInner {
    fn finish(&self) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = self.cache.len();
        self.cache.clear();
        self.active_units.fetch_sub(1, Ordering::AcqRel);
        debug!(unit = self.id, released, "Unit of work ended");
    }
}

impl Drop for UnitInner {
    fn drop(&mut self) {
        self.finish();
    }
}

impl PartialEq for UnitOfWork {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for UnitOfWork {}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.inner.id)
            .field("ended", &self.is_ended())
            .field("cached", &self.cached_instances())
            .finish()
    }
}
