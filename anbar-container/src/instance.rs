//! Type-erased instances and constructor manifests.
//!
//! The container stores every resolved value as an [`Instance`]: a shared
//! handle wrapping an `Arc<T>`. Because the `Arc<T>` itself is what gets
//! erased, `T` may be unsized and trait-object bindings come back out as
//! `Arc<dyn Trait>` with no extra wrapping.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use crate::error::{AnbarError, Result};
use crate::key::DependencyKey;

/// A resolved value, shared by every holder of a clone.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    /// Wraps an owned value.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an existing shared value, possibly a trait object.
    pub fn from_arc<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Returns the value as `Arc<T>` if it was stored as `T`.
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// Like [`downcast`](Self::downcast), reporting `key` on mismatch.
    pub fn downcast_for<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &DependencyKey,
    ) -> Result<Arc<T>> {
        self.downcast::<T>().ok_or(AnbarError::TypeMismatch {
            key: *key,
            expected: type_name::<T>(),
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both handles point at the same stored value.
    pub fn same_as(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A type the container can build from a statically declared dependency list.
///
/// Usually derived with `#[derive(Injectable)]`; hand-written impls must
/// consume the [`Dependencies`] in the same order [`dependencies`](Self::dependencies)
/// lists them.
///
/// ```
/// use std::sync::Arc;
/// use anbar_container::instance::{Dependencies, Injectable};
/// use anbar_container::key::DependencyKey;
/// use anbar_container::Result;
///
/// struct Clock;
/// struct Scheduler { clock: Arc<Clock> }
///
/// impl Injectable for Scheduler {
///     fn dependencies() -> Vec<DependencyKey> {
///         vec![DependencyKey::of::<Clock>()]
///     }
///
///     fn construct(deps: &mut Dependencies) -> Result<Self> {
///         Ok(Scheduler { clock: deps.next()? })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Keys to resolve before construction, in argument order.
    fn dependencies() -> Vec<DependencyKey>;

    /// Builds the value from the resolved dependencies.
    fn construct(deps: &mut Dependencies) -> Result<Self>;
}

/// Resolved constructor arguments, handed out in declaration order.
pub struct Dependencies {
    owner: DependencyKey,
    resolved: std::vec::IntoIter<(DependencyKey, Instance)>,
}

impl Dependencies {
    /// Pairs each declared key with its resolved instance.
    pub fn new(owner: DependencyKey, keys: &[DependencyKey], values: Vec<Instance>) -> Self {
        let resolved: Vec<_> = keys.iter().copied().zip(values).collect();
        Self {
            owner,
            resolved: resolved.into_iter(),
        }
    }

    /// Takes the next argument as `Arc<T>`.
    pub fn next<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let (key, instance) = self.resolved.next().ok_or_else(|| {
            AnbarError::construction(
                self.owner,
                format!(
                    "constructor asked for more arguments than its manifest declares (wanted {})",
                    type_name::<T>()
                ),
            )
        })?;
        instance.downcast_for::<T>(&key)
    }

    /// The key being constructed.
    pub fn owner(&self) -> DependencyKey {
        self.owner
    }

    pub fn remaining(&self) -> usize {
        self.resolved.len()
    }
}
