//! # The Container: resolution engine of Anbar
//!
//! Owns the binding registry and the singleton cache, hands out units of
//! work, and resolves keys into instances.
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──> Container ──begin_unit()──> UnitOfWork
//!                                  │                          (scoped cache)
//!                                  │ miss
//!                                  ▼
//!                           DeferredResolver (installed by the Bootstrapper)
//! ```
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use anbar_container::prelude::*;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str);
//! }
//!
//! struct StdoutLogger;
//! impl Logger for StdoutLogger {
//!     fn log(&self, msg: &str) { println!("{msg}"); }
//! }
//!
//! struct RequestId(u64);
//!
//! let container = Container::builder()
//!     .singleton::<dyn Logger>(|_| Ok(Arc::new(StdoutLogger) as Arc<dyn Logger>))
//!     .scoped::<RequestId>(|r| Ok(Arc::new(RequestId(r.unit().map_or(0, |u| u.id())))))
//!     .build()
//!     .expect("container");
//!
//! let logger = container.resolve::<dyn Logger>().expect("logger");
//! logger.log("booted");
//!
//! let scope = container.create_scope();
//! let first = scope.resolve::<RequestId>().expect("request id");
//! let second = scope.resolve::<RequestId>().expect("request id");
//! assert!(Arc::ptr_eq(&first, &second));
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use anbar_support::rendering::{render_chain, suggest_similar};
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::cache::InstanceCache;
use crate::config::ContainerSettings;
use crate::error::{
    AnbarError, CircularDependencyError, Result, ScopeMisuseError, ScopeMisuseReason,
    UnregisteredBindingError,
};
use crate::graph::{DependencyInfo, GraphValidator};
use crate::instance::{Dependencies, Injectable, Instance};
use crate::key::DependencyKey;
use crate::provider::{ProviderRegistry, Registrar};
use crate::registry::{Binding, Previous, Registry, Resolver, Strategy};
use crate::scope::Scope;
use crate::unit::UnitOfWork;

const MAX_SUGGESTIONS: usize = 3;

// ============================================================
// ContainerBuilder
// ============================================================

/// Builds a [`Container`] from direct registrations.
///
/// Registration errors are kept and reported by [`build()`](Self::build),
/// so the chain reads top to bottom without `?` on every line.
pub struct ContainerBuilder {
    registry: Registry,
    settings: ContainerSettings,
    first_error: Option<AnbarError>,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self {
            registry: Registry::new(),
            settings: ContainerSettings::default(),
            first_error: None,
        }
    }

    /// Replace the whole settings block.
    pub fn settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Allow later registrations to replace earlier ones.
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.settings.allow_override = allow;
        self
    }

    // ── Fixed instances ──

    /// A value supplied now, always singleton.
    pub fn instance<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.bind(DependencyKey::of::<T>(), Strategy::instance(value), Scope::Singleton)
    }

    /// A shared value supplied now, possibly a trait object.
    pub fn instance_arc<T: ?Sized + Send + Sync + 'static>(self, value: Arc<T>) -> Self {
        self.bind(
            DependencyKey::of::<T>(),
            Strategy::Instance(Instance::from_arc(value)),
            Scope::Singleton,
        )
    }

    // ── Factories ──

    /// Singleton factory, run once on first resolve.
    pub fn singleton<T: ?Sized + Send + Sync + 'static>(
        self,
        factory: impl Fn(&dyn Resolver) -> Result<Arc<T>> + Send + Sync + 'static,
    ) -> Self {
        self.bind(DependencyKey::of::<T>(), Strategy::factory(factory), Scope::Singleton)
    }

    /// Scoped factory, run once per unit of work.
    pub fn scoped<T: ?Sized + Send + Sync + 'static>(
        self,
        factory: impl Fn(&dyn Resolver) -> Result<Arc<T>> + Send + Sync + 'static,
    ) -> Self {
        self.bind(DependencyKey::of::<T>(), Strategy::factory(factory), Scope::Scoped)
    }

    /// Transient factory, run on every resolve.
    pub fn transient<T: ?Sized + Send + Sync + 'static>(
        self,
        factory: impl Fn(&dyn Resolver) -> Result<Arc<T>> + Send + Sync + 'static,
    ) -> Self {
        self.bind(DependencyKey::of::<T>(), Strategy::factory(factory), Scope::Transient)
    }

    // ── Concrete construction ──

    /// Build `T` from its declared dependency manifest.
    pub fn construct<T: Injectable>(self, scope: Scope) -> Self {
        self.bind(DependencyKey::of::<T>(), Strategy::construct::<T>(), scope)
    }

    /// Make `from` resolve through `to`.
    pub fn alias(mut self, from: DependencyKey, to: DependencyKey) -> Self {
        if self.first_error.is_none() {
            if let Err(e) = self.registry.register_alias(from, to, self.settings.allow_override) {
                self.first_error = Some(e);
            }
        }
        self
    }

    /// Raw registration.
    pub fn bind(mut self, key: DependencyKey, strategy: Strategy, scope: Scope) -> Self {
        if let Err(e) = ProviderRegistry::register_binding(&mut self, Binding::new(key, strategy, scope)) {
            if self.first_error.is_none() {
                self.first_error = Some(e);
            }
        }
        self
    }

    /// Finish building.
    ///
    /// # Errors
    /// The first registration error, typically [`AnbarError::DuplicateBinding`].
    pub fn build(self) -> Result<Container> {
        if let Some(error) = self.first_error {
            return Err(error);
        }
        debug!(registered = self.registry.len(), "Container built");
        Ok(Container::from_parts(self.registry, self.settings))
    }
}

impl ProviderRegistry for ContainerBuilder {
    fn register_binding(&mut self, binding: Binding) -> Result<()> {
        self.registry
            .register(binding, self.settings.allow_override)
            .map(|_| ())
    }

    fn register_alias(&mut self, from: DependencyKey, to: DependencyKey) -> Result<()> {
        self.registry
            .register_alias(from, to, self.settings.allow_override)
    }
}

// ═══════════════════════════════════════════
// Deferred hook
// ═══════════════════════════════════════════

/// Hook the container consults when a key has no binding.
///
/// The [`Bootstrapper`](crate::bootstrap::Bootstrapper) installs one that
/// activates deferred providers on demand.
pub trait DeferredResolver: Send + Sync {
    /// Whether a pending provider promises `key`.
    fn provides(&self, key: &DependencyKey) -> bool;

    /// Activates the provider promising `key`.
    ///
    /// `Ok(true)` if a provider for `key` is now active; `Ok(false)` if
    /// none is indexed or the call re-entered an activation in progress.
    /// The container retries the lookup either way.
    fn activate(&self, key: &DependencyKey, container: &Container) -> Result<bool>;

    /// Every key still promised by a pending provider.
    fn pending_keys(&self) -> Vec<DependencyKey>;

    /// Whether lookups of `key` must go through [`activate`](Self::activate)
    /// even when a binding exists.
    ///
    /// True while the owning provider has not finished activating, so only
    /// the activating thread sees the bindings it has staged so far.
    fn guards(&self, _key: &DependencyKey) -> bool {
        false
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Thread-safe container shared by every unit of work.
///
/// The registry is mostly read after bootstrap; [`register`](Self::register)
/// stays available for providers and deferred activation.
pub struct Container {
    registry: RwLock<Registry>,
    singletons: InstanceCache,
    deferred: RwLock<Option<Arc<dyn DeferredResolver>>>,
    settings: ContainerSettings,
    next_unit_id: AtomicU64,
    active_units: Arc<AtomicUsize>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// An empty container with default settings.
    pub fn new() -> Self {
        Self::with_settings(ContainerSettings::default())
    }

    pub fn with_settings(settings: ContainerSettings) -> Self {
        Self::from_parts(Registry::new(), settings)
    }

    /// Start a builder.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    fn from_parts(registry: Registry, settings: ContainerSettings) -> Self {
        Self {
            registry: RwLock::new(registry),
            singletons: InstanceCache::new(),
            deferred: RwLock::new(None),
            settings,
            next_unit_id: AtomicU64::new(1),
            active_units: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    // ── Registration ──

    /// Binds `key` to `strategy` with lifetime `scope`.
    ///
    /// # Errors
    /// [`AnbarError::DuplicateBinding`] if `key` is bound and overrides are off.
    pub fn register(&self, key: DependencyKey, strategy: Strategy, scope: Scope) -> Result<()> {
        self.register_binding(Binding::new(key, strategy, scope))
    }

    pub fn register_binding(&self, binding: Binding) -> Result<()> {
        self.insert_binding(binding).map(|_| ())
    }

    /// Make `from` resolve through `to`.
    pub fn alias(&self, from: DependencyKey, to: DependencyKey) -> Result<()> {
        self.insert_alias(from, to).map(|_| ())
    }

    /// Registers `binding` and reports what its key resolved through before.
    pub(crate) fn insert_binding(&self, binding: Binding) -> Result<Option<Previous>> {
        let key = binding.key;
        let mut registry = self.registry.write();
        let previous = registry.previous(&key);
        registry.register(binding, self.settings.allow_override)?;
        if previous.is_some() {
            self.singletons.evict(&key);
        }
        Ok(previous)
    }

    pub(crate) fn insert_alias(&self, from: DependencyKey, to: DependencyKey) -> Result<Option<Previous>> {
        let mut registry = self.registry.write();
        let previous = registry.previous(&from);
        registry.register_alias(from, to, self.settings.allow_override)?;
        if previous.is_some() {
            self.singletons.evict(&from);
        }
        Ok(previous)
    }

    /// Replaces a binding regardless of settings and forgets its cached singleton.
    ///
    /// Meant for tests; not coordinated with resolutions running concurrently.
    pub fn override_binding(&self, binding: Binding) -> Option<Binding> {
        let key = binding.key;
        let replaced = self.registry.write().register(binding, true).ok().flatten();
        self.singletons.evict(&key);
        debug!(key = %key, replaced = replaced.is_some(), "Binding overridden");
        replaced
    }

    /// Registration handle that remembers what it registered.
    pub fn registrar(&self) -> Registrar<'_> {
        Registrar::new(self)
    }

    /// Drops `keys` and their cached singletons, then puts back what they replaced.
    pub(crate) fn roll_back(&self, keys: &[DependencyKey], replaced: Vec<(DependencyKey, Previous)>) {
        let mut registry = self.registry.write();
        for key in keys {
            registry.remove(key);
            self.singletons.evict(key);
        }
        // Newest first, so a key replaced twice ends on its original entry.
        for (key, previous) in replaced.into_iter().rev() {
            registry.restore(key, previous);
        }
    }

    // ── Lookup ──

    /// The binding `key` resolves through, if any.
    pub fn lookup(&self, key: &DependencyKey) -> Option<Binding> {
        self.registry.read().get(key).cloned()
    }

    /// Whether `key` has a binding right now.
    pub fn is_bound(&self, key: &DependencyKey) -> bool {
        self.registry.read().contains(key)
    }

    /// Whether `key` is bound or promised by a pending deferred provider.
    pub fn can_resolve(&self, key: &DependencyKey) -> bool {
        self.is_bound(key)
            || self
                .deferred_resolver()
                .is_some_and(|hook| hook.provides(key))
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    // ── Deferred hook ──

    /// Installs the hook consulted on lookup misses, replacing any previous one.
    pub fn set_deferred_resolver(&self, hook: Arc<dyn DeferredResolver>) {
        *self.deferred.write() = Some(hook);
    }

    fn deferred_resolver(&self) -> Option<Arc<dyn DeferredResolver>> {
        self.deferred.read().clone()
    }

    // ── Units of work ──

    /// Starts a unit of work with a fresh scoped cache.
    pub fn begin_unit(&self) -> UnitOfWork {
        let id = self.next_unit_id.fetch_add(1, Ordering::Relaxed);
        UnitOfWork::begin(id, self.active_units.clone())
    }

    /// Ends a unit of work, releasing every scoped instance it holds.
    pub fn end_unit(&self, unit: UnitOfWork) {
        unit.end();
    }

    /// A unit of work that ends itself when dropped.
    pub fn create_scope(&self) -> ScopedContainer<'_> {
        ScopedContainer {
            container: self,
            unit: self.begin_unit(),
        }
    }

    /// Units begun and not yet ended.
    pub fn active_units(&self) -> usize {
        self.active_units.load(Ordering::Acquire)
    }

    // ── Resolution ──

    /// Resolves `T` with no unit of work.
    ///
    /// ```rust,ignore
    /// let pool: Arc<Pool> = container.resolve()?;
    /// ```
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_typed(DependencyKey::of::<T>(), None)
    }

    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        self.resolve_typed(DependencyKey::named::<T>(name), None)
    }

    /// Resolves `T` inside `unit`.
    pub fn resolve_in<T: ?Sized + Send + Sync + 'static>(&self, unit: &UnitOfWork) -> Result<Arc<T>> {
        self.resolve_typed(DependencyKey::of::<T>(), Some(unit))
    }

    pub fn resolve_named_in<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &'static str,
        unit: &UnitOfWork,
    ) -> Result<Arc<T>> {
        self.resolve_typed(DependencyKey::named::<T>(name), Some(unit))
    }

    /// Type-erased resolution; starts a fresh resolution stack.
    ///
    /// # Errors
    /// - [`AnbarError::UnregisteredBinding`]: no binding and no deferred provider
    /// - [`AnbarError::CircularDependency`]: the key is already under construction
    /// - [`AnbarError::ScopeMisuse`]: scoped key without a live unit
    /// - [`AnbarError::ProviderActivation`]: a deferred provider failed
    pub fn resolve_key(&self, key: &DependencyKey, unit: Option<&UnitOfWork>) -> Result<Instance> {
        ResolutionContext::new(self, unit).resolve_key(key)
    }

    fn resolve_typed<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: DependencyKey,
        unit: Option<&UnitOfWork>,
    ) -> Result<Arc<T>> {
        self.resolve_key(&key, unit)?.downcast_for::<T>(&key)
    }

    /// Binding lookup that falls back to deferred activation once.
    ///
    /// Keys of a provider still activating wait for it first.
    fn binding_for(&self, key: &DependencyKey, required_by: Option<DependencyKey>) -> Result<Binding> {
        let hook = self.deferred_resolver();
        let guarded = hook.as_ref().is_some_and(|hook| hook.guards(key));
        if !guarded {
            if let Some(binding) = self.lookup(key) {
                return Ok(binding);
            }
        }

        if let Some(hook) = hook {
            // Retry even on `false`: a re-entrant call from the activating
            // provider sees its staged bindings, and another thread may have
            // finished the activation between the miss and the hook call.
            hook.activate(key, self)?;
            if let Some(binding) = self.lookup(key) {
                return Ok(binding);
            }
        }

        Err(self.unregistered(key, required_by))
    }

    fn unregistered(&self, key: &DependencyKey, required_by: Option<DependencyKey>) -> AnbarError {
        let known = self.registry.read().registered_keys();
        let names: Vec<&'static str> = known
            .into_iter()
            .filter(|k| k != key)
            .map(|k| k.type_name())
            .collect();

        debug!(key = %key, "Lookup miss");
        AnbarError::UnregisteredBinding(UnregisteredBindingError {
            requested: *key,
            required_by,
            suggestions: suggest_similar(key.type_name(), &names, MAX_SUGGESTIONS),
        })
    }

    // ── Validation ──

    /// Checks every declared dependency manifest.
    ///
    /// Keys promised by pending deferred providers count as present.
    ///
    /// # Errors
    /// [`AnbarError::UnregisteredBinding`], [`AnbarError::CircularDependency`]
    /// or [`AnbarError::ScopeMismatch`].
    pub fn validate(&self) -> Result<()> {
        let infos: HashMap<DependencyKey, DependencyInfo> = {
            let registry = self.registry.read();
            registry
                .registered_keys()
                .into_iter()
                .filter_map(|key| {
                    let binding = registry.get(&key)?;
                    let dependencies = if binding.key == key {
                        binding.strategy.dependencies().to_vec()
                    } else {
                        vec![binding.key]
                    };
                    Some((
                        key,
                        DependencyInfo {
                            key,
                            dependencies,
                            scope: binding.scope,
                        },
                    ))
                })
                .collect()
        };

        let deferred = self
            .deferred_resolver()
            .map(|hook| hook.pending_keys())
            .unwrap_or_default();

        GraphValidator::new(infos, deferred.into_iter().collect()).validate()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registered", &self.len())
            .field("singletons", &self.singletons.len())
            .field("active_units", &self.active_units())
            .finish()
    }
}

// ═══════════════════════════════════════════
// ScopedContainer
// ═══════════════════════════════════════════

/// A unit of work bound to its container; ends the unit on drop.
pub struct ScopedContainer<'a> {
    container: &'a Container,
    unit: UnitOfWork,
}

impl ScopedContainer<'_> {
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.container.resolve_in::<T>(&self.unit)
    }

    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        self.container.resolve_named_in::<T>(name, &self.unit)
    }

    pub fn unit(&self) -> &UnitOfWork {
        &self.unit
    }

    pub fn container(&self) -> &Container {
        self.container
    }
}

impl Drop for ScopedContainer<'_> {
    fn drop(&mut self) {
        self.unit.end();
    }
}

impl fmt::Debug for ScopedContainer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedContainer")
            .field("unit", &self.unit)
            .finish()
    }
}

// ═══════════════════════════════════════════
// ResolutionContext (one top-level resolve)
// ═══════════════════════════════════════════

/// State of one top-level resolve: the unit and the resolution stack.
struct ResolutionContext<'a> {
    container: &'a Container,
    unit: Option<&'a UnitOfWork>,
    stack: RefCell<Vec<DependencyKey>>,
}

/// Pops its key when dropped, on success and error alike.
struct StackFrame<'s> {
    stack: &'s RefCell<Vec<DependencyKey>>,
}

impl Drop for StackFrame<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

impl<'a> ResolutionContext<'a> {
    fn new(container: &'a Container, unit: Option<&'a UnitOfWork>) -> Self {
        Self {
            container,
            unit,
            stack: RefCell::new(Vec::new()),
        }
    }

    fn enter(&self, key: &DependencyKey) -> Result<StackFrame<'_>> {
        let mut stack = self.stack.borrow_mut();

        if let Some(start) = stack.iter().position(|k| k == key) {
            let mut chain = stack[start..].to_vec();
            chain.push(*key);
            let names: Vec<String> = chain.iter().map(DependencyKey::short_name).collect();
            warn!(cycle = %render_chain(&names), "Circular dependency detected");
            return Err(AnbarError::CircularDependency(CircularDependencyError { chain }));
        }

        stack.push(*key);
        Ok(StackFrame { stack: &self.stack })
    }

    /// The key whose construction is asking for the current one.
    fn parent(&self) -> Option<DependencyKey> {
        let stack = self.stack.borrow();
        stack.len().checked_sub(2).map(|i| stack[i])
    }

    fn construct(&self, binding: &Binding) -> Result<Instance> {
        match &binding.strategy {
            Strategy::Instance(instance) => Ok(instance.clone()),
            Strategy::Factory(factory) => factory(self),
            Strategy::Construct {
                dependencies,
                constructor,
            } => {
                let resolved = dependencies
                    .iter()
                    .map(|dep| self.resolve_key(dep))
                    .collect::<Result<Vec<_>>>()?;
                let mut args = Dependencies::new(binding.key, dependencies, resolved);
                constructor(&mut args)
            }
        }
    }

    fn scoped_unit(&self, key: &DependencyKey) -> Result<&'a UnitOfWork> {
        let unit = self.unit.ok_or_else(|| {
            AnbarError::ScopeMisuse(ScopeMisuseError {
                key: *key,
                reason: ScopeMisuseReason::NoActiveUnit,
            })
        })?;

        if unit.is_ended() {
            return Err(AnbarError::ScopeMisuse(ScopeMisuseError {
                key: *key,
                reason: ScopeMisuseReason::UnitEnded { unit: unit.id() },
            }));
        }
        Ok(unit)
    }
}

impl Resolver for ResolutionContext<'_> {
    fn resolve_key(&self, key: &DependencyKey) -> Result<Instance> {
        let _frame = self.enter(key)?;
        let binding = self.container.binding_for(key, self.parent())?;
        trace!(key = %key, scope = %binding.scope, strategy = binding.strategy.kind(), "Resolving");

        if let Strategy::Instance(instance) = &binding.strategy {
            return Ok(instance.clone());
        }

        match binding.scope {
            Scope::Singleton => self
                .container
                .singletons
                .get_or_create(&binding.key, || self.construct(&binding)),
            Scope::Scoped => {
                let unit = self.scoped_unit(key)?;
                let instance = unit
                    .cache()
                    .get_or_create(&binding.key, || self.construct(&binding))?;
                if unit.is_ended() {
                    // Ended mid-construction: do not leave the value in the released cache.
                    unit.cache().evict(&binding.key);
                }
                Ok(instance)
            }
            Scope::Transient => self.construct(&binding),
        }
    }

    fn unit(&self) -> Option<&UnitOfWork> {
        self.unit
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder, DeferredResolver, ScopedContainer};
    pub use crate::bootstrap::{Bootstrapper, ProviderDescriptor};
    pub use crate::error::{AnbarError, Result};
    pub use crate::injector::{InjectableMethod, KnownArgs, Method, MethodInjector};
    pub use crate::instance::{Dependencies, Injectable, Instance};
    pub use crate::key::DependencyKey;
    pub use crate::provider::{ProviderRegistry, RegistryExt, ServiceProvider};
    pub use crate::registry::{Binding, Resolver, ResolverApi, Strategy};
    pub use crate::scope::Scope;
    pub use crate::unit::UnitOfWork;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ResolverApi;
    use std::sync::atomic::AtomicU32;

    struct Logger;
    #[derive(Debug)]
    struct RequestId(u64);
    struct Widget {
        logger: Arc<Logger>,
        request: Arc<RequestId>,
    }

    impl Injectable for Widget {
        fn dependencies() -> Vec<DependencyKey> {
            vec![DependencyKey::of::<Logger>(), DependencyKey::of::<RequestId>()]
        }

        fn construct(deps: &mut Dependencies) -> Result<Self> {
            Ok(Widget {
                logger: deps.next()?,
                request: deps.next()?,
            })
        }
    }

    fn widget_container() -> Container {
        Container::builder()
            .singleton::<Logger>(|_| Ok(Arc::new(Logger)))
            .scoped::<RequestId>(|r| Ok(Arc::new(RequestId(r.unit().map_or(0, UnitOfWork::id)))))
            .construct::<Widget>(Scope::Transient)
            .build()
            .unwrap()
    }

    #[test]
    fn instance_binding_is_shared() {
        let container = Container::builder().instance(42u32).build().unwrap();
        let a = container.resolve::<u32>().unwrap();
        let b = container.resolve::<u32>().unwrap();
        assert_eq!(*a, 42);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn fixed_instance_resolves_without_unit_whatever_its_scope() {
        let container = Container::new();
        container
            .register_binding(Binding {
                key: DependencyKey::of::<u8>(),
                strategy: Strategy::instance(7u8),
                scope: Scope::Scoped,
            })
            .unwrap();

        assert_eq!(*container.resolve::<u8>().unwrap(), 7);
    }

    #[test]
    fn singleton_factory_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let container = Container::builder()
            .singleton::<Logger>({
                let calls = calls.clone();
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(Logger))
                }
            })
            .build()
            .unwrap();

        for _ in 0..3 {
            container.resolve::<Logger>().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_is_fresh_every_time() {
        let container = Container::builder()
            .transient::<Logger>(|_| Ok(Arc::new(Logger)))
            .build()
            .unwrap();

        let a = container.resolve::<Logger>().unwrap();
        let b = container.resolve::<Logger>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn widget_scenario_across_units() {
        let container = widget_container();

        let u1 = container.begin_unit();
        let u2 = container.begin_unit();
        let w1 = container.resolve_in::<Widget>(&u1).unwrap();
        let w2 = container.resolve_in::<Widget>(&u1).unwrap();
        let w3 = container.resolve_in::<Widget>(&u2).unwrap();

        assert!(Arc::ptr_eq(&w1.logger, &w2.logger));
        assert!(Arc::ptr_eq(&w1.logger, &w3.logger));
        assert!(Arc::ptr_eq(&w1.request, &w2.request));
        assert!(!Arc::ptr_eq(&w1.request, &w3.request));
        assert_eq!(w3.request.0, u2.id());
        assert!(!Arc::ptr_eq(&w1, &w2));
        assert!(!Arc::ptr_eq(&w2, &w3));

        container.end_unit(u1);
        container.end_unit(u2);
        assert_eq!(container.active_units(), 0);
    }

    #[test]
    fn scoped_without_unit_is_misuse() {
        let container = widget_container();
        match container.resolve::<RequestId>() {
            Err(AnbarError::ScopeMisuse(e)) => {
                assert_eq!(e.reason, ScopeMisuseReason::NoActiveUnit);
            }
            other => panic!("Expected ScopeMisuse, got: {other:?}"),
        }
    }

    #[test]
    fn ended_unit_rejects_scoped() {
        let container = widget_container();
        let unit = container.begin_unit();
        let keep = unit.clone();
        container.end_unit(unit);

        match container.resolve_in::<RequestId>(&keep) {
            Err(AnbarError::ScopeMisuse(e)) => {
                assert_eq!(e.reason, ScopeMisuseReason::UnitEnded { unit: keep.id() });
            }
            other => panic!("Expected ScopeMisuse, got: {other:?}"),
        }
    }

    #[test]
    fn cycle_reports_full_path() {
        #[derive(Debug)]
        struct A;
        #[derive(Debug)]
        struct B;

        let container = Container::builder()
            .transient::<A>(|r| {
                r.resolve::<B>()?;
                Ok(Arc::new(A))
            })
            .transient::<B>(|r| {
                r.resolve::<A>()?;
                Ok(Arc::new(B))
            })
            .build()
            .unwrap();

        match container.resolve::<A>() {
            Err(AnbarError::CircularDependency(e)) => {
                assert_eq!(
                    e.chain,
                    vec![
                        DependencyKey::of::<A>(),
                        DependencyKey::of::<B>(),
                        DependencyKey::of::<A>()
                    ]
                );
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }

        // A failed resolve leaves no stale stack behind.
        match container.resolve::<B>() {
            Err(AnbarError::CircularDependency(e)) => assert_eq!(e.chain[0], DependencyKey::of::<B>()),
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }
    }

    #[test]
    fn unregistered_names_parent_and_suggestions() {
        struct Loggr;
        #[derive(Debug)]
        struct Report;

        let container = Container::builder()
            .singleton::<Logger>(|_| Ok(Arc::new(Logger)))
            .transient::<Report>(|r| {
                r.resolve::<Loggr>()?;
                Ok(Arc::new(Report))
            })
            .build()
            .unwrap();

        match container.resolve::<Report>() {
            Err(AnbarError::UnregisteredBinding(e)) => {
                assert_eq!(e.requested, DependencyKey::of::<Loggr>());
                assert_eq!(e.required_by, Some(DependencyKey::of::<Report>()));
                assert!(e.suggestions.iter().any(|s| s.ends_with("Logger")));
            }
            other => panic!("Expected UnregisteredBinding, got: {other:?}"),
        }
    }

    #[test]
    fn duplicate_surfaces_from_build() {
        let result = Container::builder().instance(1u8).instance(2u8).build();
        assert!(matches!(result, Err(AnbarError::DuplicateBinding(_))));

        let container = Container::builder()
            .allow_override(true)
            .instance(1u8)
            .instance(2u8)
            .build()
            .unwrap();
        assert_eq!(*container.resolve::<u8>().unwrap(), 2);
    }

    #[test]
    fn override_evicts_cached_singleton() {
        let container = Container::builder()
            .singleton::<String>(|_| Ok(Arc::new("real".to_string())))
            .build()
            .unwrap();
        assert_eq!(container.resolve::<String>().unwrap().as_str(), "real");

        container.override_binding(Binding::new(
            DependencyKey::of::<String>(),
            Strategy::instance("fake".to_string()),
            Scope::Singleton,
        ));
        assert_eq!(container.resolve::<String>().unwrap().as_str(), "fake");
    }

    #[test]
    fn named_and_alias_resolution() {
        let container = Container::builder()
            .bind(
                DependencyKey::named::<String>("primary"),
                Strategy::instance("postgres://primary".to_string()),
                Scope::Singleton,
            )
            .alias(DependencyKey::of::<String>(), DependencyKey::named::<String>("primary"))
            .build()
            .unwrap();

        let named = container.resolve_named::<String>("primary").unwrap();
        let via_alias = container.resolve::<String>().unwrap();
        assert!(Arc::ptr_eq(&named, &via_alias));
    }

    #[test]
    fn scope_guard_ends_unit() {
        let container = widget_container();
        {
            let scope = container.create_scope();
            scope.resolve::<Widget>().unwrap();
            assert_eq!(scope.unit().cached_instances(), 1);
            assert_eq!(container.active_units(), 1);
        }
        assert_eq!(container.active_units(), 0);
    }

    #[test]
    fn failing_singleton_is_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let container = Container::builder()
            .singleton::<Logger>({
                let attempts = attempts.clone();
                move |_| {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(AnbarError::construction(DependencyKey::of::<Logger>(), "not yet"))
                    } else {
                        Ok(Arc::new(Logger))
                    }
                }
            })
            .build()
            .unwrap();

        assert!(container.resolve::<Logger>().is_err());
        assert!(container.resolve::<Logger>().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn validate_catches_missing_manifest_entry() {
        let container = Container::builder()
            .singleton::<Logger>(|_| Ok(Arc::new(Logger)))
            .construct::<Widget>(Scope::Transient)
            .build()
            .unwrap();

        match container.validate() {
            Err(AnbarError::UnregisteredBinding(e)) => {
                assert_eq!(e.requested, DependencyKey::of::<RequestId>());
            }
            other => panic!("Expected UnregisteredBinding, got: {other:?}"),
        }
        assert!(widget_container().validate().is_ok());
    }

    #[test]
    fn debug_display() {
        let debug = format!("{:?}", widget_container());
        assert!(debug.contains("Container"));
        assert!(debug.contains("registered: 3"));
    }
}
