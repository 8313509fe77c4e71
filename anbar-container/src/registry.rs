//! Binding registry: key → (strategy, scope).
//!
//! The registry only stores recipes. Caching lives in [`crate::cache`] and
//! resolution in [`crate::container`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{AnbarError, DuplicateBindingError, Result};
use crate::instance::{Dependencies, Injectable, Instance};
use crate::key::DependencyKey;
use crate::scope::Scope;
use crate::unit::UnitOfWork;

/// Factory strategy: an arbitrary callable with access to the resolver.
///
/// `Arc` rather than `Box` so bindings can be cloned out of the registry
/// lock before the factory runs.
pub type FactoryFn = Arc<dyn Fn(&dyn Resolver) -> Result<Instance> + Send + Sync>;

/// Concrete-construction strategy: receives the already resolved manifest.
pub type ConstructorFn = Arc<dyn Fn(&mut Dependencies) -> Result<Instance> + Send + Sync>;

/// What factories receive to resolve their own dependencies.
///
/// Calls made through a resolver share the caller's unit of work and
/// resolution stack, so cycles through factories are detected too.
pub trait Resolver {
    fn resolve_key(&self, key: &DependencyKey) -> Result<Instance>;

    /// The unit of work this resolution runs in, if any.
    fn unit(&self) -> Option<&UnitOfWork>;
}

/// Typed helpers over any [`Resolver`].
pub trait ResolverApi: Resolver {
    /// Resolves `T` by type.
    fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = DependencyKey::of::<T>();
        self.resolve_key(&key)?.downcast_for::<T>(&key)
    }

    /// Resolves `T` bound under `name`.
    fn resolve_named<T: ?Sized + Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        let key = DependencyKey::named::<T>(name);
        self.resolve_key(&key)?.downcast_for::<T>(&key)
    }
}

impl<R: Resolver + ?Sized> ResolverApi for R {}

/// Resolve a typed dependency inside a factory closure.
///
/// ```rust,ignore
/// container.register_factory::<Mailer>(Scope::Singleton, |r| {
///     let config = anbar_container::registry::resolve::<MailConfig>(r)?;
///     Ok(Arc::new(Mailer::new(&config)))
/// })?;
/// ```
pub fn resolve<T: ?Sized + Send + Sync + 'static>(resolver: &dyn Resolver) -> Result<Arc<T>> {
    resolver.resolve::<T>()
}

/// How a binding produces its instances.
#[derive(Clone)]
pub enum Strategy {
    /// Resolve `dependencies`, then call `constructor` with them.
    Construct {
        dependencies: Vec<DependencyKey>,
        constructor: ConstructorFn,
    },
    /// Call an arbitrary factory.
    Factory(FactoryFn),
    /// Hand out a value supplied at registration.
    Instance(Instance),
}

impl Strategy {
    /// Concrete construction from an [`Injectable`] manifest.
    pub fn construct<T: Injectable>() -> Self {
        Strategy::Construct {
            dependencies: T::dependencies(),
            constructor: Arc::new(|deps: &mut Dependencies| T::construct(deps).map(Instance::new)),
        }
    }

    /// Factory returning a shared `T`, which may be a trait object.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        Strategy::Factory(Arc::new(move |resolver: &dyn Resolver| {
            factory(resolver).map(Instance::from_arc)
        }))
    }

    /// A fixed value.
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        Strategy::Instance(Instance::new(value))
    }

    /// Declared dependencies; empty for factories and fixed instances.
    pub fn dependencies(&self) -> &[DependencyKey] {
        match self {
            Strategy::Construct { dependencies, .. } => dependencies,
            Strategy::Factory(_) | Strategy::Instance(_) => &[],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Strategy::Construct { .. } => "construct",
            Strategy::Factory(_) => "factory",
            Strategy::Instance(_) => "instance",
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Construct { dependencies, .. } => f
                .debug_struct("Construct")
                .field("dependencies", dependencies)
                .finish_non_exhaustive(),
            Strategy::Factory(_) => f.write_str("Factory"),
            Strategy::Instance(instance) => f.debug_tuple("Instance").field(instance).finish(),
        }
    }
}

/// A registered recipe for one key.
#[derive(Debug, Clone)]
pub struct Binding {
    pub key: DependencyKey,
    pub strategy: Strategy,
    pub scope: Scope,
}

impl Binding {
    /// Creates a binding. Fixed instances are always singletons.
    pub fn new(key: DependencyKey, strategy: Strategy, scope: Scope) -> Self {
        let scope = match strategy {
            Strategy::Instance(_) => Scope::Singleton,
            _ => scope,
        };
        Self { key, strategy, scope }
    }
}

/// What a key resolved through before a registration replaced it.
#[derive(Debug, Clone)]
pub(crate) enum Previous {
    Binding(Binding),
    Alias(DependencyKey),
}

/// Key → binding table plus aliases.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    bindings: HashMap<DependencyKey, Binding>,
    aliases: HashMap<DependencyKey, DependencyKey>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a binding, returning the one it replaced.
    ///
    /// # Errors
    /// [`AnbarError::DuplicateBinding`] if the key is bound (directly or as
    /// an alias) and `allow_override` is false.
    pub fn register(&mut self, binding: Binding, allow_override: bool) -> Result<Option<Binding>> {
        // Struct-literal bindings skip `Binding::new`; fixed instances stay singletons.
        let binding = Binding::new(binding.key, binding.strategy, binding.scope);
        let key = binding.key;

        if !allow_override && (self.bindings.contains_key(&key) || self.aliases.contains_key(&key)) {
            return Err(AnbarError::DuplicateBinding(DuplicateBindingError { key }));
        }

        debug!(
            key = %key,
            scope = %binding.scope,
            strategy = binding.strategy.kind(),
            "Registered binding"
        );
        self.aliases.remove(&key);
        Ok(self.bindings.insert(key, binding))
    }

    /// Makes `from` resolve through the binding of `to`.
    pub fn register_alias(
        &mut self,
        from: DependencyKey,
        to: DependencyKey,
        allow_override: bool,
    ) -> Result<()> {
        if !allow_override && (self.bindings.contains_key(&from) || self.aliases.contains_key(&from)) {
            return Err(AnbarError::DuplicateBinding(DuplicateBindingError { key: from }));
        }

        debug!(from = %from, to = %to, "Registered alias");
        self.bindings.remove(&from);
        self.aliases.insert(from, to);
        Ok(())
    }

    /// Looks up a binding, following at most one alias hop.
    pub fn get(&self, key: &DependencyKey) -> Option<&Binding> {
        match self.aliases.get(key) {
            Some(target) => {
                trace!(from = %key, to = %target, "Following alias");
                self.bindings.get(target)
            }
            None => self.bindings.get(key),
        }
    }

    pub fn contains(&self, key: &DependencyKey) -> bool {
        self.get(key).is_some()
    }

    /// Drops a binding or alias.
    pub fn remove(&mut self, key: &DependencyKey) -> Option<Binding> {
        if self.aliases.remove(key).is_some() {
            debug!(key = %key, "Removed alias");
            return None;
        }
        let removed = self.bindings.remove(key);
        if removed.is_some() {
            debug!(key = %key, "Removed binding");
        }
        removed
    }

    /// The current entry for `key`, without following aliases.
    pub fn previous(&self, key: &DependencyKey) -> Option<Previous> {
        match self.aliases.get(key) {
            Some(target) => Some(Previous::Alias(*target)),
            None => self.bindings.get(key).cloned().map(Previous::Binding),
        }
    }

    /// Puts back an entry captured with [`previous`](Self::previous).
    pub fn restore(&mut self, key: DependencyKey, previous: Previous) {
        debug!(key = %key, "Restored replaced entry");
        match previous {
            Previous::Binding(binding) => {
                self.aliases.remove(&key);
                self.bindings.insert(key, binding);
            }
            Previous::Alias(target) => {
                self.bindings.remove(&key);
                self.aliases.insert(key, target);
            }
        }
    }

    /// Number of bindings, aliases excluded.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Every resolvable key, aliases included.
    pub fn registered_keys(&self) -> Vec<DependencyKey> {
        self.bindings
            .keys()
            .chain(self.aliases.keys())
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Database;
    struct Session;

    fn binding(key: DependencyKey, scope: Scope) -> Binding {
        Binding::new(key, Strategy::factory(|_| Ok(Arc::new(1u8))), scope)
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = Registry::new();
        let key = DependencyKey::of::<Database>();
        reg.register(binding(key, Scope::Singleton), false).unwrap();
        assert_eq!(reg.get(&key).unwrap().scope, Scope::Singleton);
        assert!(reg.get(&DependencyKey::of::<Session>()).is_none());
    }

    #[test]
    fn duplicate_is_rejected() {
        let mut reg = Registry::new();
        let key = DependencyKey::of::<Database>();
        reg.register(binding(key, Scope::Singleton), false).unwrap();
        match reg.register(binding(key, Scope::Transient), false) {
            Err(AnbarError::DuplicateBinding(e)) => assert_eq!(e.key, key),
            other => panic!("Expected DuplicateBinding, got: {other:?}"),
        }
    }

    #[test]
    fn override_replaces() {
        let mut reg = Registry::new();
        let key = DependencyKey::of::<Database>();
        reg.register(binding(key, Scope::Singleton), false).unwrap();
        let replaced = reg.register(binding(key, Scope::Transient), true).unwrap();
        assert_eq!(replaced.map(|b| b.scope), Some(Scope::Singleton));
        assert_eq!(reg.get(&key).unwrap().scope, Scope::Transient);
    }

    #[test]
    fn fixed_instance_is_always_singleton() {
        let b = Binding::new(
            DependencyKey::of::<u32>(),
            Strategy::instance(3u32),
            Scope::Transient,
        );
        assert_eq!(b.scope, Scope::Singleton);

        let mut reg = Registry::new();
        let key = DependencyKey::of::<u8>();
        reg.register(
            Binding {
                key,
                strategy: Strategy::instance(7u8),
                scope: Scope::Scoped,
            },
            false,
        )
        .unwrap();
        assert_eq!(reg.get(&key).unwrap().scope, Scope::Singleton);
    }

    #[test]
    fn alias_points_at_target() {
        let mut reg = Registry::new();
        let target = DependencyKey::named::<Database>("primary");
        reg.register(binding(target, Scope::Singleton), false).unwrap();

        let alias = DependencyKey::of::<Database>();
        reg.register_alias(alias, target, false).unwrap();
        assert_eq!(reg.get(&alias).unwrap().key, target);
        assert!(reg.register_alias(alias, target, false).is_err());

        assert!(reg.remove(&alias).is_none());
        assert!(!reg.contains(&alias));
        assert!(reg.contains(&target));
    }

    #[test]
    fn construct_strategy_reports_manifest() {
        struct Clock;
        struct Timer;
        impl Injectable for Timer {
            fn dependencies() -> Vec<DependencyKey> {
                vec![DependencyKey::of::<Clock>()]
            }
            fn construct(_: &mut Dependencies) -> Result<Self> {
                Ok(Timer)
            }
        }

        let strategy = Strategy::construct::<Timer>();
        assert_eq!(strategy.dependencies(), &[DependencyKey::of::<Clock>()]);
        assert_eq!(strategy.kind(), "construct");
    }
}
