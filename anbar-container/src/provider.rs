//! Service providers: modules of related registrations with a two-phase
//! lifecycle.
//!
//! `register` only declares bindings. It receives a [`ProviderRegistry`],
//! which has no way to resolve anything, so a provider cannot depend on
//! another provider's registration order. `boot` runs after every eager
//! provider has registered and may resolve freely.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use anbar_container::prelude::*;
//!
//! struct Database { url: String }
//!
//! struct DatabaseProvider;
//!
//! impl ServiceProvider for DatabaseProvider {
//!     fn register(&self, registry: &mut dyn ProviderRegistry) -> Result<()> {
//!         registry.singleton::<Database>(|_| {
//!             Ok(Arc::new(Database { url: "postgres://localhost".into() }))
//!         })
//!     }
//!
//!     fn boot(&self, container: &Container) -> Result<()> {
//!         let db = container.resolve::<Database>()?;
//!         assert!(db.url.starts_with("postgres"));
//!         Ok(())
//!     }
//! }
//!
//! let container = Container::new();
//! let provider = DatabaseProvider;
//! provider.register(&mut container.registrar()).unwrap();
//! provider.boot(&container).unwrap();
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::container::Container;
use crate::error::Result;
use crate::instance::{Injectable, Instance};
use crate::key::DependencyKey;
use crate::registry::{Binding, Previous, Resolver, Strategy};
use crate::scope::Scope;

/// A module that registers related bindings and optionally boots them.
pub trait ServiceProvider: Send + Sync {
    /// Declares bindings. Must not have side effects beyond registration.
    fn register(&self, registry: &mut dyn ProviderRegistry) -> Result<()>;

    /// Runs once every eager provider has registered.
    fn boot(&self, _container: &Container) -> Result<()> {
        Ok(())
    }

    /// Human-readable name for logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Default for [`ProviderDescriptor`](crate::bootstrap::ProviderDescriptor);
    /// descriptors may override it.
    fn is_deferred(&self) -> bool {
        false
    }

    /// Keys a deferred provider promises to bind.
    fn provides(&self) -> Vec<DependencyKey> {
        Vec::new()
    }

    /// Boot order; lower boots first.
    fn priority(&self) -> i32 {
        0
    }
}

/// Registration-only view of a container.
///
/// Implemented by [`ContainerBuilder`](crate::container::ContainerBuilder)
/// and [`Registrar`]. Typed helpers live on [`RegistryExt`].
pub trait ProviderRegistry {
    fn register_binding(&mut self, binding: Binding) -> Result<()>;

    /// Make `from` resolve through `to`.
    fn register_alias(&mut self, from: DependencyKey, to: DependencyKey) -> Result<()>;
}

/// Typed registration helpers for any [`ProviderRegistry`], trait objects included.
pub trait RegistryExt: ProviderRegistry {
    fn bind(&mut self, key: DependencyKey, strategy: Strategy, scope: Scope) -> Result<()> {
        self.register_binding(Binding::new(key, strategy, scope))
    }

    fn singleton<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        factory: impl Fn(&dyn Resolver) -> Result<Arc<T>> + Send + Sync + 'static,
    ) -> Result<()> {
        self.bind(DependencyKey::of::<T>(), Strategy::factory(factory), Scope::Singleton)
    }

    fn scoped<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        factory: impl Fn(&dyn Resolver) -> Result<Arc<T>> + Send + Sync + 'static,
    ) -> Result<()> {
        self.bind(DependencyKey::of::<T>(), Strategy::factory(factory), Scope::Scoped)
    }

    fn transient<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        factory: impl Fn(&dyn Resolver) -> Result<Arc<T>> + Send + Sync + 'static,
    ) -> Result<()> {
        self.bind(DependencyKey::of::<T>(), Strategy::factory(factory), Scope::Transient)
    }

    /// A factory bound under `name`.
    fn named<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        name: &'static str,
        scope: Scope,
        factory: impl Fn(&dyn Resolver) -> Result<Arc<T>> + Send + Sync + 'static,
    ) -> Result<()> {
        self.bind(DependencyKey::named::<T>(name), Strategy::factory(factory), scope)
    }

    fn instance<T: Send + Sync + 'static>(&mut self, value: T) -> Result<()> {
        self.bind(DependencyKey::of::<T>(), Strategy::instance(value), Scope::Singleton)
    }

    fn instance_arc<T: ?Sized + Send + Sync + 'static>(&mut self, value: Arc<T>) -> Result<()> {
        self.bind(
            DependencyKey::of::<T>(),
            Strategy::Instance(Instance::from_arc(value)),
            Scope::Singleton,
        )
    }

    /// `T` built from its [`Injectable`] manifest.
    fn construct<T: Injectable>(&mut self, scope: Scope) -> Result<()> {
        self.bind(DependencyKey::of::<T>(), Strategy::construct::<T>(), scope)
    }

    fn alias(&mut self, from: DependencyKey, to: DependencyKey) -> Result<()> {
        self.register_alias(from, to)
    }
}

impl<R: ProviderRegistry + ?Sized> RegistryExt for R {}

/// Registers straight into a live container and remembers every key it
/// touched, so a failed deferred activation can be undone.
pub struct Registrar<'c> {
    container: &'c Container,
    registered: Vec<DependencyKey>,
    /// Entries overridden along the way, restored on rollback.
    replaced: Vec<(DependencyKey, Previous)>,
}

impl<'c> Registrar<'c> {
    pub(crate) fn new(container: &'c Container) -> Self {
        Self {
            container,
            registered: Vec::new(),
            replaced: Vec::new(),
        }
    }

    /// Keys registered through this handle, in order.
    pub fn registered(&self) -> &[DependencyKey] {
        &self.registered
    }

    /// Removes everything registered through this handle and restores the
    /// entries it overrode.
    pub fn rollback(self) {
        if self.registered.is_empty() {
            return;
        }
        debug!(
            keys = self.registered.len(),
            restored = self.replaced.len(),
            "Rolling back registrations"
        );
        self.container.roll_back(&self.registered, self.replaced);
    }

    pub fn into_registered(self) -> Vec<DependencyKey> {
        self.registered
    }
}

impl ProviderRegistry for Registrar<'_> {
    fn register_binding(&mut self, binding: Binding) -> Result<()> {
        let key = binding.key;
        if let Some(previous) = self.container.insert_binding(binding)? {
            self.replaced.push((key, previous));
        }
        self.registered.push(key);
        Ok(())
    }

    fn register_alias(&mut self, from: DependencyKey, to: DependencyKey) -> Result<()> {
        if let Some(previous) = self.container.insert_alias(from, to)? {
            self.replaced.push((from, previous));
        }
        self.registered.push(from);
        Ok(())
    }
}
