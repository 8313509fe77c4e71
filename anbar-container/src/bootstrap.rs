//! Provider bootstrap: the two-phase `register` / `boot` protocol and
//! on-demand activation of deferred providers.
//!
//! # Lifecycle
//! ```text
//! eager:     Unloaded ──register──> Registered ──boot──> Booted
//! deferred:  Pending ──first miss on a provided key──> Activated
//!               │  ▲
//!               └──┘ failure (rolled back, retried on the next miss)
//!               └────> Suspended (CircuitBreak policy only)
//! ```
//!
//! Every eager `register` runs before any eager `boot`. Boot order is
//! ascending `priority`, ties in list order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::config::{ActivationPolicy, BootstrapSettings};
use crate::container::{Container, DeferredResolver};
use crate::error::{AnbarError, ProviderActivationError, ProviderPhase, Result};
use crate::key::DependencyKey;
use crate::provider::ServiceProvider;

// ═══════════════════════════════════════════
// ProviderDescriptor
// ═══════════════════════════════════════════

/// A provider plus how the bootstrapper should treat it.
///
/// Defaults come from the provider's own [`ServiceProvider::is_deferred`],
/// [`ServiceProvider::provides`] and [`ServiceProvider::priority`].
#[derive(Clone)]
pub struct ProviderDescriptor {
    provider: Arc<dyn ServiceProvider>,
    deferred: bool,
    provides: Vec<DependencyKey>,
    priority: i32,
}

impl ProviderDescriptor {
    pub fn new<P: ServiceProvider + 'static>(provider: P) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    pub fn from_arc(provider: Arc<dyn ServiceProvider>) -> Self {
        Self {
            deferred: provider.is_deferred(),
            provides: provider.provides(),
            priority: provider.priority(),
            provider,
        }
    }

    /// Activate on first miss of a provided key instead of at startup.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn eager(mut self) -> Self {
        self.deferred = false;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Replaces the provided keys.
    pub fn with_provides(mut self, keys: Vec<DependencyKey>) -> Self {
        self.provides = keys;
        self
    }

    /// Adds `T` to the provided keys.
    pub fn providing<T: ?Sized + 'static>(mut self) -> Self {
        self.provides.push(DependencyKey::of::<T>());
        self
    }

    pub fn provider(&self) -> &Arc<dyn ServiceProvider> {
        &self.provider
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn provides(&self) -> &[DependencyKey] {
        &self.provides
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("provider", &self.name())
            .field("deferred", &self.deferred)
            .field("provides", &self.provides)
            .field("priority", &self.priority)
            .finish()
    }
}

// ═══════════════════════════════════════════
// States
// ═══════════════════════════════════════════

/// Lifecycle of an eager provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Unloaded,
    Registered,
    Booted,
}

/// Lifecycle of a deferred provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredStatus {
    /// Not activated yet; `failures` counts consecutive failed attempts.
    Pending { failures: u32 },
    Activated,
    /// Circuit-broken; misses on its keys fail fast.
    Suspended { failures: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeferredState {
    Pending { failures: u32 },
    Activating { failures: u32 },
    Activated,
    Suspended { failures: u32 },
}

impl DeferredState {
    fn status(self) -> DeferredStatus {
        match self {
            DeferredState::Pending { failures } | DeferredState::Activating { failures } => {
                DeferredStatus::Pending { failures }
            }
            DeferredState::Activated => DeferredStatus::Activated,
            DeferredState::Suspended { failures } => DeferredStatus::Suspended { failures },
        }
    }
}

// ═══════════════════════════════════════════
// Bootstrapper
// ═══════════════════════════════════════════

struct EagerEntry {
    descriptor: ProviderDescriptor,
    state: Mutex<ProviderState>,
}

/// Drives providers into a [`Container`].
///
/// ```rust
/// use std::sync::Arc;
/// use anbar_container::prelude::*;
///
/// struct Clock;
/// struct ClockProvider;
///
/// impl ServiceProvider for ClockProvider {
///     fn register(&self, registry: &mut dyn ProviderRegistry) -> Result<()> {
///         registry.singleton::<Clock>(|_| Ok(Arc::new(Clock)))
///     }
/// }
///
/// let container = Container::new();
/// let bootstrapper = Bootstrapper::new(vec![
///     ProviderDescriptor::new(ClockProvider).deferred().providing::<Clock>(),
/// ])
/// .unwrap();
/// bootstrapper.load(&container).unwrap();
///
/// assert!(!container.is_bound(&DependencyKey::of::<Clock>()));
/// assert!(container.resolve::<Clock>().is_ok());
/// ```
pub struct Bootstrapper {
    eager: Vec<EagerEntry>,
    deferred: Arc<DeferredProviders>,
    settings: BootstrapSettings,
    loaded: AtomicBool,
}

impl Bootstrapper {
    /// # Errors
    /// [`AnbarError::InvalidDescriptor`] if a deferred descriptor provides nothing.
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Result<Self> {
        Self::with_settings(descriptors, BootstrapSettings::default())
    }

    pub fn with_settings(descriptors: Vec<ProviderDescriptor>, settings: BootstrapSettings) -> Result<Self> {
        let mut eager = Vec::new();
        let mut deferred = Vec::new();

        for descriptor in descriptors {
            if !descriptor.deferred {
                eager.push(EagerEntry {
                    descriptor,
                    state: Mutex::new(ProviderState::Unloaded),
                });
                continue;
            }
            if descriptor.provides.is_empty() {
                return Err(AnbarError::InvalidDescriptor {
                    provider: descriptor.name().to_string(),
                });
            }
            deferred.push(descriptor);
        }

        Ok(Self {
            eager,
            deferred: Arc::new(DeferredProviders::new(deferred, settings.activation_policy)),
            settings,
            loaded: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &BootstrapSettings {
        &self.settings
    }

    /// Runs the startup protocol against `container`.
    ///
    /// Installs the deferred hook, registers every eager provider in list
    /// order, validates the graph if configured, then boots eager providers
    /// by priority. Runs at most once; later calls return `Ok(())` without
    /// doing anything, even after a failed first call.
    ///
    /// # Errors
    /// [`AnbarError::ProviderActivation`] naming the failing provider and
    /// phase, or a validation error.
    #[instrument(skip_all, fields(eager = self.eager.len(), deferred = self.deferred.entries.len()))]
    pub fn load(&self, container: &Container) -> Result<()> {
        if self.loaded.swap(true, Ordering::AcqRel) {
            debug!("Bootstrapper already loaded");
            return Ok(());
        }

        if !self.deferred.entries.is_empty() {
            container.set_deferred_resolver(self.deferred.clone());
        }

        for entry in &self.eager {
            let name = entry.descriptor.name();
            let mut registrar = container.registrar();
            entry
                .descriptor
                .provider
                .register(&mut registrar)
                .map_err(|e| activation_error(name, ProviderPhase::Register, false, e))?;
            *entry.state.lock() = ProviderState::Registered;
            info!(provider = name, bindings = registrar.registered().len(), "Provider registered");
        }

        self.deferred.release_bound(container);

        if self.settings.validate_graph {
            container.validate()?;
        }

        let mut boot_order: Vec<&EagerEntry> = self.eager.iter().collect();
        boot_order.sort_by_key(|entry| entry.descriptor.priority);

        for entry in boot_order {
            let name = entry.descriptor.name();
            entry
                .descriptor
                .provider
                .boot(container)
                .map_err(|e| activation_error(name, ProviderPhase::Boot, false, e))?;
            *entry.state.lock() = ProviderState::Booted;
            info!(provider = name, priority = entry.descriptor.priority, "Provider booted");
        }

        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// State of the eager provider called `name`.
    pub fn provider_state(&self, name: &str) -> Option<ProviderState> {
        self.eager
            .iter()
            .find(|entry| entry.descriptor.name() == name)
            .map(|entry| *entry.state.lock())
    }

    /// Status of the deferred provider called `name`.
    pub fn deferred_status(&self, name: &str) -> Option<DeferredStatus> {
        self.deferred
            .entries
            .iter()
            .find(|entry| entry.descriptor.name() == name)
            .map(DeferredEntry::status)
    }

    /// Keys still waiting on a pending deferred provider.
    pub fn pending_keys(&self) -> Vec<DependencyKey> {
        self.deferred.pending_keys()
    }
}

impl fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("eager", &self.eager.len())
            .field("deferred", &self.deferred.entries.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

fn activation_error(provider: &str, phase: ProviderPhase, deferred: bool, source: AnbarError) -> AnbarError {
    warn!(provider, %phase, deferred, error = %source, "Provider failed");
    AnbarError::ProviderActivation(ProviderActivationError {
        provider: provider.to_string(),
        phase,
        deferred,
        source: Box::new(source),
    })
}

// ═══════════════════════════════════════════
// Deferred providers (the container's miss hook)
// ═══════════════════════════════════════════

struct DeferredEntry {
    descriptor: ProviderDescriptor,
    /// Serializes activation. Reentrant so the provider's own hooks can miss
    /// on one of its keys without deadlocking.
    activation: ReentrantMutex<()>,
    state: Mutex<DeferredState>,
}

impl DeferredEntry {
    fn status(&self) -> DeferredStatus {
        self.state.lock().status()
    }
}

struct DeferredProviders {
    entries: Vec<DeferredEntry>,
    /// Provided key → index into `entries`. Activated providers leave it.
    index: RwLock<HashMap<DependencyKey, usize>>,
    policy: ActivationPolicy,
}

impl DeferredProviders {
    fn new(descriptors: Vec<ProviderDescriptor>, policy: ActivationPolicy) -> Self {
        let mut index = HashMap::new();
        for (i, descriptor) in descriptors.iter().enumerate() {
            for key in &descriptor.provides {
                if let Some(&owner) = index.get(key) {
                    let owner: &ProviderDescriptor = &descriptors[owner];
                    warn!(
                        key = %key,
                        provider = descriptor.name(),
                        owner = owner.name(),
                        "Key already promised by an earlier deferred provider"
                    );
                    continue;
                }
                index.insert(*key, i);
            }
        }

        let entries = descriptors
            .into_iter()
            .map(|descriptor| DeferredEntry {
                descriptor,
                activation: ReentrantMutex::new(()),
                state: Mutex::new(DeferredState::Pending { failures: 0 }),
            })
            .collect();

        Self {
            entries,
            index: RwLock::new(index),
            policy,
        }
    }

    /// Keys an eager provider already bound keep that binding.
    fn release_bound(&self, container: &Container) {
        self.index.write().retain(|key, i| {
            if !container.is_bound(key) {
                return true;
            }
            warn!(
                key = %key,
                provider = self.entries.get(*i).map_or("", |entry| entry.descriptor.name()),
                "Deferred key already bound by an eager provider"
            );
            false
        });
    }

    fn entry_for(&self, key: &DependencyKey) -> Option<&DeferredEntry> {
        let i = *self.index.read().get(key)?;
        self.entries.get(i)
    }

    #[instrument(skip_all, name = "deferred_activation", fields(key = %key, provider = entry.descriptor.name()))]
    fn run(&self, entry: &DeferredEntry, key: &DependencyKey, container: &Container) -> Result<bool> {
        let _serial = entry.activation.lock();

        let current = *entry.state.lock();
        let failures = match current {
            DeferredState::Activated => return Ok(true),
            DeferredState::Activating { .. } => {
                debug!("Re-entrant miss during activation");
                return Ok(false);
            }
            DeferredState::Suspended { failures } => {
                return Err(AnbarError::ActivationSuspended {
                    provider: entry.descriptor.name().to_string(),
                    failures,
                });
            }
            DeferredState::Pending { failures } => failures,
        };
        *entry.state.lock() = DeferredState::Activating { failures };

        let provider = &entry.descriptor.provider;
        let mut registrar = container.registrar();
        let outcome = provider
            .register(&mut registrar)
            .map_err(|e| (ProviderPhase::Register, e))
            .and_then(|()| provider.boot(container).map_err(|e| (ProviderPhase::Boot, e)));

        match outcome {
            Ok(()) => {
                *entry.state.lock() = DeferredState::Activated;
                let mut index = self.index.write();
                for provided in &entry.descriptor.provides {
                    index.remove(provided);
                    if !container.is_bound(provided) {
                        warn!(key = %provided, "Deferred provider did not bind a promised key");
                    }
                }
                info!(bindings = registrar.registered().len(), "Deferred provider activated");
                Ok(true)
            }
            Err((phase, error)) => {
                registrar.rollback();
                let failures = failures + 1;
                *entry.state.lock() = if self.policy.should_suspend(failures) {
                    warn!(failures, "Deferred provider suspended");
                    DeferredState::Suspended { failures }
                } else {
                    DeferredState::Pending { failures }
                };
                Err(activation_error(entry.descriptor.name(), phase, true, error))
            }
        }
    }
}

impl DeferredResolver for DeferredProviders {
    fn provides(&self, key: &DependencyKey) -> bool {
        self.entry_for(key)
            .is_some_and(|entry| matches!(entry.status(), DeferredStatus::Pending { .. }))
    }

    fn activate(&self, key: &DependencyKey, container: &Container) -> Result<bool> {
        match self.entry_for(key) {
            Some(entry) => self.run(entry, key, container),
            None => Ok(false),
        }
    }

    fn guards(&self, key: &DependencyKey) -> bool {
        self.index.read().contains_key(key)
    }

    fn pending_keys(&self) -> Vec<DependencyKey> {
        self.index
            .read()
            .iter()
            .filter(|(_, i)| {
                self.entries
                    .get(**i)
                    .is_some_and(|entry| matches!(entry.status(), DeferredStatus::Pending { .. }))
            })
            .map(|(key, _)| *key)
            .collect()
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderRegistry, RegistryExt};

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Records every hook call into a shared journal.
    struct Recording {
        name: &'static str,
        journal: Journal,
        priority: i32,
    }

    impl ServiceProvider for Recording {
        fn register(&self, _registry: &mut dyn ProviderRegistry) -> Result<()> {
            self.journal.lock().push(format!("register:{}", self.name));
            Ok(())
        }

        fn boot(&self, _container: &Container) -> Result<()> {
            self.journal.lock().push(format!("boot:{}", self.name));
            Ok(())
        }

        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    fn recording(name: &'static str, journal: &Journal, priority: i32) -> ProviderDescriptor {
        ProviderDescriptor::new(Recording {
            name,
            journal: journal.clone(),
            priority,
        })
    }

    #[test]
    fn all_registers_precede_all_boots() {
        let journal = Journal::default();
        let bootstrapper = Bootstrapper::new(vec![
            recording("a", &journal, 0),
            recording("b", &journal, 0),
            recording("c", &journal, 0),
        ])
        .unwrap();

        bootstrapper.load(&Container::new()).unwrap();
        assert_eq!(
            *journal.lock(),
            ["register:a", "register:b", "register:c", "boot:a", "boot:b", "boot:c"]
        );
        assert_eq!(bootstrapper.provider_state("b"), Some(ProviderState::Booted));
    }

    #[test]
    fn boot_order_follows_priority_then_list_order() {
        let journal = Journal::default();
        let bootstrapper = Bootstrapper::new(vec![
            recording("late", &journal, 10),
            recording("first", &journal, -5),
            recording("tie-1", &journal, 0),
            recording("tie-2", &journal, 0),
        ])
        .unwrap();

        bootstrapper.load(&Container::new()).unwrap();
        let boots: Vec<String> = journal
            .lock()
            .iter()
            .filter(|line| line.starts_with("boot:"))
            .cloned()
            .collect();
        assert_eq!(boots, ["boot:first", "boot:tie-1", "boot:tie-2", "boot:late"]);
    }

    #[test]
    fn second_load_is_a_no_op() {
        let journal = Journal::default();
        let bootstrapper = Bootstrapper::new(vec![recording("only", &journal, 0)]).unwrap();
        let container = Container::new();

        bootstrapper.load(&container).unwrap();
        bootstrapper.load(&container).unwrap();
        assert_eq!(journal.lock().len(), 2);
        assert!(bootstrapper.is_loaded());
    }

    #[test]
    fn deferred_without_provides_is_rejected() {
        let journal = Journal::default();
        match Bootstrapper::new(vec![recording("lazy", &journal, 0).deferred()]) {
            Err(AnbarError::InvalidDescriptor { provider }) => assert_eq!(provider, "lazy"),
            other => panic!("Expected InvalidDescriptor, got: {other:?}"),
        }
    }

    #[test]
    fn descriptor_overrides_provider_defaults() {
        let journal = Journal::default();
        let descriptor = recording("cache", &journal, 3)
            .deferred()
            .providing::<String>()
            .with_priority(7);

        assert!(descriptor.is_deferred());
        assert_eq!(descriptor.priority(), 7);
        assert_eq!(descriptor.provides(), &[DependencyKey::of::<String>()]);
        assert!(!descriptor.clone().eager().is_deferred());
    }

    #[test]
    fn boot_failure_names_provider_and_phase() {
        struct Broken;
        impl ServiceProvider for Broken {
            fn register(&self, registry: &mut dyn ProviderRegistry) -> Result<()> {
                registry.instance(1u8)
            }
            fn boot(&self, container: &Container) -> Result<()> {
                container.resolve::<String>().map(|_| ())
            }
            fn name(&self) -> &str {
                "broken"
            }
        }

        let bootstrapper = Bootstrapper::new(vec![ProviderDescriptor::new(Broken)]).unwrap();
        match bootstrapper.load(&Container::new()) {
            Err(AnbarError::ProviderActivation(e)) => {
                assert_eq!(e.provider, "broken");
                assert_eq!(e.phase, ProviderPhase::Boot);
                assert!(!e.deferred);
                assert!(matches!(*e.source, AnbarError::UnregisteredBinding(_)));
            }
            other => panic!("Expected ProviderActivation, got: {other:?}"),
        }
        assert_eq!(bootstrapper.provider_state("broken"), Some(ProviderState::Registered));
    }

    #[test]
    fn reentrant_miss_reports_not_satisfied() {
        struct Tokens;
        struct SelfResolving;
        impl ServiceProvider for SelfResolving {
            fn register(&self, _registry: &mut dyn ProviderRegistry) -> Result<()> {
                Ok(())
            }
            // Asks for its own key before binding it.
            fn boot(&self, container: &Container) -> Result<()> {
                match container.resolve::<Tokens>() {
                    Err(AnbarError::UnregisteredBinding(_)) => {
                        container.registrar().singleton::<Tokens>(|_| Ok(Arc::new(Tokens)))
                    }
                    other => panic!("Expected UnregisteredBinding, got: {:?}", other.map(|_| ())),
                }
            }
        }

        let container = Container::new();
        Bootstrapper::new(vec![ProviderDescriptor::new(SelfResolving).deferred().providing::<Tokens>()])
            .unwrap()
            .load(&container)
            .unwrap();

        assert!(container.resolve::<Tokens>().is_ok());
    }

    #[test]
    fn validation_runs_between_phases() {
        struct NeedsMissing;
        struct Missing;
        struct Consumer;

        impl crate::instance::Injectable for Consumer {
            fn dependencies() -> Vec<DependencyKey> {
                vec![DependencyKey::of::<Missing>()]
            }
            fn construct(_: &mut crate::instance::Dependencies) -> Result<Self> {
                Ok(Consumer)
            }
        }

        impl ServiceProvider for NeedsMissing {
            fn register(&self, registry: &mut dyn ProviderRegistry) -> Result<()> {
                registry.construct::<Consumer>(crate::scope::Scope::Transient)
            }
            fn boot(&self, _container: &Container) -> Result<()> {
                panic!("boot must not run after failed validation");
            }
        }

        let bootstrapper = Bootstrapper::new(vec![ProviderDescriptor::new(NeedsMissing)]).unwrap();
        assert!(matches!(
            bootstrapper.load(&Container::new()),
            Err(AnbarError::UnregisteredBinding(_))
        ));
    }
}
