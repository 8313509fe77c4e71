//! Provider catalog: id → provider constructor.
//!
//! Lets the provider list come from configuration. Crates submit
//! [`ProviderEntry`] items with `inventory::submit!`; the catalog collects
//! them at startup and turns [`ProviderConfig`] records into descriptors.
//!
//! ```rust
//! use anbar_container::catalog::{ProviderCatalog, ProviderEntry};
//! use anbar_container::config::ProviderConfig;
//! use anbar_container::prelude::*;
//!
//! struct MailProvider;
//! impl ServiceProvider for MailProvider {
//!     fn register(&self, _registry: &mut dyn ProviderRegistry) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! anbar_container::inventory::submit! {
//!     ProviderEntry::new("mail", || Box::new(MailProvider))
//! }
//!
//! let catalog = ProviderCatalog::from_inventory();
//! let descriptors = catalog.descriptors(&[ProviderConfig::new("mail")]).unwrap();
//! assert_eq!(descriptors.len(), 1);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anbar_support::rendering::suggest_similar;
use tracing::{debug, warn};

use crate::bootstrap::ProviderDescriptor;
use crate::config::ProviderConfig;
use crate::error::{AnbarError, Result, UnknownProviderError};
use crate::provider::ServiceProvider;

pub type ProviderConstructor = fn() -> Box<dyn ServiceProvider>;

/// Link-time registration of a provider constructor.
pub struct ProviderEntry {
    pub id: &'static str,
    pub construct: ProviderConstructor,
}

impl ProviderEntry {
    pub const fn new(id: &'static str, construct: ProviderConstructor) -> Self {
        Self { id, construct }
    }
}

inventory::collect!(ProviderEntry);

/// Known provider constructors, by id.
#[derive(Default, Clone)]
pub struct ProviderCatalog {
    entries: BTreeMap<String, ProviderConstructor>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every [`ProviderEntry`] submitted anywhere in the binary.
    pub fn from_inventory() -> Self {
        let catalog = inventory::iter::<ProviderEntry>
            .into_iter()
            .fold(Self::new(), |catalog, entry| catalog.with(entry.id, entry.construct));
        debug!(providers = catalog.entries.len(), "Provider catalog collected");
        catalog
    }

    /// Adds or replaces one entry.
    pub fn with(mut self, id: impl Into<String>, construct: ProviderConstructor) -> Self {
        let id = id.into();
        if self.entries.insert(id.clone(), construct).is_some() {
            warn!(id = %id, "Provider id registered twice; keeping the later one");
        }
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Known ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Instantiates one provider.
    ///
    /// # Errors
    /// [`AnbarError::UnknownProvider`] with close matches as suggestions.
    pub fn instantiate(&self, id: &str) -> Result<Arc<dyn ServiceProvider>> {
        match self.entries.get(id) {
            Some(construct) => Ok(Arc::from(construct())),
            None => Err(AnbarError::UnknownProvider(UnknownProviderError {
                id: id.to_string(),
                suggestions: suggest_similar(id, &self.ids(), 3),
            })),
        }
    }

    /// Builds descriptors in configuration order, applying per-entry overrides.
    pub fn descriptors(&self, configs: &[ProviderConfig]) -> Result<Vec<ProviderDescriptor>> {
        configs
            .iter()
            .map(|config| {
                let mut descriptor = ProviderDescriptor::from_arc(self.instantiate(&config.provider)?);
                descriptor = match config.deferred {
                    Some(true) => descriptor.deferred(),
                    Some(false) => descriptor.eager(),
                    None => descriptor,
                };
                if let Some(priority) = config.priority {
                    descriptor = descriptor.with_priority(priority);
                }
                Ok(descriptor)
            })
            .collect()
    }
}

impl fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCatalog")
            .field("ids", &self.ids())
            .finish()
    }
}
