//! Dependency graph validation.
//!
//! Walks every declared constructor manifest before anything is built:
//! - every dependency is bound, or promised by a pending deferred provider
//! - there are no cycles
//! - no singleton holds a scoped instance, directly or through the
//!   transients it builds
//!
//! Factories declare no manifest, so only their own key takes part. The
//! runtime resolution stack still catches cycles that run through them.

use std::collections::{HashMap, HashSet};

use anbar_support::rendering::{render_chain, suggest_similar};
use tracing::{debug, instrument, warn};

use crate::error::{
    AnbarError, CircularDependencyError, ScopeMismatchError, UnregisteredBindingError,
};
use crate::key::DependencyKey;
use crate::scope::Scope;

/// What validation needs to know about one key.
#[derive(Debug, Clone)]
pub(crate) struct DependencyInfo {
    pub key: DependencyKey,
    pub dependencies: Vec<DependencyKey>,
    pub scope: Scope,
}

/// Depth-first validator with a "visiting" set for cycle detection.
pub(crate) struct GraphValidator {
    nodes: HashMap<DependencyKey, DependencyInfo>,
    /// Keys a pending deferred provider will bind on demand.
    deferred: HashSet<DependencyKey>,
    visiting: HashSet<DependencyKey>,
    validated: HashSet<DependencyKey>,
    path: Vec<DependencyKey>,
}

impl GraphValidator {
    pub fn new(nodes: HashMap<DependencyKey, DependencyInfo>, deferred: HashSet<DependencyKey>) -> Self {
        Self {
            nodes,
            deferred,
            visiting: HashSet::new(),
            validated: HashSet::new(),
            path: Vec::new(),
        }
    }

    /// Validates every node.
    ///
    /// # Errors
    /// - [`AnbarError::CircularDependency`]: cycle between manifests
    /// - [`AnbarError::UnregisteredBinding`]: manifest names an unknown key
    /// - [`AnbarError::ScopeMismatch`]: captive dependency
    #[instrument(skip(self), name = "graph_validation", fields(nodes = self.nodes.len()))]
    pub fn validate(mut self) -> Result<(), AnbarError> {
        let mut keys: Vec<DependencyKey> = self.nodes.keys().copied().collect();
        // Deterministic order so the same broken graph reports the same error.
        keys.sort_by_key(|k| (k.type_name(), k.name()));

        for key in &keys {
            self.visit(key)?;
        }
        for key in &keys {
            if let Some(info) = self.nodes.get(key) {
                self.check_captive(info)?;
            }
        }

        debug!(validated = self.validated.len(), "Dependency graph is valid");
        Ok(())
    }

    fn visit(&mut self, key: &DependencyKey) -> Result<(), AnbarError> {
        if self.validated.contains(key) {
            return Ok(());
        }

        if self.visiting.contains(key) {
            let start = self.path.iter().position(|k| k == key).unwrap_or(0);
            let mut chain = self.path[start..].to_vec();
            chain.push(*key);

            let names: Vec<String> = chain.iter().map(DependencyKey::short_name).collect();
            warn!(cycle = %render_chain(&names), "Circular dependency in manifests");
            return Err(AnbarError::CircularDependency(CircularDependencyError { chain }));
        }

        let Some(info) = self.nodes.get(key).cloned() else {
            if self.deferred.contains(key) {
                return Ok(());
            }
            return Err(self.missing(key));
        };

        self.visiting.insert(*key);
        self.path.push(*key);

        for dep in &info.dependencies {
            self.visit(dep)?;
        }

        self.path.pop();
        self.visiting.remove(key);
        self.validated.insert(*key);
        Ok(())
    }

    /// A scoped instance reachable from a singleton would outlive its unit.
    ///
    /// Transients are owned by whoever builds them, so a singleton's transient
    /// dependencies are walked as if they were its own. Acyclic by the time
    /// this runs.
    fn check_captive(&self, consumer: &DependencyInfo) -> Result<(), AnbarError> {
        if consumer.scope != Scope::Singleton {
            return Ok(());
        }

        let mut pending: Vec<DependencyKey> = consumer.dependencies.iter().rev().copied().collect();
        let mut seen = HashSet::new();
        while let Some(dep) = pending.pop() {
            if !seen.insert(dep) {
                continue;
            }
            let Some(info) = self.nodes.get(&dep) else {
                continue;
            };
            match info.scope {
                Scope::Scoped => return Err(scope_mismatch(consumer, info)),
                Scope::Transient => pending.extend(info.dependencies.iter().rev().copied()),
                Scope::Singleton => {}
            }
        }
        Ok(())
    }

    fn missing(&self, key: &DependencyKey) -> AnbarError {
        let names: Vec<&'static str> = self.nodes.keys().map(|k| k.type_name()).collect();
        AnbarError::UnregisteredBinding(UnregisteredBindingError {
            requested: *key,
            required_by: self.path.last().copied(),
            suggestions: suggest_similar(key.type_name(), &names, 3),
        })
    }
}

fn scope_mismatch(consumer: &DependencyInfo, dependency: &DependencyInfo) -> AnbarError {
    warn!(
        consumer = %consumer.key,
        consumer_scope = %consumer.scope,
        dependency = %dependency.key,
        dependency_scope = %dependency.scope,
        "Scope mismatch"
    );
    AnbarError::ScopeMismatch(ScopeMismatchError {
        consumer: consumer.key,
        consumer_scope: consumer.scope,
        dependency: dependency.key,
        dependency_scope: dependency.scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Logger;
    struct RequestId;
    struct Widget;
    struct Cache;

    fn node(key: DependencyKey, scope: Scope, deps: Vec<DependencyKey>) -> DependencyInfo {
        DependencyInfo {
            key,
            dependencies: deps,
            scope,
        }
    }

    fn graph(nodes: Vec<DependencyInfo>) -> GraphValidator {
        GraphValidator::new(nodes.into_iter().map(|n| (n.key, n)).collect(), HashSet::new())
    }

    #[test]
    fn widget_graph_is_valid() {
        let validator = graph(vec![
            node(DependencyKey::of::<Logger>(), Scope::Singleton, vec![]),
            node(DependencyKey::of::<RequestId>(), Scope::Scoped, vec![]),
            node(
                DependencyKey::of::<Widget>(),
                Scope::Transient,
                vec![DependencyKey::of::<Logger>(), DependencyKey::of::<RequestId>()],
            ),
        ]);
        assert!(validator.validate().is_ok());
    }

    #[test]
    fn cycle_through_manifests() {
        let validator = graph(vec![
            node(
                DependencyKey::of::<Logger>(),
                Scope::Transient,
                vec![DependencyKey::of::<Widget>()],
            ),
            node(
                DependencyKey::of::<Widget>(),
                Scope::Transient,
                vec![DependencyKey::of::<Logger>()],
            ),
        ]);

        match validator.validate() {
            Err(AnbarError::CircularDependency(e)) => {
                assert_eq!(e.chain.len(), 3);
                assert!(e.contains(&DependencyKey::of::<Logger>()));
                assert!(e.contains(&DependencyKey::of::<Widget>()));
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }
    }

    #[test]
    fn self_dependency() {
        let validator = graph(vec![node(
            DependencyKey::of::<Widget>(),
            Scope::Transient,
            vec![DependencyKey::of::<Widget>()],
        )]);
        assert!(matches!(validator.validate(), Err(AnbarError::CircularDependency(_))));
    }

    #[test]
    fn missing_dependency_names_consumer() {
        let validator = graph(vec![node(
            DependencyKey::of::<Widget>(),
            Scope::Transient,
            vec![DependencyKey::of::<Cache>()],
        )]);

        match validator.validate() {
            Err(AnbarError::UnregisteredBinding(e)) => {
                assert_eq!(e.requested, DependencyKey::of::<Cache>());
                assert_eq!(e.required_by, Some(DependencyKey::of::<Widget>()));
            }
            other => panic!("Expected UnregisteredBinding, got: {other:?}"),
        }
    }

    #[test]
    fn deferred_keys_count_as_present() {
        let widget = node(
            DependencyKey::of::<Widget>(),
            Scope::Transient,
            vec![DependencyKey::of::<Cache>()],
        );
        let validator = GraphValidator::new(
            HashMap::from([(widget.key, widget)]),
            HashSet::from([DependencyKey::of::<Cache>()]),
        );
        assert!(validator.validate().is_ok());
    }

    #[test]
    fn singleton_capturing_scoped_is_rejected() {
        let validator = graph(vec![
            node(DependencyKey::of::<RequestId>(), Scope::Scoped, vec![]),
            node(
                DependencyKey::of::<Logger>(),
                Scope::Singleton,
                vec![DependencyKey::of::<RequestId>()],
            ),
        ]);

        match validator.validate() {
            Err(AnbarError::ScopeMismatch(e)) => {
                assert_eq!(e.consumer_scope, Scope::Singleton);
                assert_eq!(e.dependency_scope, Scope::Scoped);
            }
            other => panic!("Expected ScopeMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn shorter_lived_non_scoped_dependencies_are_allowed() {
        let validator = graph(vec![
            node(DependencyKey::of::<Widget>(), Scope::Transient, vec![]),
            node(
                DependencyKey::of::<Logger>(),
                Scope::Singleton,
                vec![DependencyKey::of::<Widget>()],
            ),
            node(
                DependencyKey::of::<RequestId>(),
                Scope::Scoped,
                vec![DependencyKey::of::<Widget>()],
            ),
        ]);
        assert!(validator.validate().is_ok());
    }

    #[test]
    fn singleton_capturing_scoped_through_transient_is_rejected() {
        let validator = graph(vec![
            node(DependencyKey::of::<RequestId>(), Scope::Scoped, vec![]),
            node(
                DependencyKey::of::<Widget>(),
                Scope::Transient,
                vec![DependencyKey::of::<RequestId>()],
            ),
            node(
                DependencyKey::of::<Cache>(),
                Scope::Singleton,
                vec![DependencyKey::of::<Widget>()],
            ),
        ]);

        match validator.validate() {
            Err(AnbarError::ScopeMismatch(e)) => {
                assert_eq!(e.consumer, DependencyKey::of::<Cache>());
                assert_eq!(e.dependency, DependencyKey::of::<RequestId>());
            }
            other => panic!("Expected ScopeMismatch, got: {other:?}"),
        }
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        struct Top;
        struct Left;
        struct Right;

        let validator = graph(vec![
            node(DependencyKey::of::<Cache>(), Scope::Singleton, vec![]),
            node(
                DependencyKey::of::<Left>(),
                Scope::Singleton,
                vec![DependencyKey::of::<Cache>()],
            ),
            node(
                DependencyKey::of::<Right>(),
                Scope::Singleton,
                vec![DependencyKey::of::<Cache>()],
            ),
            node(
                DependencyKey::of::<Top>(),
                Scope::Transient,
                vec![DependencyKey::of::<Left>(), DependencyKey::of::<Right>()],
            ),
        ]);
        assert!(validator.validate().is_ok());
    }
}
