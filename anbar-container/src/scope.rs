//! Binding lifetimes.
//!
//! - [`Scope::Singleton`]: one instance for the whole process
//! - [`Scope::Scoped`]: one instance per unit of work (request, job, CLI run)
//! - [`Scope::Transient`]: a fresh instance on every resolve
//!
//! Scopes are ordered by how long their instances live, which is what
//! graph validation uses to reject captive dependencies.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{AnbarError, InvalidScopeError};

/// Lifetime of a binding's instances.
///
/// ```
/// use anbar_container::scope::Scope;
///
/// assert!(Scope::Singleton > Scope::Scoped);
/// assert!(Scope::Scoped > Scope::Transient);
/// assert_eq!("scoped".parse::<Scope>().unwrap(), Scope::Scoped);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Never cached; every resolve constructs.
    Transient,

    /// Cached in the active unit of work and released when it ends.
    /// Resolving a scoped key without a unit is an error.
    Scoped,

    /// Cached for the life of the container and shared by every unit.
    Singleton,
}

impl Scope {
    /// Whether instances are kept after construction.
    #[inline]
    pub fn is_cached(&self) -> bool {
        !matches!(self, Scope::Transient)
    }

    /// Whether resolution needs an active unit of work.
    #[inline]
    pub fn requires_unit(&self) -> bool {
        matches!(self, Scope::Scoped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Singleton => "Singleton",
            Scope::Scoped => "Scoped",
            Scope::Transient => "Transient",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = AnbarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "singleton" => Ok(Scope::Singleton),
            "scoped" => Ok(Scope::Scoped),
            "transient" => Ok(Scope::Transient),
            _ => Err(AnbarError::InvalidScope(InvalidScopeError {
                value: s.to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_lifetime() {
        let mut scopes = vec![Scope::Singleton, Scope::Transient, Scope::Scoped];
        scopes.sort();
        assert_eq!(scopes, vec![Scope::Transient, Scope::Scoped, Scope::Singleton]);
    }

    #[test]
    fn caching_and_unit_requirements() {
        assert!(Scope::Singleton.is_cached());
        assert!(Scope::Scoped.is_cached());
        assert!(!Scope::Transient.is_cached());
        assert!(Scope::Scoped.requires_unit());
        assert!(!Scope::Singleton.requires_unit());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Singleton".parse::<Scope>().unwrap(), Scope::Singleton);
        assert_eq!("TRANSIENT".parse::<Scope>().unwrap(), Scope::Transient);
        match "request".parse::<Scope>() {
            Err(AnbarError::InvalidScope(e)) => assert_eq!(e.value, "request"),
            other => panic!("Expected InvalidScope, got: {other:?}"),
        }
    }

    #[test]
    fn deserializes_from_snake_case() {
        let scope: Scope = serde_json::from_str("\"scoped\"").unwrap();
        assert_eq!(scope, Scope::Scoped);
    }
}
