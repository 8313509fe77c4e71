//! Error types for container, injector, and bootstrap operations.
//!
//! Every failure names the keys involved and, where it helps, a hint
//! about the usual fix.

use std::fmt;

use anbar_support::rendering::{ChainEntry, render_chain, render_scope_chain};

use crate::key::DependencyKey;
use crate::scope::Scope;

/// Main error type for all Anbar operations.
#[derive(Debug, thiserror::Error)]
pub enum AnbarError {
    /// A binding for the key already exists and overriding is not allowed.
    #[error("{}", .0)]
    DuplicateBinding(DuplicateBindingError),

    /// Nothing is bound to the key and no deferred provider promises it.
    #[error("{}", .0)]
    UnregisteredBinding(UnregisteredBindingError),

    /// The key is already being constructed further up the stack.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A scoped key was resolved outside of a live unit of work.
    #[error("{}", .0)]
    ScopeMisuse(ScopeMisuseError),

    /// A method parameter could not be supplied.
    #[error("{}", .0)]
    MissingDependency(MissingDependencyError),

    /// A provider's `register` or `boot` hook failed.
    #[error("{}", .0)]
    ProviderActivation(ProviderActivationError),

    /// A deferred provider failed too often and is no longer retried.
    #[error("Deferred provider {provider} is suspended after {failures} failed activation(s)")]
    ActivationSuspended { provider: String, failures: u32 },

    /// Graph validation found a singleton that would hold a scoped instance.
    #[error("{}", .0)]
    ScopeMismatch(ScopeMismatchError),

    /// A stored value could not be viewed as the requested type.
    #[error("Type mismatch for {key}: expected {expected}")]
    TypeMismatch {
        key: DependencyKey,
        expected: &'static str,
    },

    /// A deferred provider descriptor promises no keys.
    #[error("Deferred provider {provider} must declare at least one provided key")]
    InvalidDescriptor { provider: String },

    /// Configuration named a provider id the catalog does not know.
    #[error("{}", .0)]
    UnknownProvider(UnknownProviderError),

    /// A scope name in configuration is not recognised.
    #[error("{}", .0)]
    InvalidScope(InvalidScopeError),

    /// A factory or constructor failed with a foreign error.
    #[error("Failed to construct {key}: {source}")]
    ConstructionFailed {
        key: DependencyKey,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl AnbarError {
    /// Wraps any error raised while building `key`.
    pub fn construction(
        key: DependencyKey,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        AnbarError::ConstructionFailed {
            key,
            source: source.into(),
        }
    }

    /// Programmer errors are not worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnbarError::ProviderActivation(e) => e.source.is_retryable(),
            AnbarError::ConstructionFailed { .. } => true,
            _ => false,
        }
    }
}

/// Attempt to bind a key twice.
#[derive(Debug)]
pub struct DuplicateBindingError {
    pub key: DependencyKey,
}

impl fmt::Display for DuplicateBindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binding already registered: {}", self.key)?;
        write!(
            f,
            "\n  Hint: use Container::override_binding in tests, or enable allow_override in ContainerSettings"
        )
    }
}

/// Lookup miss that no deferred provider could satisfy.
#[derive(Debug)]
pub struct UnregisteredBindingError {
    pub requested: DependencyKey,
    /// The key whose construction needed this one, if any.
    pub required_by: Option<DependencyKey>,
    /// Registered keys with similar names.
    pub suggestions: Vec<String>,
}

impl fmt::Display for UnregisteredBindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No binding registered for {}", self.requested)?;

        if let Some(parent) = &self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: register it in a provider, or list it in a deferred provider's provides()"
        )
    }
}

/// Cycle found on the resolution stack.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// Keys from the first occurrence to the repeated one, e.g. `[A, B, A]`.
    pub chain: Vec<DependencyKey>,
}

impl CircularDependencyError {
    pub fn contains(&self, key: &DependencyKey) -> bool {
        self.chain.contains(key)
    }
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.chain.iter().map(DependencyKey::short_name).collect();
        write!(f, "Circular dependency detected:\n  {}", render_chain(&names))?;
        write!(
            f,
            "\n  Hint: break the cycle with a factory that resolves lazily, or split a service"
        )
    }
}

/// Why a scoped resolution was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMisuseReason {
    /// The caller supplied no unit of work.
    NoActiveUnit,
    /// The unit of work was already ended.
    UnitEnded { unit: u64 },
}

#[derive(Debug)]
pub struct ScopeMisuseError {
    pub key: DependencyKey,
    pub reason: ScopeMisuseReason,
}

impl fmt::Display for ScopeMisuseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            ScopeMisuseReason::NoActiveUnit => write!(
                f,
                "Scoped binding {} resolved without an active unit of work",
                self.key
            )?,
            ScopeMisuseReason::UnitEnded { unit } => write!(
                f,
                "Scoped binding {} resolved in unit #{unit}, which has already ended",
                self.key
            )?,
        }
        write!(
            f,
            "\n  Hint: resolve through Container::create_scope() or pass the unit to resolve_in()"
        )
    }
}

/// Method parameter with no explicit value, no binding, and no default.
#[derive(Debug)]
pub struct MissingDependencyError {
    pub method: String,
    pub parameter: &'static str,
    pub key: DependencyKey,
}

impl fmt::Display for MissingDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot call {}: parameter `{}` ({}) has no value, no binding and no default",
            self.method, self.parameter, self.key
        )
    }
}

/// Which provider hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPhase {
    Register,
    Boot,
}

impl fmt::Display for ProviderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderPhase::Register => f.write_str("register"),
            ProviderPhase::Boot => f.write_str("boot"),
        }
    }
}

#[derive(Debug)]
pub struct ProviderActivationError {
    pub provider: String,
    pub phase: ProviderPhase,
    pub deferred: bool,
    pub source: Box<AnbarError>,
}

impl fmt::Display for ProviderActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.deferred { "deferred provider" } else { "provider" };
        write!(
            f,
            "{kind} {} failed during {}: {}",
            self.provider, self.phase, self.source
        )?;
        if self.deferred {
            write!(f, "\n  The provider stays pending; the next resolve of its keys retries")?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderActivationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// A captive dependency: the consumer outlives what it holds.
#[derive(Debug)]
pub struct ScopeMismatchError {
    pub consumer: DependencyKey,
    pub consumer_scope: Scope,
    pub dependency: DependencyKey,
    pub dependency_scope: Scope,
}

impl fmt::Display for ScopeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Scope mismatch: a {} binding cannot depend on a {} binding",
            self.consumer_scope, self.dependency_scope
        )?;
        let chain = render_scope_chain(&[
            ChainEntry::new(self.consumer.short_name(), self.consumer_scope.as_str()),
            ChainEntry::new(self.dependency.short_name(), self.dependency_scope.as_str()),
        ]);
        write!(f, "{chain}")?;
        write!(
            f,
            "  Hint: make {} {} or longer-lived",
            self.dependency, self.consumer_scope
        )
    }
}

#[derive(Debug)]
pub struct UnknownProviderError {
    pub id: String,
    pub suggestions: Vec<String>,
}

impl fmt::Display for UnknownProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown provider id {:?}", self.id)?;
        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean: {}", self.suggestions.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct InvalidScopeError {
    pub value: String,
}

impl fmt::Display for InvalidScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown scope {:?}; expected singleton, scoped or transient",
            self.value
        )
    }
}

/// Convenient Result type for Anbar operations.
pub type Result<T> = std::result::Result<T, AnbarError>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;
    struct RequestId;

    #[test]
    fn unregistered_display_lists_suggestions() {
        let err = AnbarError::UnregisteredBinding(UnregisteredBindingError {
            requested: DependencyKey::of::<RequestId>(),
            required_by: Some(DependencyKey::of::<Widget>()),
            suggestions: vec!["app::RequestIds".into()],
        });

        let msg = err.to_string();
        assert!(msg.contains("No binding registered for RequestId"));
        assert!(msg.contains("Required by: Widget"));
        assert!(msg.contains("app::RequestIds"));
    }

    #[test]
    fn cycle_display_renders_chain() {
        let err = CircularDependencyError {
            chain: vec![
                DependencyKey::of::<Widget>(),
                DependencyKey::of::<RequestId>(),
                DependencyKey::of::<Widget>(),
            ],
        };

        assert!(err.to_string().contains("Widget → RequestId → Widget"));
        assert!(err.contains(&DependencyKey::of::<RequestId>()));
    }

    #[test]
    fn scope_misuse_names_the_unit() {
        let err = ScopeMisuseError {
            key: DependencyKey::of::<RequestId>(),
            reason: ScopeMisuseReason::UnitEnded { unit: 7 },
        };
        assert!(err.to_string().contains("unit #7"));
    }

    #[test]
    fn scope_mismatch_display() {
        let err = AnbarError::ScopeMismatch(ScopeMismatchError {
            consumer: DependencyKey::of::<Widget>(),
            consumer_scope: Scope::Singleton,
            dependency: DependencyKey::of::<RequestId>(),
            dependency_scope: Scope::Scoped,
        });

        let msg = err.to_string();
        assert!(msg.contains("Singleton"));
        assert!(msg.contains("Scoped"));
        assert!(msg.contains("↓"));
    }

    #[test]
    fn activation_error_keeps_source() {
        use std::error::Error as _;

        let err = ProviderActivationError {
            provider: "CacheProvider".into(),
            phase: ProviderPhase::Boot,
            deferred: true,
            source: Box::new(AnbarError::construction(
                DependencyKey::of::<Widget>(),
                "redis unreachable",
            )),
        };

        assert!(err.to_string().contains("during boot"));
        assert!(err.source().is_some());
        assert!(AnbarError::ProviderActivation(err).is_retryable());
    }
}
