//! Settings for the container and the bootstrapper.
//!
//! Anbar never reads configuration files. These structs derive
//! [`Deserialize`] so whatever loader the application uses can produce
//! them; every field has a default.

use serde::Deserialize;

/// Container-wide behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Let a second registration of a key replace the first instead of
    /// failing with `DuplicateBinding`.
    pub allow_override: bool,
}

/// How the bootstrapper drives providers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    /// Validate the dependency graph between the register and boot phases.
    pub validate_graph: bool,
    /// What happens after a deferred provider fails to activate.
    pub activation_policy: ActivationPolicy,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            validate_graph: true,
            activation_policy: ActivationPolicy::default(),
        }
    }
}

/// Failure policy for deferred provider activation.
///
/// ```
/// use anbar_container::config::ActivationPolicy;
///
/// let policy = ActivationPolicy::CircuitBreak { max_failures: 3 };
/// assert!(!policy.should_suspend(2));
/// assert!(policy.should_suspend(3));
/// assert!(!ActivationPolicy::RetryForever.should_suspend(u32::MAX));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ActivationPolicy {
    /// Every miss after a failure tries again.
    #[default]
    RetryForever,
    /// Stop trying after `max_failures` consecutive failures.
    CircuitBreak { max_failures: u32 },
}

impl ActivationPolicy {
    /// Whether `failures` consecutive failures should suspend the provider.
    pub fn should_suspend(&self, failures: u32) -> bool {
        match self {
            ActivationPolicy::RetryForever => false,
            ActivationPolicy::CircuitBreak { max_failures } => failures >= (*max_failures).max(1),
        }
    }
}

/// One entry of the configured provider list.
///
/// `provider` is a catalog id; `deferred` and `priority` override what the
/// provider declares about itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    #[serde(default)]
    pub deferred: Option<bool>,
    #[serde(default)]
    pub priority: Option<i32>,
}

impl ProviderConfig {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            deferred: None,
            priority: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = BootstrapSettings::default();
        assert!(settings.validate_graph);
        assert_eq!(settings.activation_policy, ActivationPolicy::RetryForever);
        assert!(!ContainerSettings::default().allow_override);
    }

    #[test]
    fn bootstrap_settings_from_json() {
        let settings: BootstrapSettings = serde_json::from_str(
            r#"{ "activation_policy": { "policy": "circuit_break", "max_failures": 2 } }"#,
        )
        .unwrap();

        assert!(settings.validate_graph);
        assert_eq!(
            settings.activation_policy,
            ActivationPolicy::CircuitBreak { max_failures: 2 }
        );
    }

    #[test]
    fn provider_list_from_json() {
        let providers: Vec<ProviderConfig> = serde_json::from_str(
            r#"[
                { "provider": "logging" },
                { "provider": "cache", "deferred": true, "priority": 5 }
            ]"#,
        )
        .unwrap();

        assert_eq!(providers[0], ProviderConfig::new("logging"));
        assert_eq!(providers[1].deferred, Some(true));
        assert_eq!(providers[1].priority, Some(5));
    }

    #[test]
    fn zero_max_failures_still_allows_one_attempt() {
        let policy = ActivationPolicy::CircuitBreak { max_failures: 0 };
        assert!(policy.should_suspend(1));
        assert!(!policy.should_suspend(0));
    }
}
