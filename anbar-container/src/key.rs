//! Keys: what can be asked for.
//!
//! A [`DependencyKey`] names a resolvable thing by its Rust type and,
//! optionally, a binding name. Unsized types such as `dyn Trait` are
//! valid keys, which is how interface bindings are expressed.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use anbar_support::rendering::shorten_type_name;

/// Identifies a binding in the container.
///
/// Two keys are equal when both the [`TypeId`] and the name match. The
/// type name is carried only for diagnostics.
///
/// # Examples
/// ```
/// use anbar_container::key::DependencyKey;
///
/// trait Mailer {}
///
/// let mailer = DependencyKey::of::<dyn Mailer>();
/// assert_eq!(mailer.name(), None);
///
/// let primary = DependencyKey::named::<String>("primary_dsn");
/// let replica = DependencyKey::named::<String>("replica_dsn");
/// assert_ne!(primary, replica);
/// ```
#[derive(Clone, Copy)]
pub struct DependencyKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<&'static str>,
}

impl DependencyKey {
    /// Key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name: None,
        }
    }

    /// Key for type `T` under a binding name.
    #[inline]
    pub fn named<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name: Some(name),
            ..Self::of::<T>()
        }
    }

    /// Same type, different binding name.
    #[inline]
    pub fn with_name(self, name: &'static str) -> Self {
        Self {
            name: Some(name),
            ..self
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Type name without module paths, plus the binding name if any.
    pub fn short_name(&self) -> String {
        let short = shorten_type_name(self.type_name);
        match self.name {
            Some(name) => format!("{short}#{name}"),
            None => short,
        }
    }

    /// Whether this key was built for type `T` (ignoring the name).
    #[inline]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for DependencyKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl Eq for DependencyKey {}

impl Hash for DependencyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tuple = f.debug_tuple("DependencyKey");
        tuple.field(&format_args!("{}", self.type_name));
        if let Some(name) = self.name {
            tuple.field(&name);
        }
        tuple.finish()
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}
