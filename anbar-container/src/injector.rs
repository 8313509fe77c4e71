//! Method injection: call a function whose parameters are filled partly by
//! the caller and partly by the container.
//!
//! A callable describes its parameters up front (name, key, optional
//! default). For each one the injector takes, in order: the caller's
//! explicit value, the container's binding, the declared default. Anything
//! else is [`AnbarError::MissingDependency`].
//!
//! ```rust
//! use std::sync::Arc;
//! use anbar_container::prelude::*;
//!
//! struct Greeter;
//! impl Greeter {
//!     fn greet(&self, who: &str) -> String { format!("hello {who}") }
//! }
//!
//! let container = Container::builder()
//!     .instance(Greeter)
//!     .build()
//!     .unwrap();
//!
//! let handler = Method::builder("show_user")
//!     .param::<Greeter>("greeter")
//!     .param::<String>("user")
//!     .returns(|args| {
//!         let greeter = args.get::<Greeter>("greeter")?;
//!         let user = args.get::<String>("user")?;
//!         Ok(greeter.greet(&user))
//!     });
//!
//! let out = MethodInjector::new(&container)
//!     .invoke(&handler, KnownArgs::new().with("user", "amir".to_string()), None)
//!     .unwrap();
//! assert_eq!(out, "hello amir");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use crate::container::Container;
use crate::error::{AnbarError, MissingDependencyError, Result};
use crate::instance::Instance;
use crate::key::DependencyKey;
use crate::unit::UnitOfWork;

type DefaultFn = Arc<dyn Fn() -> Instance + Send + Sync>;

/// One declared parameter of an injectable callable.
#[derive(Clone)]
pub struct Parameter {
    name: &'static str,
    key: DependencyKey,
    default: Option<DefaultFn>,
}

impl Parameter {
    pub fn new(name: &'static str, key: DependencyKey) -> Self {
        Self {
            name,
            key,
            default: None,
        }
    }

    /// Value used when neither the caller nor the container supplies one.
    pub fn with_default<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.default = Some(Arc::new(move || Instance::new(value.clone())));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn key(&self) -> DependencyKey {
        self.key
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("has_default", &self.has_default())
            .finish()
    }
}

/// A callable with a static parameter manifest.
pub trait InjectableMethod {
    type Output;

    /// Used in errors.
    fn name(&self) -> &str;

    /// Parameters in declaration order.
    fn parameters(&self) -> &[Parameter];

    fn call(&self, args: Arguments) -> Result<Self::Output>;
}

// ── Arguments ──

/// Values the caller already has, by parameter name.
#[derive(Debug, Default, Clone)]
pub struct KnownArgs {
    values: HashMap<String, Instance>,
}

impl KnownArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Send + Sync + 'static>(self, name: impl Into<String>, value: T) -> Self {
        self.with_instance(name, Instance::new(value))
    }

    /// A shared value, possibly a trait object.
    pub fn with_arc<T: ?Sized + Send + Sync + 'static>(self, name: impl Into<String>, value: Arc<T>) -> Self {
        self.with_instance(name, Instance::from_arc(value))
    }

    pub fn with_instance(mut self, name: impl Into<String>, value: Instance) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn take(&mut self, name: &str) -> Option<Instance> {
        self.values.remove(name)
    }
}

/// Every parameter of one call, resolved.
#[derive(Debug)]
pub struct Arguments {
    method: String,
    values: HashMap<&'static str, (DependencyKey, Instance)>,
}

impl Arguments {
    /// Typed access to the parameter called `name`.
    ///
    /// # Errors
    /// - [`AnbarError::MissingDependency`]: no parameter called `name`
    /// - [`AnbarError::TypeMismatch`]: the value is not a `T`
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        match self.values.get(name) {
            Some((key, value)) => value.downcast_for::<T>(key),
            None => Err(AnbarError::MissingDependency(MissingDependencyError {
                method: self.method.clone(),
                parameter: name,
                key: DependencyKey::of::<T>(),
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ── Method builder ──

/// A closure plus its parameter manifest.
pub struct Method<R> {
    name: String,
    parameters: Vec<Parameter>,
    body: Box<dyn Fn(Arguments) -> Result<R> + Send + Sync>,
}

impl<R> Method<R> {
    pub fn builder(name: impl Into<String>) -> MethodBuilder<R> {
        MethodBuilder {
            name: name.into(),
            parameters: Vec::new(),
            _output: PhantomData,
        }
    }
}

impl<R> InjectableMethod for Method<R> {
    type Output = R;

    fn name(&self) -> &str {
        &self.name
    }

    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn call(&self, args: Arguments) -> Result<R> {
        (self.body)(args)
    }
}

impl<R> fmt::Debug for Method<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

pub struct MethodBuilder<R> {
    name: String,
    parameters: Vec<Parameter>,
    _output: PhantomData<fn() -> R>,
}

impl<R> MethodBuilder<R> {
    /// A parameter resolved by type.
    pub fn param<T: ?Sized + 'static>(mut self, name: &'static str) -> Self {
        self.parameters.push(Parameter::new(name, DependencyKey::of::<T>()));
        self
    }

    /// A parameter with a fallback value.
    pub fn param_or<T: Clone + Send + Sync + 'static>(mut self, name: &'static str, default: T) -> Self {
        self.parameters
            .push(Parameter::new(name, DependencyKey::of::<T>()).with_default(default));
        self
    }

    /// A parameter resolved from the binding named `key_name`.
    pub fn named_param<T: ?Sized + 'static>(mut self, name: &'static str, key_name: &'static str) -> Self {
        self.parameters
            .push(Parameter::new(name, DependencyKey::named::<T>(key_name)));
        self
    }

    pub fn returns(self, body: impl Fn(Arguments) -> Result<R> + Send + Sync + 'static) -> Method<R> {
        Method {
            name: self.name,
            parameters: self.parameters,
            body: Box::new(body),
        }
    }
}

// ── Injector ──

/// Calls [`InjectableMethod`]s against a container.
#[derive(Debug, Clone, Copy)]
pub struct MethodInjector<'c> {
    container: &'c Container,
}

impl<'c> MethodInjector<'c> {
    pub fn new(container: &'c Container) -> Self {
        Self { container }
    }

    /// Fills every parameter and calls `method`.
    ///
    /// Explicit values in `known` always win and are never looked up in the
    /// container. Scoped parameters resolve inside `unit`.
    ///
    /// # Errors
    /// [`AnbarError::MissingDependency`] for a parameter with no value, no
    /// binding and no default; resolution errors as they come; whatever the
    /// method body returns.
    pub fn invoke<M>(&self, method: &M, mut known: KnownArgs, unit: Option<&UnitOfWork>) -> Result<M::Output>
    where
        M: InjectableMethod + ?Sized,
    {
        let mut values = HashMap::with_capacity(method.parameters().len());

        for param in method.parameters() {
            let value = if let Some(explicit) = known.take(param.name) {
                trace!(method = method.name(), parameter = param.name, "Explicit argument");
                explicit
            } else if self.container.can_resolve(&param.key) {
                trace!(method = method.name(), parameter = param.name, key = %param.key, "Resolving argument");
                self.container.resolve_key(&param.key, unit)?
            } else if let Some(default) = &param.default {
                trace!(method = method.name(), parameter = param.name, "Default argument");
                default()
            } else {
                return Err(AnbarError::MissingDependency(MissingDependencyError {
                    method: method.name().to_string(),
                    parameter: param.name,
                    key: param.key,
                }));
            };
            values.insert(param.name, (param.key, value));
        }

        if !known.is_empty() {
            trace!(method = method.name(), unused = known.len(), "Ignoring undeclared arguments");
        }

        method.call(Arguments {
            method: method.name().to_string(),
            values,
        })
    }
}
