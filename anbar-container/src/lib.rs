//! Core of Anbar: the container, units of work, method injection and the
//! service-provider bootstrapper.

pub mod bootstrap;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod container;
pub mod error;
mod graph;
pub mod injector;
pub mod instance;
pub mod key;
pub mod provider;
pub mod registry;
pub mod scope;
#[cfg(feature = "async")]
mod task;
pub mod unit;

pub use container::prelude;
pub use container::{Container, ContainerBuilder, ScopedContainer};
pub use error::{AnbarError, Result};
pub use instance::{Dependencies, Injectable, Instance};
pub use key::DependencyKey;
pub use scope::Scope;

pub use inventory;
