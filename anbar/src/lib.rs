//! # Anbar: dependency injection and service-provider lifecycle for Rust
//!
//! Components declare what they need by type; the container builds,
//! caches and releases object graphs with singleton, scoped (per unit of
//! work) and transient lifetimes. Service providers register bindings in
//! two phases, eagerly at startup or lazily on first use.
//!
//! ```rust
//! use std::sync::Arc;
//! use anbar::prelude::*;
//!
//! struct Logger;
//! struct RequestId(u64);
//!
//! #[derive(Injectable)]
//! struct Widget {
//!     logger: Arc<Logger>,
//!     request: Arc<RequestId>,
//! }
//!
//! let container = Container::builder()
//!     .singleton::<Logger>(|_| Ok(Arc::new(Logger)))
//!     .scoped::<RequestId>(|r| Ok(Arc::new(RequestId(r.unit().map_or(0, |u| u.id())))))
//!     .construct::<Widget>(Scope::Transient)
//!     .build()
//!     .unwrap();
//!
//! let scope = container.create_scope();
//! let a = scope.resolve::<Widget>().unwrap();
//! let b = scope.resolve::<Widget>().unwrap();
//! assert!(Arc::ptr_eq(&a.request, &b.request));
//! assert!(!Arc::ptr_eq(&a, &b));
//! ```

pub use anbar_container::*;
pub use anbar_derive::*;
pub use anbar_support::*;

/// Everything needed to declare providers and resolve services.
pub mod prelude {
    pub use anbar_container::prelude::*;
    pub use anbar_derive::Injectable;
}
