//! Async units of work.
//!
//! [`Container::run_unit`] runs a future inside a fresh unit and ends the
//! unit when the future completes or is dropped. While it runs, the unit is
//! also available as [`UnitOfWork::current`] to code that cannot take it as
//! an argument. The task-local does not follow `tokio::spawn`; pass the
//! unit explicitly to spawned tasks.

use std::future::Future;
use std::sync::Arc;

use crate::container::Container;
use crate::error::Result;
use crate::unit::UnitOfWork;

tokio::task_local! {
    static CURRENT_UNIT: UnitOfWork;
}

/// Ends its unit on drop, which also covers cancellation.
struct EndOnDrop(UnitOfWork);

impl Drop for EndOnDrop {
    fn drop(&mut self) {
        self.0.end();
    }
}

impl Container {
    /// Runs `f` inside a new unit of work.
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use anbar_container::prelude::*;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// struct RequestId(u64);
    ///
    /// let container = Container::builder()
    ///     .scoped::<RequestId>(|r| Ok(Arc::new(RequestId(r.unit().map_or(0, |u| u.id())))))
    ///     .build()
    ///     .unwrap();
    ///
    /// let id = container
    ///     .run_unit(|unit| async move { unit.id() })
    ///     .await;
    /// assert!(id > 0);
    /// assert_eq!(container.active_units(), 0);
    /// # }
    /// ```
    pub async fn run_unit<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce(UnitOfWork) -> Fut,
        Fut: Future<Output = T>,
    {
        let unit = self.begin_unit();
        let _guard = EndOnDrop(unit.clone());
        CURRENT_UNIT.scope(unit.clone(), f(unit)).await
    }

    /// Resolves `T` in the current task's unit, or with no unit outside one.
    pub fn resolve_current<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        match UnitOfWork::current() {
            Some(unit) => self.resolve_in::<T>(&unit),
            None => self.resolve::<T>(),
        }
    }
}

impl UnitOfWork {
    /// The unit of the enclosing [`Container::run_unit`], if any.
    pub fn current() -> Option<UnitOfWork> {
        CURRENT_UNIT.try_with(UnitOfWork::clone).ok()
    }
}
