use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anbar::prelude::*;

trait Logger: Send + Sync {
    fn name(&self) -> &'static str;
}

struct Stdout;

impl Logger for Stdout {
    fn name(&self) -> &'static str {
        "stdout"
    }
}

struct Database(&'static str);

struct RequestId(u64);

#[derive(Injectable)]
struct Widget {
    logger: Arc<dyn Logger>,
    request: Arc<RequestId>,
}

#[derive(Injectable)]
struct Reporter {
    #[inject(name = "replica")]
    db: Arc<Database>,
    #[inject(default)]
    runs: AtomicU32,
}

#[derive(Injectable)]
struct Standalone {}

fn container() -> Container {
    Container::builder()
        .singleton::<dyn Logger>(|_| Ok(Arc::new(Stdout) as Arc<dyn Logger>))
        .scoped::<RequestId>(|r| Ok(Arc::new(RequestId(r.unit().map_or(0, UnitOfWork::id)))))
        .construct::<Widget>(Scope::Transient)
        .bind(
            DependencyKey::named::<Database>("replica"),
            Strategy::instance(Database("replica-1")),
            Scope::Singleton,
        )
        .construct::<Reporter>(Scope::Singleton)
        .construct::<Standalone>(Scope::Transient)
        .build()
        .unwrap()
}

#[test]
fn manifest_lists_fields_in_order() {
    assert_eq!(
        Widget::dependencies(),
        vec![DependencyKey::of::<dyn Logger>(), DependencyKey::of::<RequestId>()]
    );
    assert_eq!(
        Reporter::dependencies(),
        vec![DependencyKey::named::<Database>("replica")]
    );
    assert!(Standalone::dependencies().is_empty());
}

#[test]
fn widget_lifetimes_across_units() {
    let container = container();
    assert!(container.validate().is_ok());

    let u1 = container.begin_unit();
    let u2 = container.begin_unit();
    let w1 = container.resolve_in::<Widget>(&u1).unwrap();
    let w2 = container.resolve_in::<Widget>(&u1).unwrap();
    let w3 = container.resolve_in::<Widget>(&u2).unwrap();

    assert_eq!(w1.logger.name(), "stdout");
    assert!(Arc::ptr_eq(&w1.logger, &w3.logger));
    assert!(Arc::ptr_eq(&w1.request, &w2.request));
    assert!(!Arc::ptr_eq(&w1.request, &w3.request));
    assert!(!Arc::ptr_eq(&w1, &w2));
}

#[test]
fn named_and_default_fields() {
    let container = container();
    let reporter = container.resolve::<Reporter>().unwrap();
    reporter.runs.fetch_add(1, Ordering::SeqCst);

    let again = container.resolve::<Reporter>().unwrap();
    assert_eq!(again.db.0, "replica-1");
    assert_eq!(again.runs.load(Ordering::SeqCst), 1);
    assert!(container.resolve::<Standalone>().is_ok());
}

#[test]
fn missing_field_binding_is_reported() {
    let container = Container::builder()
        .construct::<Widget>(Scope::Transient)
        .build()
        .unwrap();

    match container.validate() {
        Err(AnbarError::UnregisteredBinding(e)) => {
            assert_eq!(e.required_by, Some(DependencyKey::of::<Widget>()));
        }
        other => panic!("Expected UnregisteredBinding, got: {other:?}"),
    }
}
