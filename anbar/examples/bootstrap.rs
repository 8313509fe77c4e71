//! Providers, a deferred module, scoped requests and method injection.
//!
//! Run with `RUST_LOG=anbar_container=debug cargo run --example bootstrap`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anbar::prelude::*;
use tracing_subscriber::EnvFilter;

// === Services ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

struct Config {
    database_url: String,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("rows from {}", self.url)
    }
}

struct RequestId(u64);

#[derive(Injectable)]
struct UserRepository {
    db: Arc<Database>,
    request: Arc<RequestId>,
    #[inject(default)]
    lookups: AtomicU64,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.db
            .query(&format!("SELECT * FROM users WHERE id = {id} /* req {} */", self.request.0))
    }
}

/// Expensive; only built if something asks for it.
struct ReportEngine;

// === Providers ===

struct CoreProvider;

impl ServiceProvider for CoreProvider {
    fn register(&self, registry: &mut dyn ProviderRegistry) -> Result<()> {
        registry.instance(Config {
            database_url: "postgres://localhost/app".to_string(),
        })?;
        registry.singleton::<dyn Logger>(|_| Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>))?;
        registry.singleton::<Database>(|r| {
            let config = r.resolve::<Config>()?;
            Ok(Arc::new(Database {
                url: config.database_url.clone(),
                logger: r.resolve::<dyn Logger>()?,
            }))
        })
    }

    fn boot(&self, container: &Container) -> Result<()> {
        container.resolve::<dyn Logger>()?.log("core booted");
        Ok(())
    }
}

struct RequestProvider;

impl ServiceProvider for RequestProvider {
    fn register(&self, registry: &mut dyn ProviderRegistry) -> Result<()> {
        registry.scoped::<RequestId>(|r| Ok(Arc::new(RequestId(r.unit().map_or(0, UnitOfWork::id)))))?;
        registry.construct::<UserRepository>(Scope::Scoped)
    }

    fn priority(&self) -> i32 {
        10
    }
}

struct ReportProvider;

impl ServiceProvider for ReportProvider {
    fn register(&self, registry: &mut dyn ProviderRegistry) -> Result<()> {
        println!("📊 Report engine provider activated");
        registry.singleton::<ReportEngine>(|_| Ok(Arc::new(ReportEngine)))
    }

    fn is_deferred(&self) -> bool {
        true
    }

    fn provides(&self) -> Vec<DependencyKey> {
        vec![DependencyKey::of::<ReportEngine>()]
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("anbar_container=info")))
        .init();

    let container = Container::new();
    let bootstrapper = Bootstrapper::new(vec![
        ProviderDescriptor::new(RequestProvider),
        ProviderDescriptor::new(CoreProvider),
        ProviderDescriptor::new(ReportProvider),
    ])?;
    bootstrapper.load(&container)?;

    println!("✅ Bootstrapped: {container:?}");

    // === One scope per request ===
    for user in [42, 7] {
        let scope = container.create_scope();
        let repo = scope.resolve::<UserRepository>()?;
        println!("👤 {}", repo.find_user(user));

        let again = scope.resolve::<UserRepository>()?;
        again.find_user(user);
        tracing::info!(
            unit = scope.unit().id(),
            lookups = repo.lookups.load(Ordering::Relaxed),
            "Request handled"
        );
    }

    // === Method injection with an explicit argument ===
    let handler = Method::builder("show_user")
        .param::<Database>("db")
        .param::<u64>("user_id")
        .returns(|args| {
            let db = args.get::<Database>("db")?;
            let id = args.get::<u64>("user_id")?;
            Ok(db.query(&format!("SELECT name FROM users WHERE id = {id}")))
        });
    let out = MethodInjector::new(&container).invoke(&handler, KnownArgs::new().with("user_id", 99u64), None)?;
    println!("🔧 {out}");

    // === Deferred provider on first use ===
    println!("Report engine bound before use: {}", container.is_bound(&DependencyKey::of::<ReportEngine>()));
    container.resolve::<ReportEngine>()?;
    println!("Report engine bound after use: {}", container.is_bound(&DependencyKey::of::<ReportEngine>()));

    println!("\n🎉 Done");
    Ok(())
}
