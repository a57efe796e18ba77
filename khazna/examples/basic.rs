//! Basic example of the Khazna bean container.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use khazna::prelude::*;

// === Define your traits and types ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

type SharedLogger = Arc<dyn Logger>;

#[derive(Clone)]
struct Config {
    database_url: String,
}

struct Database {
    url: String,
    logger: SharedLogger,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

struct RequestInfo {
    id: u64,
}

// Singleton that follows the current request through a forwarding handle.
struct UserService {
    db: Arc<Database>,
    request: BeanRef<RequestInfo>,
    logger: SharedLogger,
}

impl UserService {
    fn get_user(&self, id: u64) -> Result<String> {
        let request = self.request.get()?;
        self.logger.log(&format!("Request #{}: getting user {id}", request.id));
        Ok(self.db.query(&format!("SELECT * FROM users WHERE id = {id}")))
    }
}

fn main() -> Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter("khazna_container=debug")
        .init();

    let config = ContainerConfig {
        wire_scoped_proxy: true,
        ..ContainerConfig::default()
    };
    let next_request = Arc::new(AtomicU64::new(1));

    let container = ContainerBuilder::with_config(config)?
        .with_forwarding_proxies()
        // Config: a plain value
        .register(BeanDefinition::value(
            "config",
            Config {
                database_url: "postgres://localhost/myapp".to_string(),
            },
        ))?
        // Logger: a trait object, found by type
        .register(BeanDefinition::new("logger", |_| {
            Ok(Arc::new(ConsoleLogger) as SharedLogger)
        }))?
        // Database: wired by name and by type
        .register(
            BeanDefinition::new("database", |deps| {
                let config = deps.get::<Config>("config")?;
                let logger = deps.get::<SharedLogger>("log")?;
                Ok(Database {
                    url: config.database_url.clone(),
                    logger: SharedLogger::clone(&logger),
                })
            })
            .wiring(WiringMode::Autowire)
            .depends_on(DependencySite::new("config"))
            .depends_on(DependencySite::new("log").typed::<SharedLogger>()),
        )?
        // RequestInfo: one per request
        .register(
            BeanDefinition::new("requestInfo", move |_| {
                Ok(RequestInfo {
                    id: next_request.fetch_add(1, Ordering::SeqCst),
                })
            })
            .scope(ScopeKind::Request)
            .on_destroy(|info: &RequestInfo| {
                println!("🧹 Request #{} finished", info.id);
                Ok(())
            }),
        )?
        // UserService: singleton holding a request-scoped bean
        .register(
            BeanDefinition::new("userService", |deps| {
                let logger = deps.get::<SharedLogger>("logger")?;
                Ok(UserService {
                    db: deps.get("database")?,
                    request: deps.scoped("requestInfo")?,
                    logger: SharedLogger::clone(&logger),
                })
            })
            .depends_on(DependencySite::new("database"))
            .depends_on(DependencySite::new("requestInfo"))
            .depends_on(DependencySite::new("logger")),
        )?
        .build()?;

    container.validate()?;
    println!("✅ Container built successfully!");
    println!("{container:?}");

    // === One scope per request ===
    for _ in 0..2 {
        let request = container.create_scope(ScopeKind::Request)?;
        let service: Arc<UserService> = request.get("userService")?;
        println!("👤 {}", service.get_user(42)?);
        println!("👤 {}", service.get_user(7)?);
    }
    // each request context is terminated when its scope drops

    let reports = container.shutdown();
    println!("\n🎉 Shut down, {} context(s) terminated", reports.len());
    Ok(())
}
