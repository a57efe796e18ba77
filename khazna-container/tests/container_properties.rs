//! Cross-module properties of the container: registration, wiring, scopes
//! and their lifecycles, exercised through the public API only.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier, Once, mpsc};
use std::thread;
use std::time::Duration;

use khazna_container::prelude::*;

static INIT_LOGGER: Once = Once::new();

fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("khazna_container=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn counting(calls: &Arc<AtomicU32>, name: &str) -> BeanDefinition {
    let calls = calls.clone();
    BeanDefinition::new(name, move |_| Ok(calls.fetch_add(1, Ordering::SeqCst)))
}

fn config(edit: impl FnOnce(&mut ContainerConfig)) -> ContainerConfig {
    let mut config = ContainerConfig::default();
    edit(&mut config);
    config
}

struct Cache;
struct Consumer {
    cache: Option<Arc<Cache>>,
}

fn consumer(mode: WiringMode) -> BeanDefinition {
    BeanDefinition::new("consumer", |deps| {
        Ok(Consumer {
            cache: deps.get_optional::<Cache>("cache")?,
        })
    })
    .wiring(mode)
    .depends_on(DependencySite::new("cache").typed::<Cache>())
}

// ═══════════════════════════════════════════
// Registration
// ═══════════════════════════════════════════

#[test]
fn lookup_definition_round_trips() {
    init_test_logger();
    let definitions = vec![
        BeanDefinition::value("a", 1u8),
        BeanDefinition::value("b", 2u8).scope(ScopeKind::Prototype),
        BeanDefinition::new("c", |_| Ok(Cache))
            .wiring(WiringMode::Optional)
            .depends_on(DependencySite::new("a")),
    ];

    let mut builder = Container::builder();
    for definition in &definitions {
        builder = builder.register(definition.clone()).unwrap();
    }
    for definition in &definitions {
        assert_eq!(builder.lookup_definition(definition.name()), Some(definition));
    }

    let container = builder.build().unwrap();
    for definition in &definitions {
        assert_eq!(container.lookup_definition(definition.name()), Some(definition));
    }
    assert_eq!(container.bean_names(), vec!["a", "b", "c"]);
}

#[test]
fn duplicate_names_follow_detection_setting() {
    init_test_logger();
    let err = Container::builder()
        .register(BeanDefinition::value("port", 1u16))
        .unwrap()
        .register(BeanDefinition::value("port", 2u16))
        .unwrap_err();
    assert!(matches!(err, KhaznaError::DuplicateBeanName(_)));

    let container = ContainerBuilder::with_config(config(|c| c.detect_duplicate_names = false))
        .unwrap()
        .register(BeanDefinition::value("port", 1u16))
        .unwrap()
        .register(BeanDefinition::value("port", 2u16))
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(*container.get::<u16>("port").unwrap(), 2);
}

#[test]
fn failed_registration_leaves_registry_usable() {
    init_test_logger();
    let mut builder = Container::builder()
        .register(BeanDefinition::value("a", 1u8))
        .unwrap();

    let err = builder
        .reregister(BeanDefinition::value("b", 1u8).scope(ScopeKind::Default))
        .unwrap_err();
    assert!(matches!(err, KhaznaError::InvalidScope(_)));
    assert!(builder.lookup_definition("b").is_none());

    let previous = builder.reregister(BeanDefinition::value("a", 9u8)).unwrap();
    assert!(previous.is_some());
    assert!(builder.remove("a").is_some());
    assert!(builder.build().unwrap().bean_names().is_empty());
}

#[test]
fn invalid_configuration_rejected() {
    assert!(matches!(
        ContainerBuilder::with_config(config(|c| c.default_scope = ScopeKind::Default)),
        Err(KhaznaError::InvalidScope(_))
    ));
    assert!(matches!(
        ContainerBuilder::with_config(config(|c| c.default_wiring_mode = WiringMode::None)),
        Err(KhaznaError::InvalidWiringMode { .. })
    ));
}

// ═══════════════════════════════════════════
// Wiring
// ═══════════════════════════════════════════

#[test]
fn strict_missing_dependency_fails_optional_skips() {
    init_test_logger();
    let strict = Container::builder()
        .register(consumer(WiringMode::Strict))
        .unwrap()
        .build()
        .unwrap();
    assert!(matches!(
        strict.get_bean("consumer"),
        Err(KhaznaError::MissingDependency(_))
    ));

    let optional = Container::builder()
        .register(consumer(WiringMode::Optional))
        .unwrap()
        .build()
        .unwrap();
    assert!(optional.get::<Consumer>("consumer").unwrap().cache.is_none());
}

#[test]
fn container_default_wiring_mode_applies() {
    let container = ContainerBuilder::with_config(config(|c| {
        c.default_wiring_mode = WiringMode::Optional;
    }))
    .unwrap()
    .register(consumer(WiringMode::Default))
    .unwrap()
    .build()
    .unwrap();
    assert!(container.get::<Consumer>("consumer").unwrap().cache.is_none());
}

#[test]
fn autowire_by_type() {
    init_test_logger();
    let one = Container::builder()
        .register(BeanDefinition::new("primaryCache", |_| Ok(Cache)))
        .unwrap()
        .register(consumer(WiringMode::Autowire))
        .unwrap()
        .build()
        .unwrap();
    let wired = one.get::<Consumer>("consumer").unwrap();
    let cache = one.get::<Cache>("primaryCache").unwrap();
    assert!(Arc::ptr_eq(wired.cache.as_ref().unwrap(), &cache));

    let two = Container::builder()
        .register(BeanDefinition::new("l1", |_| Ok(Cache)))
        .unwrap()
        .register(BeanDefinition::new("l2", |_| Ok(Cache)))
        .unwrap()
        .register(consumer(WiringMode::Autowire))
        .unwrap()
        .build()
        .unwrap();
    match two.get_bean("consumer").unwrap_err() {
        KhaznaError::AmbiguousDependency(err) => assert_eq!(err.candidates, vec!["l1", "l2"]),
        other => panic!("Expected AmbiguousDependency, got: {other:?}"),
    }

    let none_optional = Container::builder()
        .register(consumer(WiringMode::Autowire))
        .unwrap()
        .build()
        .unwrap();
    assert!(none_optional.get::<Consumer>("consumer").unwrap().cache.is_none());

    let none_strict = ContainerBuilder::with_config(config(|c| {
        c.autowire_fallback = WiringMode::Strict;
    }))
    .unwrap()
    .register(consumer(WiringMode::Autowire))
    .unwrap()
    .build()
    .unwrap();
    assert!(matches!(
        none_strict.get_bean("consumer"),
        Err(KhaznaError::MissingDependency(_))
    ));
}

#[test]
fn cyclic_definitions_fail_fast() {
    init_test_logger();
    let calls = Arc::new(AtomicU32::new(0));
    let container = Container::builder()
        .register(counting(&calls, "a").depends_on(DependencySite::new("b")))
        .unwrap()
        .register(counting(&calls, "b").depends_on(DependencySite::new("a")))
        .unwrap()
        .build()
        .unwrap();

    match container.get_bean("a").unwrap_err() {
        KhaznaError::CyclicDependency(err) => assert_eq!(err.chain, vec!["a", "b", "a"]),
        other => panic!("Expected CyclicDependency, got: {other:?}"),
    }
    assert!(container.validate().is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn reference_order_is_configurable() {
    let build = |config: ContainerConfig| {
        ContainerBuilder::with_config(config)
            .unwrap()
            .register(BeanDefinition::value("cache", String::from("by type")))
            .unwrap()
            .register(BeanDefinition::value("store", String::from("by name")))
            .unwrap()
            .register(
                BeanDefinition::new("consumer", |deps| {
                    Ok(deps.get::<String>("store")?.to_string())
                })
                .depends_on(DependencySite::new("store").with_type(TypeDescriptor::named("app::Cache"))),
            )
            .unwrap()
            .build()
            .unwrap()
    };

    let by_name = build(ContainerConfig::default());
    assert_eq!(*by_name.get::<String>("consumer").unwrap(), "by name");

    let by_type = build(config(|c| {
        c.lookup_references = vec![ReferenceKind::TypeShortName, ReferenceKind::Name];
    }));
    assert_eq!(*by_type.get::<String>("consumer").unwrap(), "by type");
}

// ═══════════════════════════════════════════
// Scopes
// ═══════════════════════════════════════════

#[test]
fn concurrent_singleton_constructed_once() {
    init_test_logger();
    const THREADS: usize = 16;
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let container = Container::builder()
        .register(BeanDefinition::new("slow", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(Cache)
        }))
        .unwrap()
        .build()
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.get::<Cache>("slow").unwrap()
            })
        })
        .collect();

    let instances: Vec<Arc<Cache>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
}

#[test]
fn prototype_yields_distinct_instances() {
    let container = Container::builder()
        .register(BeanDefinition::new("p", |_| Ok(Cache)).scope(ScopeKind::Prototype))
        .unwrap()
        .build()
        .unwrap();

    let instances: Vec<Arc<Cache>> = (0..8).map(|_| container.get("p").unwrap()).collect();
    for (i, a) in instances.iter().enumerate() {
        for b in &instances[i + 1..] {
            assert!(!Arc::ptr_eq(a, b));
        }
    }
}

#[test]
fn terminated_context_yields_fresh_instance() {
    init_test_logger();
    let calls = Arc::new(AtomicU32::new(0));
    let container = Container::builder()
        .register(counting(&calls, "n").scope(ScopeKind::Session))
        .unwrap()
        .build()
        .unwrap();

    let first = container.create_scope(ScopeKind::Session).unwrap();
    let key = first.key();
    let a = container.get::<u32>("n").unwrap();

    let report = container.terminate(&ScopeKind::Session, key).unwrap();
    assert_eq!(report.evicted, 1);
    drop(first);

    let second = container.create_scope(ScopeKind::Session).unwrap();
    let b = second.get::<u32>("n").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn session_spans_request_threads() {
    init_test_logger();
    let calls = Arc::new(AtomicU32::new(0));
    let container = Container::builder()
        .register(counting(&calls, "cart").scope(ScopeKind::Session))
        .unwrap()
        .register(counting(&calls, "page").scope(ScopeKind::Request))
        .unwrap()
        .build()
        .unwrap();

    let session = container.create_scope(ScopeKind::Session).unwrap();
    let cart = session.get::<u32>("cart").unwrap();
    let key = session.key();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let container = container.clone();
            thread::spawn(move || {
                let _session = container.enter(ScopeKind::Session, key).unwrap();
                let request = container.create_scope(ScopeKind::Request).unwrap();
                let page = request.get::<u32>("page").unwrap();
                (container.get::<u32>("cart").unwrap(), page)
            })
        })
        .collect();

    let mut pages = Vec::new();
    for handle in handles {
        let (thread_cart, page) = handle.join().unwrap();
        assert!(Arc::ptr_eq(&cart, &thread_cart));
        pages.push(*page);
    }
    pages.sort_unstable();
    pages.dedup();
    assert_eq!(pages.len(), 4);
}

#[test]
fn different_contexts_do_not_share_instances() {
    let calls = Arc::new(AtomicU32::new(0));
    let container = Container::builder()
        .register(counting(&calls, "n").scope(ScopeKind::Request))
        .unwrap()
        .build()
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let container = container.clone();
            thread::spawn(move || {
                let request = container.create_scope(ScopeKind::Request).unwrap();
                *request.get::<u32>("n").unwrap()
            })
        })
        .collect();
    let mut seen: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

// ═══════════════════════════════════════════
// Mixed scopes
// ═══════════════════════════════════════════

struct Holder {
    ticket: BeanRef<u32>,
}

fn mixed_scope_beans(
    builder: ContainerBuilder,
    calls: &Arc<AtomicU32>,
) -> Result<ContainerBuilder> {
    builder
        .register(counting(calls, "ticket").scope(ScopeKind::Prototype))?
        .register(
            BeanDefinition::new("holder", |deps| {
                Ok(Holder {
                    ticket: deps.scoped("ticket")?,
                })
            })
            .depends_on(DependencySite::new("ticket")),
        )
}

#[test]
fn mixed_scope_detected_without_bridging() {
    init_test_logger();
    let calls = Arc::new(AtomicU32::new(0));
    let builder = ContainerBuilder::with_config(config(|c| c.detect_mixed_scopes = true)).unwrap();
    let container = mixed_scope_beans(builder, &calls).unwrap().build().unwrap();

    match container.get_bean("holder").unwrap_err() {
        KhaznaError::MixedScopeViolation(err) => {
            assert_eq!(err.consumer_scope, ScopeKind::Singleton);
            assert_eq!(err.dependency_scope, ScopeKind::Prototype);
        }
        other => panic!("Expected MixedScopeViolation, got: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn bridged_prototype_is_fresh_on_every_access() {
    init_test_logger();
    let calls = Arc::new(AtomicU32::new(0));
    let builder = ContainerBuilder::with_config(config(|c| {
        c.wire_scoped_proxy = true;
        c.detect_mixed_scopes = true;
    }))
    .unwrap()
    .with_forwarding_proxies();
    let container = mixed_scope_beans(builder, &calls).unwrap().build().unwrap();

    let holder = container.get::<Holder>("holder").unwrap();
    assert!(holder.ticket.handle().is_forwarding());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(*holder.ticket.get().unwrap(), 0);
    assert_eq!(*holder.ticket.get().unwrap(), 1);
    assert_eq!(*holder.ticket.get().unwrap(), 2);
}

#[test]
fn bridging_without_capability_degrades() {
    init_test_logger();
    let calls = Arc::new(AtomicU32::new(0));
    let builder = ContainerBuilder::with_config(config(|c| c.wire_scoped_proxy = true)).unwrap();
    let container = mixed_scope_beans(builder, &calls).unwrap().build().unwrap();

    // Wired directly: the prototype seen at wiring time is pinned.
    let holder = container.get::<Holder>("holder").unwrap();
    assert!(!holder.ticket.handle().is_forwarding());
    assert_eq!(*holder.ticket.get().unwrap(), 0);
    assert_eq!(*holder.ticket.get().unwrap(), 0);

    let strict = ContainerBuilder::with_config(config(|c| {
        c.wire_scoped_proxy = true;
        c.detect_mixed_scopes = true;
    }))
    .unwrap();
    let strict = mixed_scope_beans(strict, &calls).unwrap().build().unwrap();
    assert!(matches!(
        strict.get_bean("holder"),
        Err(KhaznaError::MixedScopeViolation(_))
    ));
}

#[test]
fn bridged_request_bean_follows_active_request() {
    init_test_logger();
    let calls = Arc::new(AtomicU32::new(0));
    let container = ContainerBuilder::with_config(config(|c| c.wire_scoped_proxy = true))
        .unwrap()
        .with_forwarding_proxies()
        .register(counting(&calls, "ticket").scope(ScopeKind::Request))
        .unwrap()
        .register(
            BeanDefinition::new("holder", |deps| {
                Ok(Holder {
                    ticket: deps.scoped("ticket")?,
                })
            })
            .depends_on(DependencySite::new("ticket")),
        )
        .unwrap()
        .build()
        .unwrap();

    // No request is needed to build the singleton.
    let holder = container.get::<Holder>("holder").unwrap();
    assert!(matches!(
        holder.ticket.get(),
        Err(KhaznaError::ScopeNotActive { .. })
    ));

    let first = container.create_scope(ScopeKind::Request).unwrap();
    let a = holder.ticket.get().unwrap();
    assert!(Arc::ptr_eq(&a, &holder.ticket.get().unwrap()));
    drop(first);

    let _second = container.create_scope(ScopeKind::Request).unwrap();
    let b = holder.ticket.get().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn cycle_through_forwarding_handle_fails_fast() {
    init_test_logger();
    let container = ContainerBuilder::with_config(config(|c| c.wire_scoped_proxy = true))
        .unwrap()
        .with_forwarding_proxies()
        .register(
            BeanDefinition::new("svc", |deps| Ok(*deps.get::<u32>("req")?))
                .depends_on(DependencySite::new("req")),
        )
        .unwrap()
        .register(
            BeanDefinition::new("req", |deps| Ok(*deps.get::<u32>("svc")? + 1))
                .scope(ScopeKind::Request)
                .depends_on(DependencySite::new("svc")),
        )
        .unwrap()
        .build()
        .unwrap();
    // The direct edges alone are acyclic.
    container.validate().unwrap();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let request = container.create_scope(ScopeKind::Request).unwrap();
        let first = request.get_bean("svc").map(|_| ());
        let second = request.get_bean("svc").map(|_| ());
        tx.send((first, second)).unwrap();
    });

    let (first, second) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("lookup of a cyclic bean must not block");
    match first.unwrap_err() {
        KhaznaError::CyclicDependency(err) => assert_eq!(err.chain, vec!["svc", "req", "svc"]),
        other => panic!("Expected CyclicDependency, got: {other:?}"),
    }
    assert!(matches!(second, Err(KhaznaError::CyclicDependency(_))));
}

#[test]
fn terminate_during_construction_destroys_instance() {
    init_test_logger();
    let started = Arc::new(Barrier::new(2));
    let finish = Arc::new(Barrier::new(2));
    let destroyed = Arc::new(AtomicU32::new(0));

    let (s, f, counter) = (started.clone(), finish.clone(), destroyed.clone());
    let container = Container::builder()
        .register(
            BeanDefinition::new("slow", move |_| {
                s.wait();
                f.wait();
                Ok(1u8)
            })
            .scope(ScopeKind::Request)
            .on_destroy(move |_: &u8| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap()
        .build()
        .unwrap();

    let request = container.create_scope(ScopeKind::Request).unwrap();
    let key = request.key();
    let worker = {
        let container = container.clone();
        thread::spawn(move || {
            let _request = container.enter(ScopeKind::Request, key).unwrap();
            container.get_bean("slow").map(|_| ())
        })
    };

    started.wait();
    let report = container.terminate(&ScopeKind::Request, key).unwrap();
    assert_eq!(report.evicted, 0);
    finish.wait();

    assert!(matches!(
        worker.join().unwrap(),
        Err(KhaznaError::ContextClosed { .. })
    ));
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);

    // The terminated context is not brought back by a guard still holding it.
    assert!(matches!(
        request.get_bean("slow"),
        Err(KhaznaError::ContextClosed { .. })
    ));
    assert_eq!(request.end().evicted, 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn thread_scoped_instances_destroyed_on_thread_exit() {
    init_test_logger();
    const THREADS: u32 = 8;
    let destroyed = Arc::new(AtomicU32::new(0));
    let counter = destroyed.clone();
    let container = Container::builder()
        .register(
            BeanDefinition::value("worker", 1u8)
                .scope(ScopeKind::Thread)
                .on_destroy(move |_: &u8| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .unwrap()
        .build()
        .unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let container = container.clone();
            thread::spawn(move || {
                container.get_bean("worker").unwrap();
                if i == 0 {
                    // Ended early: must not be destroyed twice.
                    assert_eq!(container.end_thread().map(|r| r.evicted), Some(1));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(destroyed.load(Ordering::SeqCst), THREADS);
    assert!(container.shutdown().iter().all(|r| r.evicted == 0));
}

// ═══════════════════════════════════════════
// Sources and lifecycle
// ═══════════════════════════════════════════

struct TenantSource;

impl BeanSource for TenantSource {
    fn register(&self, sink: &mut dyn DefinitionSink) -> Result<()> {
        sink.add_scope("tenant")?;
        let name = sink.bean_name_for(&TypeDescriptor::of::<Cache>());
        sink.add_definition(BeanDefinition::new(name, |_| Ok(Cache)).parse_scope("tenant")?)
    }
}

#[test]
fn source_registers_custom_scope_beans() {
    init_test_logger();
    let container = Container::builder()
        .add_source(&TenantSource)
        .unwrap()
        .build()
        .unwrap();

    assert!(container.contains("cache"));
    assert!(matches!(
        container.get_by_type::<Cache>(),
        Err(KhaznaError::ScopeNotActive { .. })
    ));
    let tenant = container.create_scope(ScopeKind::custom("tenant")).unwrap();
    let a = tenant.get::<Cache>("cache").unwrap();
    assert!(Arc::ptr_eq(&a, &container.get_by_type::<Cache>().unwrap()));
}

#[test]
fn teardown_failures_are_collected() {
    init_test_logger();
    let destroyed = Arc::new(AtomicU32::new(0));
    let counter = destroyed.clone();
    let container = Container::builder()
        .register(
            BeanDefinition::value("first", 1u8)
                .scope(ScopeKind::Request)
                .on_destroy(move |_: &u8| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .unwrap()
        .register(
            BeanDefinition::value("second", 2u8)
                .scope(ScopeKind::Request)
                .on_destroy(|_: &u8| Err("socket already closed".into())),
        )
        .unwrap()
        .build()
        .unwrap();

    let request = container.create_scope(ScopeKind::Request).unwrap();
    request.get_bean("first").unwrap();
    request.get_bean("second").unwrap();

    let report = request.end();
    assert_eq!(report.evicted, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].bean, "second");
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}
