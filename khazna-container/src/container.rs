//! # The Container
//!
//! Binds bean names to managed instances, wires their dependencies and
//! keeps every instance in the store of its scope.
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──> Container ──create_scope()──> ScopedContext
//!   (BeanRegistry)                 │
//!                       get_bean: plan ─> ScopeStore::get_or_create
//! ```
//!
//! # Examples
//! ```
//! use khazna_container::prelude::*;
//! use std::sync::Arc;
//!
//! struct Database { url: String }
//! struct UserRepo { db: Arc<Database> }
//!
//! let container = Container::builder()
//!     .register(BeanDefinition::new("database", |_| {
//!         Ok(Database { url: "postgres://localhost".into() })
//!     }))?
//!     .register(
//!         BeanDefinition::new("userRepo", |deps| {
//!             Ok(UserRepo { db: deps.get::<Database>("database")? })
//!         })
//!         .scope(ScopeKind::Request)
//!         .depends_on(DependencySite::new("database")),
//!     )?
//!     .build()?;
//!
//! let request = container.create_scope(ScopeKind::Request)?;
//! let repo: Arc<UserRepo> = request.get("userRepo")?;
//! assert_eq!(repo.db.url, "postgres://localhost");
//! # Ok::<(), khazna_container::error::KhaznaError>(())
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, info, instrument, trace, warn};

use crate::bridge::{BeanHandle, BeanRef, Bridging, ForwardingProxies, Lookup, ProxyFactory, ScopeBridge};
use crate::config::ContainerConfig;
use crate::context::{self, ContextGuard, ContextKey, Release};
use crate::definition::{BeanDefinition, Dependencies, Instance, downcast};
use crate::descriptor::TypeDescriptor;
use crate::error::{CyclicDependencyError, InvalidScopeError, KhaznaError, NotRegisteredError, Result};
use crate::graph::{Planner, WiringPlan};
use crate::reference::ReferenceResolver;
use crate::registry::{BeanRegistry, RegisteredBean};
use crate::scope::ScopeKind;
use crate::source::{BeanSource, DefinitionSink};
use crate::store::{ScopeStore, TerminationReport};

static NEXT_CONTAINER: AtomicU64 = AtomicU64::new(1);

const BUILT_IN_SCOPES: [ScopeKind; 5] = [
    ScopeKind::Singleton,
    ScopeKind::Session,
    ScopeKind::Request,
    ScopeKind::Thread,
    ScopeKind::Prototype,
];

// ============================================================
// ContainerBuilder
// ============================================================

/// Collects bean definitions, then builds an immutable [`Container`].
///
/// # Examples
/// ```
/// use khazna_container::prelude::*;
///
/// let mut config = ContainerConfig::default();
/// config.detect_duplicate_names = false;
///
/// let container = ContainerBuilder::with_config(config)?
///     .register(BeanDefinition::value("port", 8080u16))?
///     .register(BeanDefinition::value("port", 9090u16))?
///     .build()?;
///
/// assert_eq!(*container.get::<u16>("port")?, 9090);
/// # Ok::<(), KhaznaError>(())
/// ```
pub struct ContainerBuilder {
    config: ContainerConfig,
    registry: BeanRegistry,
    proxies: Option<Arc<dyn ProxyFactory>>,
}

impl ContainerBuilder {
    /// A builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
            registry: BeanRegistry::default(),
            proxies: None,
        }
    }

    /// A builder following `config`.
    ///
    /// # Errors
    /// Whatever [`ContainerConfig::validate`] reports.
    pub fn with_config(config: ContainerConfig) -> Result<Self> {
        let registry = BeanRegistry::new(&config)?;
        Ok(Self {
            config,
            registry,
            proxies: None,
        })
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Installs the capability used to produce forwarding handles.
    ///
    /// Without one, mixed scopes are never bridged and
    /// [`Container::scoped_proxy`] fails.
    pub fn with_proxy_factory(mut self, proxies: Arc<dyn ProxyFactory>) -> Self {
        self.proxies = Some(proxies);
        self
    }

    /// Installs [`ForwardingProxies`].
    pub fn with_forwarding_proxies(self) -> Self {
        self.with_proxy_factory(Arc::new(ForwardingProxies))
    }

    /// Registers a custom contextual scope.
    ///
    /// # Errors
    /// [`KhaznaError::InvalidScope`] if `name` is not a valid identifier or
    /// names a built-in scope.
    pub fn register_scope(mut self, name: &str) -> Result<Self> {
        self.registry.register_scope(name.parse()?)?;
        Ok(self)
    }

    /// Registers a bean definition.
    ///
    /// # Errors
    /// See [`BeanRegistry::register`].
    pub fn register(mut self, definition: BeanDefinition) -> Result<Self> {
        self.registry.register(definition)?;
        Ok(self)
    }

    /// Replaces a definition regardless of duplicate detection.
    pub fn reregister(&mut self, definition: BeanDefinition) -> Result<Option<BeanDefinition>> {
        self.registry.reregister(definition)
    }

    pub fn remove(&mut self, name: &str) -> Option<BeanDefinition> {
        self.registry.remove(name)
    }

    pub fn lookup_definition(&self, name: &str) -> Option<&BeanDefinition> {
        self.registry.lookup_definition(name)
    }

    /// Lets `source` register its definitions.
    pub fn add_source(mut self, source: &dyn BeanSource) -> Result<Self> {
        debug!(source = source.name(), "Adding bean source");
        source.register(&mut self)?;
        Ok(self)
    }

    /// The bean name derived from `T`: its uncapitalized short name, or its
    /// full path when `use_full_type_names` is on.
    pub fn bean_name_for<T: ?Sized + 'static>(&self) -> String {
        TypeDescriptor::of::<T>().bean_name(self.config.use_full_type_names)
    }

    /// Closes the configuration phase.
    #[instrument(skip(self), name = "container_build")]
    pub fn build(self) -> Result<Container> {
        info!(beans = self.registry.len(), "Building container");

        let stores: HashMap<ScopeKind, ScopeStore> = BUILT_IN_SCOPES
            .iter()
            .chain(self.registry.custom_scopes())
            .map(|scope| (scope.clone(), ScopeStore::new(scope.clone())))
            .collect();

        let inner = Inner {
            id: NEXT_CONTAINER.fetch_add(1, Ordering::Relaxed),
            references: self.config.reference_resolver(),
            bridge: ScopeBridge::new(self.config.mixed_scope_policy(), self.proxies),
            config: self.config,
            registry: self.registry,
            plans: DashMap::new(),
            stores,
        };

        info!(container = inner.id, "Container built");
        Ok(Container {
            inner: Arc::new(inner),
        })
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionSink for ContainerBuilder {
    fn add_definition(&mut self, definition: BeanDefinition) -> Result<()> {
        self.registry.register(definition)
    }

    fn add_scope(&mut self, scope: &str) -> Result<()> {
        self.registry.register_scope(scope.parse()?)
    }

    fn bean_name_for(&self, ty: &TypeDescriptor) -> String {
        ty.bean_name(self.config.use_full_type_names)
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("beans", &self.registry.len())
            .field("proxies", &self.proxies.is_some())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

struct Inner {
    id: u64,
    config: ContainerConfig,
    registry: BeanRegistry,
    references: ReferenceResolver,
    bridge: ScopeBridge,
    plans: DashMap<String, Arc<WiringPlan>>,
    stores: HashMap<ScopeKind, ScopeStore>,
}

impl Inner {
    fn plan(&self, name: &str) -> Result<Arc<WiringPlan>> {
        Planner::new(&self.registry, &self.references, &self.bridge, &self.plans).plan(name)
    }

    /// The instance of `name` for the currently active contexts.
    ///
    /// Plans catch cycles of direct edges up front. A cycle that closes
    /// through a forwarding handle is only seen here, when the lookup
    /// comes back to a bean this thread is still constructing.
    fn lookup(self: &Arc<Self>, name: &str) -> Result<Instance> {
        let plan = self.plan(name)?;
        let bean = self.registered(name)?;
        let context = self.context_for(name, &plan.scope)?;
        let store = self.store(&plan.scope)?;

        let _in_progress = context::begin_lookup(self.id, name, context).map_err(|chain| {
            warn!(cycle = ?chain, "Cyclic dependency reached during construction");
            KhaznaError::CyclicDependency(CyclicDependencyError { chain })
        })?;
        store.get_or_create(name, context, bean.definition().destroy_hook(), || {
            self.construct(bean, &plan)
        })
    }

    fn construct(self: &Arc<Self>, bean: &RegisteredBean, plan: &WiringPlan) -> Result<Instance> {
        let definition = bean.definition();
        let mut deps = Dependencies::new(definition.name());

        for edge in &plan.edges {
            let handle = match edge.bridging {
                Bridging::Direct => BeanHandle::direct(&edge.target, self.lookup(&edge.target)?),
                Bridging::Forward => self.bridge.wrap(&edge.target, self.forwarding(&edge.target))?,
            };
            deps.insert(&edge.site, handle);
        }

        let instance = (definition.factory())(&deps).map_err(|source| {
            // A cycle surfaces as itself, not as the failure of every bean on it.
            match source.downcast::<KhaznaError>() {
                Ok(error) if matches!(*error, KhaznaError::CyclicDependency(_)) => *error,
                Ok(error) => KhaznaError::ConstructionFailed {
                    bean: definition.name().to_string(),
                    source: error,
                },
                Err(source) => KhaznaError::ConstructionFailed {
                    bean: definition.name().to_string(),
                    source,
                },
            }
        })?;
        if let Some(init) = definition.init_hook() {
            init(&instance).map_err(|source| KhaznaError::ConstructionFailed {
                bean: definition.name().to_string(),
                source,
            })?;
        }

        debug!(bean = definition.name(), scope = %bean.scope(), "Bean constructed");
        Ok(instance)
    }

    /// A lookup that does not keep the container alive.
    fn forwarding(self: &Arc<Self>, name: &str) -> Lookup {
        let container = Arc::downgrade(self);
        let bean = name.to_string();
        Arc::new(move || forward(&container, &bean))
    }

    fn context_for(self: &Arc<Self>, bean: &str, scope: &ScopeKind) -> Result<ContextKey> {
        match scope {
            ScopeKind::Thread => Ok(context::thread_context(self.id, || self.thread_release())),
            scope if scope.is_contextual() => {
                context::current(self.id, scope).ok_or_else(|| KhaznaError::ScopeNotActive {
                    bean: bean.to_string(),
                    scope: scope.clone(),
                })
            }
            _ => Ok(ContextKey::ROOT),
        }
    }

    /// Terminates a thread's context when the thread exits.
    fn thread_release(self: &Arc<Self>) -> Release {
        let container = Arc::downgrade(self);
        Box::new(move |key: ContextKey| {
            let Some(inner) = container.upgrade() else {
                return;
            };
            // Runs in a thread-local destructor, where a panic would abort.
            let _ = catch_unwind(AssertUnwindSafe(|| {
                if let Some(store) = inner.stores.get(&ScopeKind::Thread) {
                    let report = store.terminate(key);
                    trace!(context = %key, evicted = report.evicted, "Thread exited");
                }
            }));
        })
    }

    fn registered(&self, name: &str) -> Result<&RegisteredBean> {
        self.registry.get(name).ok_or_else(|| {
            KhaznaError::NotRegistered(NotRegisteredError {
                name: name.to_string(),
                suggestions: Vec::new(),
            })
        })
    }

    fn store(&self, scope: &ScopeKind) -> Result<&ScopeStore> {
        self.stores.get(scope).ok_or_else(|| unknown_scope(scope))
    }

    /// The store of a contextual scope.
    fn contextual_store(&self, scope: &ScopeKind) -> Result<&ScopeStore> {
        if !scope.is_contextual() {
            return Err(KhaznaError::InvalidScope(InvalidScopeError {
                scope: scope.to_string(),
                bean: None,
                reason: "only session, request and custom scopes have explicit contexts",
            }));
        }
        self.store(scope)
    }
}

fn forward(container: &Weak<Inner>, bean: &str) -> Result<Instance> {
    let inner = container
        .upgrade()
        .ok_or_else(|| KhaznaError::ContainerDropped {
            bean: bean.to_string(),
        })?;
    inner.lookup(bean)
}

fn unknown_scope(scope: &ScopeKind) -> KhaznaError {
    KhaznaError::InvalidScope(InvalidScopeError {
        scope: scope.to_string(),
        bean: None,
        reason: "the scope is not registered with the builder",
    })
}

/// Immutable, thread-safe bean container.
///
/// Created by [`ContainerBuilder::build`]. Cloning is cheap and every
/// clone shares the same beans and instances.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// Returns the instance of `name` for the active contexts, creating it
    /// on first access.
    ///
    /// Idempotent per context; Prototype beans yield a fresh instance on
    /// every call.
    ///
    /// # Errors
    /// - [`KhaznaError::NotRegistered`] with similar names as suggestions
    /// - [`KhaznaError::ScopeNotActive`] for a contextual bean outside any
    ///   active context of its scope
    /// - any wiring error: missing, ambiguous or cyclic dependencies, mixed scopes
    /// - [`KhaznaError::ConstructionFailed`] if a factory or init hook fails
    ///
    /// Nothing is cached when the lookup fails.
    #[instrument(skip(self), level = "debug")]
    pub fn get_bean(&self, name: &str) -> Result<Instance> {
        self.inner.lookup(name)
    }

    /// Typed [`Container::get_bean`].
    ///
    /// # Errors
    /// Also [`KhaznaError::TypeMismatch`] if the bean is not a `T`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        downcast(name, self.get_bean(name)?)
    }

    /// Looks `T` up under the bean name derived from its type.
    pub fn get_by_type<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.get(&self.bean_name_for::<T>())
    }

    /// A handle that resolves `name` against the active contexts on every
    /// access, to keep inside long-lived values.
    ///
    /// # Errors
    /// [`KhaznaError::ProxyCapabilityUnavailable`] if the builder got no
    /// proxy capability, [`KhaznaError::NotRegistered`] for unknown beans.
    pub fn scoped_proxy<T: Any + Send + Sync>(&self, name: &str) -> Result<BeanRef<T>> {
        self.inner.registered(name)?;
        let handle = self.inner.bridge.wrap(name, self.inner.forwarding(name))?;
        Ok(BeanRef::new(handle))
    }

    /// Plans every bean, reporting the first wiring error.
    ///
    /// Lookups plan lazily; call this after building to fail fast instead.
    /// Contexts are not needed, and no instance is created.
    #[instrument(skip(self), name = "container_validate")]
    pub fn validate(&self) -> Result<()> {
        for name in self.inner.registry.names() {
            self.inner.plan(name)?;
        }
        debug!(beans = self.inner.registry.len(), "Wiring validated");
        Ok(())
    }

    pub fn lookup_definition(&self, name: &str) -> Option<&BeanDefinition> {
        self.inner.registry.lookup_definition(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    /// Every bean name, in registration order.
    pub fn bean_names(&self) -> Vec<&str> {
        self.inner.registry.names()
    }

    /// See [`ContainerBuilder::bean_name_for`].
    pub fn bean_name_for<T: ?Sized + 'static>(&self) -> String {
        TypeDescriptor::of::<T>().bean_name(self.inner.config.use_full_type_names)
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// Opens a new context of a contextual scope and activates it on this
    /// thread. The context is terminated when the returned value drops.
    ///
    /// # Errors
    /// [`KhaznaError::InvalidScope`] for singleton, prototype and thread
    /// scopes, and for unregistered custom scopes.
    pub fn create_scope(&self, kind: ScopeKind) -> Result<ScopedContext<'_>> {
        let key = ContextKey::fresh();
        self.inner.contextual_store(&kind)?.open(key);
        debug!(scope = %kind, context = %key, "Opening context");
        Ok(ScopedContext {
            container: self,
            guard: Some(ContextGuard::activate(self.inner.id, kind, key)),
        })
    }

    /// Activates an existing context on this thread, e.g. a session on the
    /// thread serving one of its requests.
    ///
    /// Lookups under the guard fail with [`KhaznaError::ContextClosed`]
    /// once the context has been terminated.
    pub fn enter(&self, kind: ScopeKind, key: ContextKey) -> Result<ContextGuard> {
        self.inner.contextual_store(&kind)?;
        trace!(scope = %kind, context = %key, "Entering context");
        Ok(ContextGuard::activate(self.inner.id, kind, key))
    }

    /// Evicts every instance of a context and runs their destroy hooks.
    pub fn terminate(&self, kind: &ScopeKind, key: ContextKey) -> Result<TerminationReport> {
        Ok(self.inner.contextual_store(kind)?.terminate(key))
    }

    /// Destroys this thread's Thread-scoped instances now instead of when
    /// the thread exits.
    ///
    /// Returns `None` if the thread never looked one up.
    pub fn end_thread(&self) -> Option<TerminationReport> {
        let key = context::take_thread_context(self.inner.id)?;
        let store = self.inner.stores.get(&ScopeKind::Thread)?;
        Some(store.terminate(key))
    }

    /// Destroys every live instance, singletons last.
    ///
    /// The container stays usable: singleton and thread lookups create
    /// fresh instances, while open session, request and custom contexts
    /// are closed.
    #[instrument(skip(self), name = "container_shutdown")]
    pub fn shutdown(&self) -> Vec<TerminationReport> {
        let mut order: Vec<&ScopeStore> = self
            .inner
            .stores
            .values()
            .filter(|store| store.scope() != &ScopeKind::Singleton)
            .collect();
        order.sort_by_key(|store| store.scope().to_string());
        order.extend(self.inner.stores.get(&ScopeKind::Singleton));

        let reports: Vec<TerminationReport> =
            order.into_iter().flat_map(ScopeStore::terminate_all).collect();
        let evicted: usize = reports.iter().map(|r| r.evicted).sum();
        let failures: usize = reports.iter().map(|r| r.failures.len()).sum();
        info!(evicted, failures, "Container shut down");
        reports
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("beans", &self.inner.registry.len())
            .field("bridge", &self.inner.bridge)
            .finish()
    }
}

// ═══════════════════════════════════════════
// ScopedContext
// ═══════════════════════════════════════════

/// An open context of a contextual scope, active on the creating thread.
///
/// Dropping it (or calling [`ScopedContext::end`]) deactivates the context
/// and terminates it.
pub struct ScopedContext<'c> {
    container: &'c Container,
    guard: Option<ContextGuard>,
}

impl ScopedContext<'_> {
    pub fn key(&self) -> ContextKey {
        self.guard.as_ref().map_or(ContextKey::ROOT, ContextGuard::key)
    }

    pub fn kind(&self) -> &ScopeKind {
        self.guard
            .as_ref()
            .map_or(&ScopeKind::Default, ContextGuard::scope)
    }

    /// Looks `name` up with this context current, even if another context
    /// of the same kind was opened after it.
    pub fn get_bean(&self, name: &str) -> Result<Instance> {
        let _current = ContextGuard::activate(self.container.inner.id, self.kind().clone(), self.key());
        self.container.get_bean(name)
    }

    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        downcast(name, self.get_bean(name)?)
    }

    /// Terminates the context now and returns the report.
    pub fn end(mut self) -> TerminationReport {
        self.close()
            .unwrap_or_else(|| TerminationReport::empty(ScopeKind::Default, ContextKey::ROOT))
    }

    fn close(&mut self) -> Option<TerminationReport> {
        let guard = self.guard.take()?;
        let report = self
            .container
            .inner
            .stores
            .get(guard.scope())
            .map(|store| store.terminate(guard.key()));
        debug!(scope = %guard.scope(), context = %guard.key(), "Context closed");
        report
    }
}

impl Drop for ScopedContext<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ScopedContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedContext")
            .field("kind", self.kind())
            .field("key", &self.key())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder, ScopedContext};
    pub use crate::bridge::{BeanHandle, BeanRef, ForwardingProxies, ProxyFactory};
    pub use crate::config::ContainerConfig;
    pub use crate::context::{ContextGuard, ContextKey};
    pub use crate::definition::{BeanDefinition, Dependencies, DependencySite, Instance};
    pub use crate::descriptor::TypeDescriptor;
    pub use crate::error::{BoxError, KhaznaError, Result};
    pub use crate::reference::ReferenceKind;
    pub use crate::scope::ScopeKind;
    pub use crate::source::{BeanSource, DefinitionSink};
    pub use crate::store::TerminationReport;
    pub use crate::wiring::WiringMode;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
