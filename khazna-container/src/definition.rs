//! Bean definitions.
//!
//! A [`BeanDefinition`] tells the container how to build one named bean:
//! its factory, scope, wiring mode and the dependency sites the factory
//! expects to find in [`Dependencies`].

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::bridge::{BeanHandle, BeanRef};
use crate::descriptor::TypeDescriptor;
use crate::error::{BoxError, KhaznaError, Result};
use crate::scope::ScopeKind;
use crate::wiring::WiringMode;

/// A live, type-erased bean instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Builds an instance from its resolved dependencies.
///
/// `Arc` rather than `Box`: definitions are cloned into plans and shared
/// between threads.
pub type FactoryFn = Arc<dyn Fn(&Dependencies) -> std::result::Result<Instance, BoxError> + Send + Sync>;

/// Init or destroy hook run against a constructed instance.
pub type HookFn = Arc<dyn Fn(&Instance) -> std::result::Result<(), BoxError> + Send + Sync>;

/// One dependency a bean's factory expects.
///
/// `key` identifies the site inside [`Dependencies`] and doubles as the
/// name token for the `Name` reference strategy. An explicit reference
/// bypasses the reference strategies altogether.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySite {
    key: String,
    reference: Option<String>,
    declared_type: Option<TypeDescriptor>,
}

impl DependencySite {
    /// A site resolved implicitly from its key and declared type.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reference: None,
            declared_type: None,
        }
    }

    /// Sets an explicit bean name for this site.
    pub fn reference(mut self, bean: impl Into<String>) -> Self {
        self.reference = Some(bean.into());
        self
    }

    /// Declares the site's type as `T`.
    pub fn typed<T: ?Sized + 'static>(self) -> Self {
        self.with_type(TypeDescriptor::of::<T>())
    }

    /// Declares the site's type from a descriptor.
    pub fn with_type(mut self, declared_type: TypeDescriptor) -> Self {
        self.declared_type = Some(declared_type);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn explicit_reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn declared_type(&self) -> Option<&TypeDescriptor> {
        self.declared_type.as_ref()
    }
}

/// Everything the container needs to build and manage one bean.
///
/// # Examples
/// ```
/// use khazna_container::definition::{BeanDefinition, DependencySite};
/// use khazna_container::scope::ScopeKind;
///
/// struct Database { url: String }
/// struct UserRepo { db: std::sync::Arc<Database> }
///
/// let db = BeanDefinition::new("database", |_| {
///     Ok(Database { url: "postgres://localhost".into() })
/// });
///
/// let repo = BeanDefinition::new("userRepo", |deps| {
///     Ok(UserRepo { db: deps.get::<Database>("database")? })
/// })
/// .scope(ScopeKind::Request)
/// .depends_on(DependencySite::new("database").typed::<Database>());
///
/// assert_eq!(repo.sites().len(), 1);
/// # let _ = db;
/// ```
#[derive(Clone)]
pub struct BeanDefinition {
    name: String,
    declared_type: TypeDescriptor,
    scope: Option<ScopeKind>,
    wiring: WiringMode,
    sites: Vec<DependencySite>,
    provides: Vec<TypeDescriptor>,
    factory: FactoryFn,
    init: Option<HookFn>,
    destroy: Option<HookFn>,
}

impl BeanDefinition {
    /// Defines a bean of type `T` built by `factory`.
    ///
    /// The scope defaults to the container default and the wiring mode to
    /// [`WiringMode::Default`].
    pub fn new<T, F>(name: impl Into<String>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::from_factory(
            name,
            TypeDescriptor::of::<T>(),
            Arc::new(
                move |deps: &Dependencies| -> std::result::Result<Instance, BoxError> {
                    Ok(Arc::new(factory(deps)?) as Instance)
                },
            ),
        )
    }

    /// Defines a bean that always yields clones of `value`.
    pub fn value<T: Clone + Any + Send + Sync>(name: impl Into<String>, value: T) -> Self {
        Self::new(name, move |_| Ok(value.clone()))
    }

    /// Defines a bean from a raw, type-erased factory.
    pub fn from_factory(
        name: impl Into<String>,
        declared_type: TypeDescriptor,
        factory: FactoryFn,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type,
            scope: None,
            wiring: WiringMode::Default,
            sites: Vec::new(),
            provides: Vec::new(),
            factory,
            init: None,
            destroy: None,
        }
    }

    pub fn scope(mut self, scope: ScopeKind) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Parses and sets the scope from its textual name.
    pub fn parse_scope(self, scope: &str) -> Result<Self> {
        Ok(self.scope(scope.parse()?))
    }

    pub fn wiring(mut self, mode: WiringMode) -> Self {
        self.wiring = mode;
        self
    }

    /// Parses and sets the wiring mode from its textual name.
    pub fn parse_wiring(self, mode: &str) -> Result<Self> {
        Ok(self.wiring(mode.parse()?))
    }

    /// Appends a dependency site. Sites are resolved in declaration order.
    pub fn depends_on(mut self, site: DependencySite) -> Self {
        self.sites.push(site);
        self
    }

    /// Declares an extra type this bean can be autowired as, e.g. a trait.
    pub fn provides<T: ?Sized + 'static>(mut self) -> Self {
        self.provides.push(TypeDescriptor::of::<T>());
        self
    }

    pub fn provides_type(mut self, declared_type: TypeDescriptor) -> Self {
        self.provides.push(declared_type);
        self
    }

    /// Runs `hook` right after construction, before the instance is cached.
    pub fn on_init<T, H>(mut self, hook: H) -> Self
    where
        T: Any + Send + Sync,
        H: Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.init = Some(typed_hook(self.name.clone(), hook));
        self
    }

    /// Runs `hook` when the instance's scope context is terminated.
    pub fn on_destroy<T, H>(mut self, hook: H) -> Self
    where
        T: Any + Send + Sync,
        H: Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.destroy = Some(typed_hook(self.name.clone(), hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> &TypeDescriptor {
        &self.declared_type
    }

    /// Declared scope; `None` means the container default.
    pub fn declared_scope(&self) -> Option<&ScopeKind> {
        self.scope.as_ref()
    }

    /// Wiring mode as declared, possibly DEFAULT.
    pub fn declared_wiring(&self) -> WiringMode {
        self.wiring
    }

    pub fn sites(&self) -> &[DependencySite] {
        &self.sites
    }

    /// The declared type followed by every provided type.
    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        std::iter::once(&self.declared_type).chain(self.provides.iter())
    }

    pub(crate) fn factory(&self) -> &FactoryFn {
        &self.factory
    }

    pub(crate) fn init_hook(&self) -> Option<&HookFn> {
        self.init.as_ref()
    }

    pub(crate) fn destroy_hook(&self) -> Option<&HookFn> {
        self.destroy.as_ref()
    }
}

fn typed_hook<T, H>(bean: String, hook: H) -> HookFn
where
    T: Any + Send + Sync,
    H: Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(
        move |instance: &Instance| -> std::result::Result<(), BoxError> {
            match instance.downcast_ref::<T>() {
                Some(value) => hook(value),
                None => Err(KhaznaError::TypeMismatch {
                    bean: bean.clone(),
                    expected: type_name::<T>(),
                }
                .into()),
            }
        },
    )
}

fn same_hook(a: &Option<HookFn>, b: &Option<HookFn>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

// Factories compare by identity: a clone of a definition equals the original.
impl PartialEq for BeanDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.declared_type == other.declared_type
            && self.scope == other.scope
            && self.wiring == other.wiring
            && self.sites == other.sites
            && self.provides == other.provides
            && Arc::ptr_eq(&self.factory, &other.factory)
            && same_hook(&self.init, &other.init)
            && same_hook(&self.destroy, &other.destroy)
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("type", &self.declared_type)
            .field("scope", &self.scope)
            .field("wiring", &self.wiring)
            .field("sites", &self.sites)
            .field("provides", &self.provides)
            .field("init", &self.init.is_some())
            .field("destroy", &self.destroy.is_some())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Dependencies
// ═══════════════════════════════════════════

/// The resolved dependencies handed to a factory, keyed by site key.
///
/// Sites that were skipped (OPTIONAL, or NONE wiring) are simply absent.
pub struct Dependencies {
    bean: String,
    entries: HashMap<String, BeanHandle>,
}

impl Dependencies {
    pub(crate) fn new(bean: impl Into<String>) -> Self {
        Self {
            bean: bean.into(),
            entries: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: impl Into<String>, handle: BeanHandle) {
        self.entries.insert(key.into(), handle);
    }

    /// Name of the bean being constructed.
    pub fn bean(&self) -> &str {
        &self.bean
    }

    /// Returns the current instance wired at `key`.
    ///
    /// For a bridged site this resolves the instance of the currently
    /// active context; keep a [`BeanRef`] via [`Dependencies::scoped`] to
    /// re-resolve on every access instead.
    ///
    /// # Errors
    /// [`KhaznaError::NotInjected`] if the site was not wired,
    /// [`KhaznaError::TypeMismatch`] if the instance is not a `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
        self.get_optional(key)?.ok_or_else(|| KhaznaError::NotInjected {
            bean: self.bean.clone(),
            key: key.to_string(),
        })
    }

    /// Like [`Dependencies::get`], but `Ok(None)` for an unwired site.
    pub fn get_optional<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>> {
        match self.entries.get(key) {
            Some(handle) => downcast(handle.bean(), handle.current()?).map(Some),
            None => Ok(None),
        }
    }

    /// A typed handle to the site that can be stored inside the bean.
    ///
    /// Resolving a forwarding handle from inside the factory that receives
    /// it must not lead back to the bean under construction; such a lookup
    /// fails with [`KhaznaError::CyclicDependency`].
    pub fn scoped<T: Any + Send + Sync>(&self, key: &str) -> Result<BeanRef<T>> {
        self.entries
            .get(key)
            .map(|handle| BeanRef::new(handle.clone()))
            .ok_or_else(|| KhaznaError::NotInjected {
                bean: self.bean.clone(),
                key: key.to_string(),
            })
    }

    /// The raw handle wired at `key`, if any.
    pub fn handle(&self, key: &str) -> Option<&BeanHandle> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("Dependencies")
            .field("bean", &self.bean)
            .field("keys", &keys)
            .finish()
    }
}

/// Downcasts a type-erased instance, reporting the bean name on mismatch.
pub(crate) fn downcast<T: Any + Send + Sync>(bean: &str, instance: Instance) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| KhaznaError::TypeMismatch {
        bean: bean.to_string(),
        expected: type_name::<T>(),
    })
}
