//! Bean registry: the definition table.
//!
//! The registry maps bean names to their definitions, with the scope and
//! wiring mode each bean resolved to at registration. It is filled by the
//! builder and frozen inside the container.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::config::ContainerConfig;
use crate::definition::BeanDefinition;
use crate::descriptor::TypeDescriptor;
use crate::error::{DuplicateBeanNameError, InvalidScopeError, KhaznaError, Result};
use crate::scope::ScopeKind;
use crate::wiring::{WiringMode, WiringResolver};

/// A definition together with what it resolved to at registration.
#[derive(Debug, Clone)]
pub struct RegisteredBean {
    definition: BeanDefinition,
    scope: ScopeKind,
    mode: WiringMode,
    order: u64,
}

impl RegisteredBean {
    pub fn definition(&self) -> &BeanDefinition {
        &self.definition
    }

    /// Effective scope; never [`ScopeKind::Default`].
    pub fn scope(&self) -> &ScopeKind {
        &self.scope
    }

    /// Effective wiring mode; never [`WiringMode::Default`].
    pub fn mode(&self) -> WiringMode {
        self.mode
    }
}

/// Stores every bean definition by name.
#[derive(Debug)]
pub struct BeanRegistry {
    beans: HashMap<String, RegisteredBean>,
    custom_scopes: HashSet<ScopeKind>,
    default_scope: ScopeKind,
    detect_duplicates: bool,
    wiring: WiringResolver,
    next_order: u64,
}

impl BeanRegistry {
    /// Creates an empty registry following `config`.
    ///
    /// # Errors
    /// Whatever [`ContainerConfig::validate`] reports.
    pub fn new(config: &ContainerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            beans: HashMap::new(),
            custom_scopes: HashSet::new(),
            default_scope: config.default_scope.clone(),
            detect_duplicates: config.detect_duplicate_names,
            wiring: config.wiring_resolver()?,
            next_order: 0,
        })
    }

    /// Registers a custom contextual scope so beans may declare it.
    ///
    /// Registering the same scope twice is a no-op.
    ///
    /// # Errors
    /// [`KhaznaError::InvalidScope`] for anything but [`ScopeKind::Custom`].
    pub fn register_scope(&mut self, scope: ScopeKind) -> Result<()> {
        if !matches!(scope, ScopeKind::Custom(_)) {
            return Err(KhaznaError::InvalidScope(InvalidScopeError {
                scope: scope.to_string(),
                bean: None,
                reason: "only custom scopes can be registered; built-in scopes always exist",
            }));
        }
        debug!(scope = %scope, "Registered custom scope");
        self.custom_scopes.insert(scope);
        Ok(())
    }

    /// Registers a bean definition.
    ///
    /// With duplicate detection off, a definition with a taken name replaces
    /// the previous one.
    ///
    /// # Errors
    /// - [`KhaznaError::DuplicateBeanName`] if the name is taken and duplicate
    ///   detection is on
    /// - [`KhaznaError::InvalidScope`] if the declared scope is the `Default`
    ///   marker or an unregistered custom scope
    pub fn register(&mut self, definition: BeanDefinition) -> Result<()> {
        if self.detect_duplicates && self.beans.contains_key(definition.name()) {
            return Err(KhaznaError::DuplicateBeanName(DuplicateBeanNameError {
                name: definition.name().to_string(),
            }));
        }
        self.insert(definition).map(|_| ())
    }

    /// Replaces (or adds) a definition regardless of duplicate detection,
    /// returning the replaced one.
    pub fn reregister(&mut self, definition: BeanDefinition) -> Result<Option<BeanDefinition>> {
        self.insert(definition)
    }

    /// Removes a definition.
    pub fn remove(&mut self, name: &str) -> Option<BeanDefinition> {
        let removed = self.beans.remove(name).map(|bean| bean.definition);
        if removed.is_some() {
            debug!(bean = name, "Removed bean definition");
        }
        removed
    }

    fn insert(&mut self, definition: BeanDefinition) -> Result<Option<BeanDefinition>> {
        let scope = self.effective_scope(&definition)?;
        let mode = self.wiring.resolve(definition.declared_wiring());
        let name = definition.name().to_string();
        let order = self.next_order;
        self.next_order += 1;

        debug!(bean = %name, scope = %scope, wiring = %mode, "Registered bean");
        let previous = self.beans.insert(
            name.clone(),
            RegisteredBean {
                definition,
                scope,
                mode,
                order,
            },
        );
        if previous.is_some() {
            debug!(bean = %name, "Replaced previous definition");
        }
        Ok(previous.map(|bean| bean.definition))
    }

    fn effective_scope(&self, definition: &BeanDefinition) -> Result<ScopeKind> {
        let (scope, reason) = match definition.declared_scope() {
            Some(ScopeKind::Default) => {
                return Err(KhaznaError::InvalidScope(InvalidScopeError {
                    scope: ScopeKind::Default.to_string(),
                    bean: Some(definition.name().to_string()),
                    reason: "the default marker cannot be declared; omit the scope instead",
                }));
            }
            Some(declared) => (declared, "the scope is not registered with the builder"),
            None => (
                &self.default_scope,
                "the container default scope is not registered with the builder",
            ),
        };

        if !self.is_known_scope(scope) {
            return Err(KhaznaError::InvalidScope(InvalidScopeError {
                scope: scope.to_string(),
                bean: Some(definition.name().to_string()),
                reason,
            }));
        }
        Ok(scope.clone())
    }

    /// Returns `true` for built-in concrete scopes and registered custom ones.
    pub fn is_known_scope(&self, scope: &ScopeKind) -> bool {
        match scope {
            ScopeKind::Default => false,
            ScopeKind::Custom(_) => self.custom_scopes.contains(scope),
            _ => true,
        }
    }

    /// Registered custom scopes.
    pub fn custom_scopes(&self) -> impl Iterator<Item = &ScopeKind> {
        self.custom_scopes.iter()
    }

    pub fn lookup_definition(&self, name: &str) -> Option<&BeanDefinition> {
        self.beans.get(name).map(|bean| &bean.definition)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredBean> {
        self.beans.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.beans.contains_key(name)
    }

    /// Names of beans declaring or providing `ty`, in registration order.
    pub fn beans_of_type(&self, ty: &TypeDescriptor) -> Vec<String> {
        let mut matches: Vec<&RegisteredBean> = self
            .beans
            .values()
            .filter(|bean| bean.definition.types().any(|t| t == ty))
            .collect();
        matches.sort_by_key(|bean| bean.order);

        let names: Vec<String> = matches
            .into_iter()
            .map(|bean| bean.definition.name().to_string())
            .collect();
        trace!(ty = %ty, candidates = ?names, "Beans of type");
        names
    }

    /// Every bean name, in registration order.
    pub fn names(&self) -> Vec<&str> {
        let mut beans: Vec<&RegisteredBean> = self.beans.values().collect();
        beans.sort_by_key(|bean| bean.order);
        beans.into_iter().map(|bean| bean.definition.name()).collect()
    }

    pub fn wiring(&self) -> &WiringResolver {
        &self.wiring
    }

    pub fn default_scope(&self) -> &ScopeKind {
        &self.default_scope
    }

    pub fn len(&self) -> usize {
        self.beans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }
}

impl Default for BeanRegistry {
    fn default() -> Self {
        Self {
            beans: HashMap::new(),
            custom_scopes: HashSet::new(),
            default_scope: ScopeKind::Singleton,
            detect_duplicates: true,
            wiring: WiringResolver::default(),
            next_order: 0,
        }
    }
}
