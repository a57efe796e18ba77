//! Mixed-scope bridging.
//!
//! When a bean depends on a shorter-lived bean, injecting the instance
//! observed at wiring time would pin it past its context. The bridge
//! instead hands the consumer a forwarding [`BeanHandle`] that looks the
//! dependency up again, against whatever context is active, on every access.
//!
//! Forwarding handles come from a [`ProxyFactory`] capability passed to the
//! builder; [`ForwardingProxies`] is the stock implementation.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::config::MixedScopePolicy;
use crate::definition::{Instance, downcast};
use crate::error::{KhaznaError, MixedScopeError, Result};
use crate::scope::ScopeKind;

/// Re-resolves a bean against the currently active context.
pub type Lookup = Arc<dyn Fn() -> Result<Instance> + Send + Sync>;

/// A wired dependency: either a fixed instance or a forwarding lookup.
#[derive(Clone)]
pub enum BeanHandle {
    /// The instance observed at wiring time.
    Direct { bean: String, instance: Instance },
    /// Resolved on every access.
    Forwarding { bean: String, lookup: Lookup },
}

impl BeanHandle {
    pub fn direct(bean: impl Into<String>, instance: Instance) -> Self {
        BeanHandle::Direct {
            bean: bean.into(),
            instance,
        }
    }

    pub fn forwarding(bean: impl Into<String>, lookup: Lookup) -> Self {
        BeanHandle::Forwarding {
            bean: bean.into(),
            lookup,
        }
    }

    /// Name of the bean behind this handle.
    pub fn bean(&self) -> &str {
        match self {
            BeanHandle::Direct { bean, .. } | BeanHandle::Forwarding { bean, .. } => bean,
        }
    }

    /// The instance this handle currently stands for.
    ///
    /// # Errors
    /// For forwarding handles, whatever the lookup reports: typically
    /// [`KhaznaError::ScopeNotActive`] outside any context of the
    /// dependency's scope, or [`KhaznaError::ContainerDropped`].
    pub fn current(&self) -> Result<Instance> {
        match self {
            BeanHandle::Direct { instance, .. } => Ok(instance.clone()),
            BeanHandle::Forwarding { bean, lookup } => {
                trace!(bean = %bean, "Forwarding lookup");
                lookup()
            }
        }
    }

    pub fn is_forwarding(&self) -> bool {
        matches!(self, BeanHandle::Forwarding { .. })
    }
}

impl fmt::Debug for BeanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_forwarding() { "forwarding" } else { "direct" };
        f.debug_struct("BeanHandle")
            .field("bean", &self.bean())
            .field("kind", &kind)
            .finish()
    }
}

/// A typed [`BeanHandle`], suitable for storing inside a bean.
///
/// # Examples
/// ```
/// use khazna_container::bridge::{BeanHandle, BeanRef};
/// use std::sync::Arc;
///
/// let handle = BeanHandle::direct("greeting", Arc::new(String::from("hi")));
/// let greeting: BeanRef<String> = BeanRef::new(handle);
/// assert_eq!(greeting.get().unwrap().as_str(), "hi");
/// ```
pub struct BeanRef<T> {
    handle: BeanHandle,
    _type: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> BeanRef<T> {
    pub fn new(handle: BeanHandle) -> Self {
        Self {
            handle,
            _type: PhantomData,
        }
    }

    /// The instance for the currently active context.
    pub fn get(&self) -> Result<Arc<T>> {
        downcast(self.handle.bean(), self.handle.current()?)
    }

    pub fn handle(&self) -> &BeanHandle {
        &self.handle
    }
}

impl<T> Clone for BeanRef<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _type: PhantomData,
        }
    }
}

impl<T> fmt::Debug for BeanRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BeanRef").field(&self.handle).finish()
    }
}

/// The capability of producing forwarding handles.
pub trait ProxyFactory: Send + Sync {
    /// Wraps `lookup` into a handle standing in for `bean`.
    fn wrap(&self, bean: &str, lookup: Lookup) -> BeanHandle;
}

/// Produces plain [`BeanHandle::Forwarding`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardingProxies;

impl ProxyFactory for ForwardingProxies {
    fn wrap(&self, bean: &str, lookup: Lookup) -> BeanHandle {
        BeanHandle::forwarding(bean, lookup)
    }
}

/// How one dependency edge gets wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bridging {
    /// Inject the instance itself.
    Direct,
    /// Inject a forwarding handle.
    Forward,
}

/// Applies the [`MixedScopePolicy`] to dependency edges.
#[derive(Clone)]
pub struct ScopeBridge {
    policy: MixedScopePolicy,
    proxies: Option<Arc<dyn ProxyFactory>>,
}

impl ScopeBridge {
    pub fn new(policy: MixedScopePolicy, proxies: Option<Arc<dyn ProxyFactory>>) -> Self {
        if policy.bridge_enabled && proxies.is_none() {
            warn!("Scoped-proxy bridging is enabled but no proxy capability is installed; mixed scopes will not be bridged");
        }
        Self { policy, proxies }
    }

    /// `true` when bridging is enabled and a capability is installed.
    pub fn can_bridge(&self) -> bool {
        self.policy.bridge_enabled && self.proxies.is_some()
    }

    /// Decides how `dependency` is wired into `consumer`.
    ///
    /// # Errors
    /// [`KhaznaError::MixedScopeViolation`] when the scopes mix, bridging is
    /// unavailable and mixed-scope detection is on.
    pub fn classify(
        &self,
        consumer: &str,
        consumer_scope: &ScopeKind,
        dependency: &str,
        dependency_scope: &ScopeKind,
    ) -> Result<Bridging> {
        if consumer_scope.accepts(dependency_scope) {
            return Ok(Bridging::Direct);
        }

        if self.can_bridge() {
            if self.policy.detect_as_error {
                warn!(
                    consumer,
                    %consumer_scope,
                    dependency,
                    %dependency_scope,
                    "Mixed scopes bridged with a forwarding handle"
                );
            } else {
                trace!(consumer, dependency, "Bridging mixed scopes");
            }
            return Ok(Bridging::Forward);
        }

        if self.policy.detect_as_error {
            return Err(KhaznaError::MixedScopeViolation(MixedScopeError {
                consumer: consumer.to_string(),
                consumer_scope: consumer_scope.clone(),
                dependency: dependency.to_string(),
                dependency_scope: dependency_scope.clone(),
            }));
        }

        trace!(
            consumer,
            dependency,
            "Mixed scopes wired directly; the dependency is pinned at wiring time"
        );
        Ok(Bridging::Direct)
    }

    /// Produces a forwarding handle through the installed capability.
    ///
    /// # Errors
    /// [`KhaznaError::ProxyCapabilityUnavailable`] if none is installed.
    pub fn wrap(&self, bean: &str, lookup: Lookup) -> Result<BeanHandle> {
        let proxies = self
            .proxies
            .as_ref()
            .ok_or_else(|| KhaznaError::ProxyCapabilityUnavailable {
                bean: bean.to_string(),
            })?;
        Ok(proxies.wrap(bean, lookup))
    }

    pub fn policy(&self) -> MixedScopePolicy {
        self.policy
    }
}

impl fmt::Debug for ScopeBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeBridge")
            .field("policy", &self.policy)
            .field("capability", &self.proxies.is_some())
            .finish()
    }
}
