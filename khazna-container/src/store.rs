//! Per-scope instance storage.
//!
//! A [`ScopeStore`] owns every live instance of one scope kind, keyed by
//! context and bean name. Each entry is a `OnceCell`: the first caller runs
//! the factory while racers for the same entry wait, and a failed factory
//! leaves the cell empty. Distinct contexts live in distinct map entries and
//! never wait on each other.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::context::ContextKey;
use crate::definition::{HookFn, Instance};
use crate::error::{BoxError, KhaznaError, Result};
use crate::scope::ScopeKind;

/// Committed instances of one context, in creation order.
#[derive(Default)]
struct Created {
    entries: Vec<(String, Instance, Option<HookFn>)>,
    /// Set by `terminate`; later commits are destroyed instead of recorded.
    closed: bool,
}

/// Instances of one context, plus their creation order for teardown.
#[derive(Default)]
struct ContextInstances {
    cells: DashMap<String, Arc<OnceCell<Instance>>>,
    created: Mutex<Created>,
}

/// A destroy hook that failed during termination.
#[derive(Debug)]
pub struct TeardownFailure {
    pub bean: String,
    pub context: ContextKey,
    pub error: BoxError,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "destroy hook of {:?} in {} failed: {}",
            self.bean, self.context, self.error
        )
    }
}

/// Result of terminating one context.
#[derive(Debug)]
pub struct TerminationReport {
    pub scope: ScopeKind,
    pub context: ContextKey,
    /// Number of instances evicted
    pub evicted: usize,
    /// Destroy hooks that failed; eviction happened regardless
    pub failures: Vec<TeardownFailure>,
}

impl TerminationReport {
    pub(crate) fn empty(scope: ScopeKind, context: ContextKey) -> Self {
        Self {
            scope,
            context,
            evicted: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Live instances of one scope kind.
///
/// Contexts of explicit scopes (session, request, custom) exist only
/// between [`ScopeStore::open`] and [`ScopeStore::terminate`]. Singleton
/// and Thread contexts are opened on first access.
pub struct ScopeStore {
    scope: ScopeKind,
    contexts: DashMap<ContextKey, Arc<ContextInstances>>,
}

impl ScopeStore {
    pub fn new(scope: ScopeKind) -> Self {
        Self {
            scope,
            contexts: DashMap::new(),
        }
    }

    pub fn scope(&self) -> &ScopeKind {
        &self.scope
    }

    /// Opens `context` for lookups. Opening an open context is a no-op.
    pub fn open(&self, context: ContextKey) {
        self.contexts.entry(context).or_default();
    }

    /// Returns `true` if `context` is open.
    pub fn is_open(&self, context: ContextKey) -> bool {
        self.contexts.contains_key(&context)
    }

    /// Returns the cached instance of `bean` in `context`, creating it with
    /// `factory` on first access.
    ///
    /// The factory runs at most once per (bean, context) even under
    /// concurrent first access, and its result is committed before any
    /// waiter sees it. Prototype stores never cache: the factory runs on
    /// every call and `destroy` is ignored.
    ///
    /// # Errors
    /// [`KhaznaError::ContextClosed`] if `context` of an explicit scope is
    /// not open, or was terminated while the factory ran. In the latter
    /// case the new instance is destroyed right away.
    pub fn get_or_create<F>(
        &self,
        bean: &str,
        context: ContextKey,
        destroy: Option<&HookFn>,
        factory: F,
    ) -> Result<Instance>
    where
        F: FnOnce() -> Result<Instance>,
    {
        if !self.scope.is_cached() {
            trace!(bean, scope = %self.scope, "Creating uncached instance");
            return factory();
        }

        // Clone the Arcs out so no map guard is held while the factory
        // runs; factories re-enter the store for their own dependencies.
        let instances = if self.scope.is_contextual() {
            self.contexts
                .get(&context)
                .map(|entry| entry.value().clone())
                .ok_or_else(|| self.closed(bean, context))?
        } else {
            self.contexts.entry(context).or_default().clone()
        };
        let cell = instances
            .cells
            .entry(bean.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if let Some(instance) = cell.get() {
            trace!(bean, %context, "Instance cache hit");
            return Ok(instance.clone());
        }

        let instance = cell.get_or_try_init(|| {
            if instances.created.lock().closed {
                return Err(self.closed(bean, context));
            }
            let instance = factory()?;

            let mut created = instances.created.lock();
            if created.closed {
                drop(created);
                let failure = self.destroy(bean, context, destroy, &instance);
                warn!(bean, scope = %self.scope, %context, "Context terminated during construction, instance destroyed");
                if let Some(failure) = failure {
                    warn!(bean, error = %failure.error, "Destroy hook failed");
                }
                return Err(self.closed(bean, context));
            }
            created
                .entries
                .push((bean.to_string(), instance.clone(), destroy.cloned()));
            debug!(bean, scope = %self.scope, %context, "Instance committed");
            Ok(instance)
        })?;
        Ok(instance.clone())
    }

    /// Returns `true` if `bean` has a live instance in `context`.
    pub fn contains(&self, bean: &str, context: ContextKey) -> bool {
        self.contexts
            .get(&context)
            .and_then(|instances| instances.cells.get(bean).map(|cell| cell.get().is_some()))
            .unwrap_or(false)
    }

    /// Number of live instances in `context`.
    pub fn live_count(&self, context: ContextKey) -> usize {
        self.contexts
            .get(&context)
            .map(|instances| instances.cells.iter().filter(|c| c.get().is_some()).count())
            .unwrap_or(0)
    }

    /// Contexts that are currently open.
    pub fn contexts(&self) -> Vec<ContextKey> {
        let mut keys: Vec<ContextKey> = self.contexts.iter().map(|e| *e.key()).collect();
        keys.sort();
        keys
    }

    /// Evicts every instance of `context`, closes it, and runs the destroy
    /// hooks in reverse creation order.
    ///
    /// Hook errors and panics are collected into the report and logged;
    /// they never stop the remaining hooks. Factories still running for
    /// the context destroy their instance themselves on completion.
    pub fn terminate(&self, context: ContextKey) -> TerminationReport {
        let Some((_, instances)) = self.contexts.remove(&context) else {
            trace!(scope = %self.scope, %context, "Nothing to terminate");
            return TerminationReport::empty(self.scope.clone(), context);
        };

        let created = {
            let mut created = instances.created.lock();
            created.closed = true;
            std::mem::take(&mut created.entries)
        };
        instances.cells.clear();

        let mut report = TerminationReport::empty(self.scope.clone(), context);
        report.evicted = created.len();
        report.failures = created
            .into_iter()
            .rev()
            .filter_map(|(bean, instance, hook)| self.destroy(&bean, context, hook.as_ref(), &instance))
            .collect();

        // Logged after every hook ran: on thread exit the logger may be gone.
        for failure in &report.failures {
            warn!(bean = %failure.bean, scope = %self.scope, %context, error = %failure.error, "Destroy hook failed");
        }

        debug!(
            scope = %self.scope,
            %context,
            evicted = report.evicted,
            failures = report.failures.len(),
            "Context terminated"
        );
        report
    }

    /// Terminates every context of this store.
    pub fn terminate_all(&self) -> Vec<TerminationReport> {
        self.contexts()
            .into_iter()
            .map(|context| self.terminate(context))
            .collect()
    }

    fn destroy(
        &self,
        bean: &str,
        context: ContextKey,
        hook: Option<&HookFn>,
        instance: &Instance,
    ) -> Option<TeardownFailure> {
        let hook = hook?;
        let outcome = catch_unwind(AssertUnwindSafe(|| hook(instance)))
            .unwrap_or_else(|_| Err("destroy hook panicked".into()));
        outcome.err().map(|error| TeardownFailure {
            bean: bean.to_string(),
            context,
            error,
        })
    }

    fn closed(&self, bean: &str, context: ContextKey) -> KhaznaError {
        KhaznaError::ContextClosed {
            bean: bean.to_string(),
            scope: self.scope.clone(),
            context,
        }
    }
}

impl fmt::Debug for ScopeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeStore")
            .field("scope", &self.scope)
            .field("contexts", &self.contexts.len())
            .finish()
    }
}
