//! Scope contexts and their activation on the current thread.
//!
//! A [`ContextKey`] names one session, request or custom-scope context.
//! Contexts are activated per thread and per container; the innermost
//! activation of a scope kind is the "current" context that lookups and
//! forwarding handles resolve against.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::scope::ScopeKind;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Identifies one scope context.
///
/// [`ContextKey::ROOT`] is the implicit context of singletons and prototypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey(u64);

impl ContextKey {
    /// The single, container-wide context.
    pub const ROOT: ContextKey = ContextKey(0);

    /// Allocates a key never handed out before in this process.
    pub fn fresh() -> Self {
        ContextKey(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Runs once when a thread's Thread-scope context is dropped with the thread.
pub(crate) type Release = Box<dyn FnOnce(ContextKey)>;

/// One container's Thread-scope context on this thread.
struct ThreadContext {
    key: ContextKey,
    release: Option<Release>,
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.key);
        }
    }
}

thread_local! {
    static ACTIVE: RefCell<HashMap<(u64, ScopeKind), Vec<ContextKey>>> = RefCell::new(HashMap::new());
    static THREAD_CONTEXTS: RefCell<HashMap<u64, ThreadContext>> = RefCell::new(HashMap::new());
    static IN_PROGRESS: RefCell<Vec<(u64, String, ContextKey)>> = const { RefCell::new(Vec::new()) };
}

/// The innermost active context of `scope` for `container` on this thread.
pub(crate) fn current(container: u64, scope: &ScopeKind) -> Option<ContextKey> {
    ACTIVE.with(|active| {
        active
            .borrow()
            .get(&(container, scope.clone()))
            .and_then(|stack| stack.last().copied())
    })
}

fn push(container: u64, scope: &ScopeKind, key: ContextKey) {
    ACTIVE.with(|active| {
        active
            .borrow_mut()
            .entry((container, scope.clone()))
            .or_default()
            .push(key);
    });
}

fn pop(container: u64, scope: &ScopeKind, key: ContextKey) {
    // try_with: guards may drop during thread teardown
    let _ = ACTIVE.try_with(|active| {
        let mut active = active.borrow_mut();
        let slot = (container, scope.clone());
        if let Some(stack) = active.get_mut(&slot) {
            if let Some(pos) = stack.iter().rposition(|k| *k == key) {
                stack.remove(pos);
            }
            if stack.is_empty() {
                active.remove(&slot);
            }
        }
    });
}

/// The Thread-scope context of this thread for `container`, created on first use.
///
/// `release` is called once, on first use, and its result runs when the
/// thread exits unless the context was taken before.
pub(crate) fn thread_context(container: u64, release: impl FnOnce() -> Release) -> ContextKey {
    THREAD_CONTEXTS.with(|contexts| {
        contexts
            .borrow_mut()
            .entry(container)
            .or_insert_with(|| ThreadContext {
                key: ContextKey::fresh(),
                release: Some(release()),
            })
            .key
    })
}

/// Detaches and returns this thread's Thread-scope context, if one exists.
///
/// The detached context is not released on thread exit.
pub(crate) fn take_thread_context(container: u64) -> Option<ContextKey> {
    let mut taken = THREAD_CONTEXTS.with(|contexts| contexts.borrow_mut().remove(&container))?;
    taken.release = None;
    Some(taken.key)
}

/// Marks `bean` in `context` as being looked up on this thread until the
/// returned guard drops.
///
/// A lookup that comes back to a (bean, context) pair still in progress on
/// the same thread would wait on itself. It fails instead with the chain of
/// beans from the first occurrence back to `bean`.
pub(crate) fn begin_lookup(
    container: u64,
    bean: &str,
    context: ContextKey,
) -> std::result::Result<LookupGuard, Vec<String>> {
    IN_PROGRESS.with(|stack| {
        let mut stack = stack.borrow_mut();
        let repeated = stack
            .iter()
            .position(|(c, b, k)| *c == container && b == bean && *k == context);
        if let Some(start) = repeated {
            let mut chain: Vec<String> = stack[start..]
                .iter()
                .filter(|(c, _, _)| *c == container)
                .map(|(_, b, _)| b.clone())
                .collect();
            chain.push(bean.to_string());
            return Err(chain);
        }
        stack.push((container, bean.to_string(), context));
        Ok(LookupGuard {
            _thread_bound: PhantomData,
        })
    })
}

/// Pops its lookup from the in-progress stack on drop.
pub(crate) struct LookupGuard {
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for LookupGuard {
    fn drop(&mut self) {
        // Guards drop in reverse order of creation.
        let _ = IN_PROGRESS.try_with(|stack| stack.borrow_mut().pop());
    }
}

/// Keeps a context active on the current thread until dropped.
///
/// Guards nest: dropping an inner guard re-exposes the outer context.
/// A guard is tied to the thread that created it and is therefore `!Send`.
#[must_use = "the context is deactivated as soon as the guard is dropped"]
pub struct ContextGuard {
    container: u64,
    scope: ScopeKind,
    key: ContextKey,
    _thread_bound: PhantomData<*const ()>,
}

impl ContextGuard {
    pub(crate) fn activate(container: u64, scope: ScopeKind, key: ContextKey) -> Self {
        push(container, &scope, key);
        Self {
            container,
            scope,
            key,
            _thread_bound: PhantomData,
        }
    }

    pub fn key(&self) -> ContextKey {
        self.key
    }

    pub fn scope(&self) -> &ScopeKind {
        &self.scope
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        pop(self.container, &self.scope, self.key);
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("scope", &self.scope)
            .field("key", &self.key)
            .finish()
    }
}
