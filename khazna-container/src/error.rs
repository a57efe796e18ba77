//! Error types for khazna container operations.
//!
//! Configuration errors ([`KhaznaError::InvalidScope`],
//! [`KhaznaError::InvalidWiringMode`], [`KhaznaError::DuplicateBeanName`])
//! abort a single registration. Resolution errors surface from the failing
//! lookup and never leave a half-built instance behind.

use std::fmt;

use khazna_support::rendering::render_chain;

use crate::context::ContextKey;
use crate::scope::ScopeKind;

/// Boxed error returned by bean factories and lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all khazna operations.
#[derive(Debug, thiserror::Error)]
pub enum KhaznaError {
    /// An abstract or unregistered scope was used where a concrete one is required.
    #[error("{}", .0)]
    InvalidScope(InvalidScopeError),

    /// A wiring mode was unparseable, or NONE/DEFAULT was used as the container default.
    #[error("Invalid wiring mode {mode:?}: {reason}")]
    InvalidWiringMode { mode: String, reason: &'static str },

    /// A bean name was registered twice while duplicate detection is on.
    #[error("{}", .0)]
    DuplicateBeanName(DuplicateBeanNameError),

    /// A STRICT dependency could not be matched to any bean.
    #[error("{}", .0)]
    MissingDependency(MissingDependencyError),

    /// Autowiring by type found more than one candidate.
    #[error("{}", .0)]
    AmbiguousDependency(AmbiguousDependencyError),

    /// A bean transitively depends on itself.
    #[error("{}", .0)]
    CyclicDependency(CyclicDependencyError),

    /// A shorter-lived bean was injected into a longer-lived one.
    #[error("{}", .0)]
    MixedScopeViolation(MixedScopeError),

    /// A forwarding handle was requested but no proxy capability is installed.
    #[error(
        "Scoped proxy for bean {bean:?} requested, but no proxy capability is installed\n  Hint: pass one to ContainerBuilder::with_proxy_factory"
    )]
    ProxyCapabilityUnavailable { bean: String },

    /// No bean is registered under the requested name.
    #[error("{}", .0)]
    NotRegistered(NotRegisteredError),

    /// A contextual bean was looked up outside any active context of its scope.
    #[error(
        "Bean {bean:?} is {scope}-scoped but no {scope} context is active on this thread\n  Hint: open one with Container::create_scope or Container::enter"
    )]
    ScopeNotActive { bean: String, scope: ScopeKind },

    /// The active context was never opened or has already been terminated.
    #[error(
        "Bean {bean:?} was requested in {scope} context {context}, which is closed\n  Hint: contexts cannot be used after Container::terminate or the end of their ScopedContext"
    )]
    ContextClosed {
        bean: String,
        scope: ScopeKind,
        context: ContextKey,
    },

    /// The instance is not of the requested Rust type.
    #[error("Bean {bean:?} is not of type {expected}")]
    TypeMismatch { bean: String, expected: &'static str },

    /// A factory asked for a dependency that was not wired.
    #[error("Dependency {key:?} was not injected into bean {bean:?}")]
    NotInjected { bean: String, key: String },

    /// A factory or init hook returned an error.
    #[error("Failed to construct bean {bean:?}: {source}")]
    ConstructionFailed {
        bean: String,
        #[source]
        source: BoxError,
    },

    /// A forwarding handle was used after its container was dropped.
    #[error("Container backing bean {bean:?} has been dropped")]
    ContainerDropped { bean: String },
}

/// Error when a scope kind is not usable.
#[derive(Debug)]
pub struct InvalidScopeError {
    /// The offending scope, as written
    pub scope: String,
    /// Bean declaring it, if any (none for the container default)
    pub bean: Option<String>,
    pub reason: &'static str,
}

impl fmt::Display for InvalidScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid scope {:?}: {}", self.scope, self.reason)?;
        if let Some(ref bean) = self.bean {
            write!(f, "\n  Declared by bean: {bean}")?;
        }
        Ok(())
    }
}

/// Error when trying to register a name that already exists.
#[derive(Debug)]
pub struct DuplicateBeanNameError {
    pub name: String,
}

impl fmt::Display for DuplicateBeanNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bean name already registered: {}", self.name)?;
        write!(
            f,
            "\n  Hint: use reregister() to replace it explicitly, or disable detect_duplicate_names"
        )
    }
}

/// Error when a STRICT dependency has no match.
#[derive(Debug)]
pub struct MissingDependencyError {
    /// Bean whose dependency failed
    pub bean: String,
    /// Dependency site key
    pub site: String,
    /// Names that were tried, in order
    pub tried: Vec<String>,
}

impl fmt::Display for MissingDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Missing dependency {:?} of bean {:?}",
            self.site, self.bean
        )?;
        if !self.tried.is_empty() {
            write!(f, "\n  Tried: {}", self.tried.join(", "))?;
        }
        write!(
            f,
            "\n  Hint: register a matching bean, or mark {:?} OPTIONAL",
            self.bean
        )
    }
}

/// Error when autowiring by type finds several beans.
#[derive(Debug)]
pub struct AmbiguousDependencyError {
    pub bean: String,
    pub site: String,
    /// Declared type of the dependency site
    pub type_name: String,
    /// Every bean whose type matched
    pub candidates: Vec<String>,
}

impl fmt::Display for AmbiguousDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ambiguous dependency {:?} of bean {:?}: {} beans of type {}",
            self.site,
            self.bean,
            self.candidates.len(),
            self.type_name
        )?;
        for candidate in &self.candidates {
            write!(f, "\n    - {candidate}")?;
        }
        write!(f, "\n  Hint: reference one of them by explicit name")
    }
}

/// Error when a bean transitively depends on itself.
///
/// Example chain: `["a", "b", "a"]`.
#[derive(Debug)]
pub struct CyclicDependencyError {
    pub chain: Vec<String>,
}

impl fmt::Display for CyclicDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cyclic dependency detected:\n  {}", render_chain(&self.chain))?;
        write!(
            f,
            "\n  Hint: make one edge OPTIONAL or restructure the beans"
        )
    }
}

/// Error when scope nesting is unsafe and bridging is off.
#[derive(Debug)]
pub struct MixedScopeError {
    pub consumer: String,
    pub consumer_scope: ScopeKind,
    pub dependency: String,
    pub dependency_scope: ScopeKind,
}

impl fmt::Display for MixedScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mixed scopes: cannot inject {} ({}) into {} ({})",
            self.dependency, self.dependency_scope, self.consumer, self.consumer_scope,
        )?;
        write!(
            f,
            "\n  A {} bean would keep a stale {} instance",
            self.consumer_scope, self.dependency_scope,
        )?;
        write!(
            f,
            "\n  Hint: enable wire_scoped_proxy, or widen the scope of {}",
            self.dependency
        )
    }
}

/// Error when no bean is registered under a name.
#[derive(Debug)]
pub struct NotRegisteredError {
    pub name: String,
    /// Registered names that look similar
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bean not registered: {}", self.name)?;
        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }
        Ok(())
    }
}

/// Convenient Result type for khazna operations.
pub type Result<T> = std::result::Result<T, KhaznaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_registered_display() {
        let err = KhaznaError::NotRegistered(NotRegisteredError {
            name: "userServise".into(),
            suggestions: vec!["userService".into()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("not registered"));
        assert!(msg.contains("userService"));
    }

    #[test]
    fn cyclic_dependency_display() {
        let err = KhaznaError::CyclicDependency(CyclicDependencyError {
            chain: vec!["a".into(), "b".into(), "a".into()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("Cyclic"));
        assert!(msg.contains("a → b → a"));
    }

    #[test]
    fn mixed_scope_display() {
        let err = KhaznaError::MixedScopeViolation(MixedScopeError {
            consumer: "cache".into(),
            consumer_scope: ScopeKind::Singleton,
            dependency: "token".into(),
            dependency_scope: ScopeKind::Prototype,
        });

        let msg = format!("{err}");
        assert!(msg.contains("Mixed scopes"));
        assert!(msg.contains("singleton"));
        assert!(msg.contains("prototype"));
    }

    #[test]
    fn ambiguous_lists_candidates() {
        let err = KhaznaError::AmbiguousDependency(AmbiguousDependencyError {
            bean: "svc".into(),
            site: "store".into(),
            type_name: "app::Store".into(),
            candidates: vec!["redisStore".into(), "memStore".into()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("redisStore"));
        assert!(msg.contains("memStore"));
    }
}
