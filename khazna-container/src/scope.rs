//! Bean lifetime scopes.
//!
//! Scopes determine how long an instance lives and which context it is
//! cached under:
//! - [`ScopeKind::Singleton`]: one instance for the container's lifetime
//! - [`ScopeKind::Session`]: one instance per session context
//! - [`ScopeKind::Request`]: one instance per request context
//! - [`ScopeKind::Thread`]: one instance per OS thread
//! - [`ScopeKind::Prototype`]: a new instance on every lookup
//! - [`ScopeKind::Custom`]: one instance per context of a scope registered
//!   with the builder
//!
//! [`ScopeKind::Default`] is an abstract marker. It is never a valid scope
//! for a bean or for the container default.
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{InvalidScopeError, KhaznaError};

/// Defines the lifetime of a bean instance.
///
/// # Examples
/// ```
/// use khazna_container::scope::ScopeKind;
///
/// // A request bean may hold session and singleton beans...
/// assert!(ScopeKind::Request.accepts(&ScopeKind::Session));
/// // ...but a singleton must not hold a prototype.
/// assert!(!ScopeKind::Singleton.accepts(&ScopeKind::Prototype));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScopeKind {
    /// Marker meaning "whatever the container default is". Not instantiable.
    Default,

    /// One instance shared across the entire container.
    ///
    /// Created on first lookup, destroyed at [`Container::shutdown`](crate::container::Container::shutdown).
    Singleton,

    /// One instance per session context.
    ///
    /// A session context spans many requests; it is activated on each
    /// request thread with [`Container::enter`](crate::container::Container::enter).
    Session,

    /// One instance per request context.
    Request,

    /// One instance per OS thread.
    Thread,

    /// New instance on every lookup. Never cached, never destroyed by the container.
    Prototype,

    /// A contextual scope registered by name with the builder.
    Custom(Cow<'static, str>),
}

impl ScopeKind {
    /// Creates a custom scope kind.
    pub fn custom(name: impl Into<Cow<'static, str>>) -> Self {
        ScopeKind::Custom(name.into())
    }

    /// Returns `false` only for the abstract [`ScopeKind::Default`] marker.
    #[inline]
    pub fn is_concrete(&self) -> bool {
        !matches!(self, ScopeKind::Default)
    }

    /// Returns `true` if this scope caches instances.
    #[inline]
    pub fn is_cached(&self) -> bool {
        !matches!(self, ScopeKind::Default | ScopeKind::Prototype)
    }

    /// Returns `true` if instances live in explicitly opened contexts.
    ///
    /// Singleton and Thread contexts are implicit.
    #[inline]
    pub fn is_contextual(&self) -> bool {
        matches!(
            self,
            ScopeKind::Session | ScopeKind::Request | ScopeKind::Custom(_)
        )
    }

    /// Returns `true` if a bean of this scope may safely hold a direct
    /// reference to a bean of `dependency` scope.
    ///
    /// Safe means the dependency lives at least as long as the consumer:
    /// - everything accepts Singleton
    /// - Prototype accepts everything
    /// - every scope accepts itself
    /// - Request accepts Session
    pub fn accepts(&self, dependency: &ScopeKind) -> bool {
        match (self, dependency) {
            (_, ScopeKind::Singleton) => true,
            (ScopeKind::Prototype, _) => true,
            (ScopeKind::Request, ScopeKind::Session) => true,
            (consumer, dependency) => consumer == dependency,
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Default => write!(f, "default"),
            ScopeKind::Singleton => write!(f, "singleton"),
            ScopeKind::Session => write!(f, "session"),
            ScopeKind::Request => write!(f, "request"),
            ScopeKind::Thread => write!(f, "thread"),
            ScopeKind::Prototype => write!(f, "prototype"),
            ScopeKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for ScopeKind {
    type Err = KhaznaError;

    /// Parses a scope name, case-insensitively.
    ///
    /// Unknown identifiers become [`ScopeKind::Custom`]; whether such a
    /// scope exists is checked when a bean using it is registered.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let valid_ident = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.');
        if !valid_ident {
            return Err(KhaznaError::InvalidScope(InvalidScopeError {
                scope: s.to_string(),
                bean: None,
                reason: "not a valid scope identifier",
            }));
        }

        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "default" => ScopeKind::Default,
            "singleton" => ScopeKind::Singleton,
            "session" => ScopeKind::Session,
            "request" => ScopeKind::Request,
            "thread" => ScopeKind::Thread,
            "prototype" => ScopeKind::Prototype,
            _ => ScopeKind::Custom(Cow::Owned(trimmed.to_string())),
        })
    }
}

impl TryFrom<String> for ScopeKind {
    type Error = KhaznaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScopeKind> for String {
    fn from(value: ScopeKind) -> Self {
        value.to_string()
    }
}
